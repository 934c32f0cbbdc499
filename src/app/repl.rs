//! Line-oriented session controller.
//!
//! Every caller operation of [`SessionController`] is one command. Workflow
//! errors are printed and the loop continues; only I/O on the terminal ends
//! the session early.

use super::export_state;
use crate::engine::{InterruptSet, StepStatus, WriteOutcome};
use crate::export::{ExportFormat, ExportParameters, Exporter};
use crate::session::{DisplayState, Progress, SessionController};
use anyhow::Result;
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub const HELP: &str = "\
Commands:
  new <task>                  start a new thread
  continue                    continue the current thread
  revisions <n>               max revisions for threads started afterwards
  interrupts <nodes|none>     comma-separated nodes to pause after
  threads                     list threads
  switch <thread>             make a thread current
  history                     list checkpoints of the current thread
  restore <checkpoint>        branch from a checkpoint
  get <field>                 show a field (plan, draft, proposal, critique, materials, ...)
  set <field> <node>: <text>  overwrite a field as if <node> produced it
  state                       show the current state
  export <formats> [params]   export the current draft (csv,xlsx,html)
  help                        show this help
  quit                        leave the session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    New(String),
    Continue,
    Revisions(u32),
    Interrupts(Vec<String>),
    Threads,
    Switch(u64),
    History,
    Restore(u64),
    Get(String),
    Set {
        field: String,
        node: String,
        value: String,
    },
    State,
    Export {
        formats: Vec<ExportFormat>,
        params: Option<PathBuf>,
    },
    Help,
    Quit,
}

impl ReplCommand {
    /// Parses one input line. `Ok(None)` for blank lines.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_ascii_lowercase().as_str() {
            "new" | "run" => {
                if rest.is_empty() {
                    return Err("usage: new <task>".to_string());
                }
                ReplCommand::New(rest.to_string())
            }
            "continue" | "c" => ReplCommand::Continue,
            "revisions" => ReplCommand::Revisions(
                rest.parse::<u32>()
                    .map_err(|_| "usage: revisions <n>".to_string())?,
            ),
            "interrupts" => ReplCommand::Interrupts(
                if rest.eq_ignore_ascii_case("none") {
                    Vec::new()
                } else {
                    rest.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                },
            ),
            "threads" => ReplCommand::Threads,
            "switch" => ReplCommand::Switch(parse_id(rest, "switch <thread>")?),
            "history" => ReplCommand::History,
            "restore" => ReplCommand::Restore(parse_id(rest, "restore <checkpoint>")?),
            "get" => {
                if rest.is_empty() {
                    return Err("usage: get <field>".to_string());
                }
                ReplCommand::Get(rest.to_string())
            }
            "set" => parse_set(rest)?,
            "state" => ReplCommand::State,
            "export" => parse_export(rest)?,
            "help" | "?" => ReplCommand::Help,
            "quit" | "exit" | "q" => ReplCommand::Quit,
            other => return Err(format!("unknown command '{}' (try 'help')", other)),
        };
        Ok(Some(command))
    }
}

fn parse_id(raw: &str, usage: &str) -> Result<u64, String> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| format!("usage: {}", usage))
}

fn parse_set(rest: &str) -> Result<ReplCommand, String> {
    let usage = || "usage: set <field> <node>: <text>".to_string();
    let (field, rest) = rest.split_once(char::is_whitespace).ok_or_else(usage)?;
    let (node, value) = rest.split_once(':').ok_or_else(usage)?;
    if node.trim().is_empty() {
        return Err(usage());
    }
    Ok(ReplCommand::Set {
        field: field.to_string(),
        node: node.trim().to_string(),
        value: value.trim().replace("\\n", "\n"),
    })
}

fn parse_export(rest: &str) -> Result<ReplCommand, String> {
    let mut parts = rest.split_whitespace();
    let formats = match parts.next() {
        Some(list) => list
            .split(',')
            .map(super::cli::parse_format)
            .collect::<Result<Vec<_>, _>>()?,
        None => vec![ExportFormat::Csv],
    };
    Ok(ReplCommand::Export {
        formats,
        params: parts.next().map(PathBuf::from),
    })
}

/// Whether the loop keeps reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Repl<'a> {
    session: &'a SessionController,
    exporter: Exporter,
    interrupts: InterruptSet,
    max_revisions: Option<u32>,
}

impl<'a> Repl<'a> {
    pub fn new(session: &'a SessionController, exporter: Exporter, interrupts: InterruptSet) -> Self {
        Self {
            session,
            exporter,
            interrupts,
            max_revisions: None,
        }
    }

    /// Reads commands until `quit` or end of input.
    pub async fn run<R, W>(&mut self, input: R, out: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        writeln!(out, "{}", HELP)?;
        let mut lines = input.lines();
        loop {
            write!(out, "> ")?;
            out.flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let command = match ReplCommand::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(message) => {
                    writeln!(out, "{}", message)?;
                    continue;
                }
            };
            if self.execute(command, out).await? == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    /// Runs one command. Workflow failures are reported on `out`.
    pub async fn execute<W: Write>(&mut self, command: ReplCommand, out: &mut W) -> Result<Flow> {
        match self.dispatch(command, out).await {
            Ok(flow) => Ok(flow),
            Err(err) => {
                tracing::debug!(error = %err, "Session command failed");
                writeln!(out, "Error: {:#}", err)?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn dispatch<W: Write>(&mut self, command: ReplCommand, out: &mut W) -> Result<Flow> {
        let session = self.session;
        match command {
            ReplCommand::New(task) => self.advance(&task, true, out).await?,
            ReplCommand::Continue => self.advance("", false, out).await?,
            ReplCommand::Revisions(n) => {
                self.max_revisions = Some(n);
                writeln!(out, "New threads will allow {} revisions.", n)?;
            }
            ReplCommand::Interrupts(labels) => {
                let mut interrupts = InterruptSet::new();
                for label in &labels {
                    let node = session
                        .labels()
                        .resolve(label)
                        .ok_or_else(|| anyhow::anyhow!("unknown node '{}'", label))?;
                    interrupts.insert(node);
                }
                self.interrupts = interrupts;
                let shown: Vec<&str> = self
                    .interrupts
                    .iter()
                    .map(|n| session.labels().label(*n))
                    .collect();
                writeln!(out, "Interrupting after: {}", shown.join(", "))?;
            }
            ReplCommand::Threads => {
                let (threads, current) = session.list_threads();
                if threads.is_empty() {
                    writeln!(out, "No threads yet.")?;
                }
                for thread in threads {
                    let marker = if Some(thread) == current { "*" } else { " " };
                    writeln!(out, "{} {}", marker, thread)?;
                }
            }
            ReplCommand::Switch(thread) => {
                let display = session.switch_thread(thread).await?;
                write_display(out, &display)?;
            }
            ReplCommand::History => {
                let history = session.list_history().await?;
                if history.is_empty() {
                    writeln!(out, "No history.")?;
                }
                for entry in history {
                    writeln!(out, "{}", entry)?;
                }
            }
            ReplCommand::Restore(checkpoint) => match session.select_history_step(checkpoint).await? {
                Some(display) => write_display(out, &display)?,
                None => writeln!(out, "No active thread.")?,
            },
            ReplCommand::Get(key) => {
                let reading = session.read_field(&key).await?;
                if reading.label.is_empty() {
                    writeln!(out, "No state yet.")?;
                } else {
                    writeln!(out, "{}\n{}", reading.label, reading.value)?;
                }
            }
            ReplCommand::Set { field, node, value } => {
                match session.write_field(&field, &node, &value).await? {
                    WriteOutcome::Written(id) => {
                        writeln!(out, "Wrote {} as checkpoint {}.", field, id)?
                    }
                    WriteOutcome::NoState => {
                        writeln!(out, "Nothing to edit yet; start a thread first.")?
                    }
                }
            }
            ReplCommand::State => {
                let display = session.display_state().await?;
                write_display(out, &display)?;
            }
            ReplCommand::Export { formats, params } => {
                let display = session.display_state().await?;
                let Some(state) = display.state else {
                    writeln!(out, "Nothing to export yet.")?;
                    return Ok(Flow::Continue);
                };
                let parameters = params.as_deref().and_then(ExportParameters::load);
                let written = export_state(
                    &self.exporter,
                    &state,
                    &formats,
                    parameters.as_ref(),
                    session.settings().profile,
                )?;
                for path in written {
                    writeln!(out, "Exported {}", path.display())?;
                }
            }
            ReplCommand::Help => writeln!(out, "{}", HELP)?,
            ReplCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    async fn advance<W: Write>(&mut self, task: &str, new_run: bool, out: &mut W) -> Result<()> {
        if !new_run && self.session.current_thread().is_none() {
            writeln!(out, "No active thread; start one with 'new <task>'.")?;
            return Ok(());
        }
        let (thread_id, mut steps) = self
            .session
            .start_or_continue(task, self.max_revisions, self.interrupts.clone(), new_run)
            .await?;
        if new_run {
            writeln!(out, "Started thread {}.", thread_id)?;
        }
        let mut printed = self.session.engine().run_log(thread_id).len();
        while let Some(progress) = steps.next().await {
            write_progress(out, &progress, &mut printed)?;
        }
        Ok(())
    }
}

/// Prints the part of the run log not shown yet, then the step line.
pub(crate) fn write_progress<W: Write>(
    out: &mut W,
    progress: &Progress,
    printed: &mut usize,
) -> std::io::Result<()> {
    if let Some(fresh) = progress.log.get(*printed..) {
        write!(out, "{}", fresh)?;
    }
    *printed = progress.log.len();
    writeln!(
        out,
        "[thread {}] step {} rev {}: {} -> {}",
        progress.thread_id,
        progress.count,
        progress.revision_number,
        progress.last_node,
        if progress.next_node.is_empty() {
            "end"
        } else {
            progress.next_node.as_str()
        }
    )?;
    match &progress.status {
        StepStatus::Running => Ok(()),
        StepStatus::Interrupted => writeln!(out, "Paused. Use 'continue' to resume."),
        StepStatus::Completed => writeln!(out, "Completed."),
        StepStatus::StepLimitReached => {
            writeln!(out, "Step limit reached; this thread will not advance further.")
        }
        StepStatus::Failed { message } => writeln!(out, "Stopped: {}", message),
    }
}

fn write_display<W: Write>(out: &mut W, display: &DisplayState) -> std::io::Result<()> {
    let Some(thread) = display.thread_id else {
        return writeln!(out, "No active thread.");
    };
    let Some(state) = &display.state else {
        return writeln!(out, "Thread {} has no state yet.", thread);
    };
    writeln!(
        out,
        "Thread {} checkpoint {}: last {} next {} rev {}/{} step {}",
        thread,
        display
            .checkpoint_id
            .map(|id| id.to_string())
            .unwrap_or_default(),
        display.last_node,
        if display.next_node.is_empty() {
            "end"
        } else {
            display.next_node.as_str()
        },
        display.revision_number,
        state.max_revisions,
        display.count
    )?;
    writeln!(out, "Task: {}", state.task)
}

#[cfg(test)]
#[path = "tests/repl_tests.rs"]
mod tests;
