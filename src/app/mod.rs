pub mod cli;
pub mod context;
pub mod headless;
pub mod repl;

pub use context::AppContext;
pub use headless::{run_headless, HeadlessOutcome};
pub use repl::{Repl, ReplCommand};

use crate::app::cli::{Cli, Command, ExportArgs, MaterialsAction};
use crate::documents::{AddOutcome, DocumentStore};
use crate::engine::{CheckpointStore, ThreadId};
use crate::export::{extract_structured, ExportFormat, ExportParameters, Exporter};
use crate::stages::DocumentProfile;
use crate::state::WorkflowState;
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::PathBuf;

/// Entry point for a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let ctx = AppContext::load(&cli.global)?;
    let mut stdout = std::io::stdout();

    match cli.command {
        Command::Run(args) => {
            let session = ctx.open_session().await?;
            let outcome = run_headless(&session, &ctx.exporter(), &args, &mut stdout).await?;
            writeln!(stdout, "\n{}", outcome.draft)?;
        }
        Command::Session => {
            let session = ctx.open_session().await?;
            let interrupts = ctx.config.interrupt_set()?;
            let input = tokio::io::BufReader::new(tokio::io::stdin());
            Repl::new(&session, ctx.exporter(), interrupts)
                .run(input, &mut stdout)
                .await?;
        }
        Command::Materials { action } => {
            manage_materials(&ctx.document_store(), action, &mut stdout)?;
        }
        Command::Export(args) => {
            export_thread(&ctx, &args, &mut stdout).await?;
        }
    }
    Ok(())
}

/// Writes a summary of `state` in every requested format.
pub fn export_state(
    exporter: &Exporter,
    state: &WorkflowState,
    formats: &[ExportFormat],
    parameters: Option<&ExportParameters>,
    profile: DocumentProfile,
) -> Result<Vec<PathBuf>> {
    if formats.is_empty() {
        return Ok(Vec::new());
    }
    let record = extract_structured(&state.draft, &state.plan, parameters, profile.export_title());
    formats
        .iter()
        .map(|format| exporter.export(&record, *format))
        .collect()
}

pub fn manage_materials<W: Write>(
    store: &DocumentStore,
    action: MaterialsAction,
    out: &mut W,
) -> Result<()> {
    match action {
        MaterialsAction::List => {
            let documents = store.list()?;
            if documents.is_empty() {
                writeln!(out, "No materials in {}", store.root().display())?;
            }
            for document in documents {
                writeln!(out, "{}\t{} bytes", document.name, document.size)?;
            }
        }
        MaterialsAction::Add { files } => {
            for file in files {
                match store.add(&file)? {
                    AddOutcome::Added(name) => writeln!(out, "Added {}", name)?,
                    AddOutcome::AlreadyPresent(name) => {
                        writeln!(out, "{} is already stored", name)?
                    }
                }
            }
        }
        MaterialsAction::Remove { names } => {
            for name in names {
                if store.remove(&name)? {
                    writeln!(out, "Removed {}", name)?;
                } else {
                    writeln!(out, "No material named {}", name)?;
                }
            }
        }
    }
    Ok(())
}

/// Exports the latest state of a thread straight from the checkpoint log.
async fn export_thread<W: Write>(ctx: &AppContext, args: &ExportArgs, out: &mut W) -> Result<()> {
    let store = ctx.checkpoint_store();
    let thread_id = match args.thread {
        Some(id) => ThreadId(id),
        None => match store.threads().await?.into_iter().max() {
            Some(id) => id,
            None => bail!("No threads in {}", store.path().display()),
        },
    };
    let checkpoint = store
        .latest(thread_id)
        .await?
        .with_context(|| format!("Thread {} has no checkpoints", thread_id))?;

    let parameters = args.params.as_deref().and_then(ExportParameters::load);
    for path in export_state(
        &ctx.exporter(),
        &checkpoint.state,
        &args.format,
        parameters.as_ref(),
        ctx.profile(),
    )? {
        writeln!(out, "Exported {}", path.display())?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/app_tests.rs"]
mod tests;
