//! Non-interactive run of one new thread.

use super::export_state;
use super::repl::write_progress;
use crate::app::cli::RunArgs;
use crate::engine::{InterruptSet, StepStatus};
use crate::export::{ExportParameters, Exporter};
use crate::session::SessionController;
use anyhow::{bail, Result};
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;

/// What a headless run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessOutcome {
    pub status: StepStatus,
    pub draft: String,
    pub exports: Vec<PathBuf>,
}

/// Starts a new thread and streams it to completion with no interruption
/// points. A failed stage is an error; a reached step bound is not.
pub async fn run_headless<W: Write>(
    session: &SessionController,
    exporter: &Exporter,
    args: &RunArgs,
    out: &mut W,
) -> Result<HeadlessOutcome> {
    let task = args.task.join(" ");
    if task.trim().is_empty() {
        bail!("The task must not be empty");
    }

    let (thread_id, mut steps) = session
        .start_or_continue(&task, args.max_revisions, InterruptSet::new(), true)
        .await?;
    writeln!(out, "[session] Thread {}", thread_id)?;

    let mut printed = 0;
    let mut status = StepStatus::Running;
    while let Some(progress) = steps.next().await {
        write_progress(out, &progress, &mut printed)?;
        status = progress.status;
    }
    if let StepStatus::Failed { message } = &status {
        bail!("Run of thread {} stopped: {}", thread_id, message);
    }

    let display = session.display_state().await?;
    let Some(state) = display.state else {
        bail!("Thread {} has no state after the run", thread_id);
    };

    let parameters = args.params.as_deref().and_then(ExportParameters::load);
    let exports = export_state(
        exporter,
        &state,
        &args.export,
        parameters.as_ref(),
        session.settings().profile,
    )?;
    for path in &exports {
        writeln!(out, "[export] {}", path.display())?;
    }

    Ok(HeadlessOutcome {
        status,
        draft: state.draft,
        exports,
    })
}
