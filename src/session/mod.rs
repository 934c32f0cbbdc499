//! Session controller: the caller-facing API over the workflow engine.
//!
//! The controller owns the registry of threads created in (or recovered
//! into) this session and the pointer to the current thread. Node names
//! cross this boundary as deployment labels and field names as caller keys.

use crate::config::NodeLabels;
use crate::engine::{
    CheckpointId, ExecuteMode, HistoryEntry, InterruptSet, RunInput, StepReport, StepStatus,
    ThreadId, WorkflowEngine, WorkflowError, WriteOutcome, ERROR_LABEL,
};
use crate::stages::{numbered_documents, DocumentProfile};
use crate::state::{FieldKey, FieldValue, WorkflowState};
use crate::structured_logger::{SessionEvent, StructuredLogger};
use futures::stream::{BoxStream, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard};

/// Fixed inputs of a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub profile: DocumentProfile,
    pub labels: NodeLabels,
    pub default_max_revisions: u32,
}

impl SessionSettings {
    pub fn for_profile(profile: DocumentProfile, default_max_revisions: u32) -> Self {
        Self {
            profile,
            labels: NodeLabels::for_profile(profile),
            default_max_revisions,
        }
    }
}

/// One step of a run as shown to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub log: String,
    /// Deployment label of the node that ran, or `"error"`.
    pub last_node: String,
    /// Deployment label of the pending node; empty at the terminal.
    pub next_node: String,
    pub thread_id: ThreadId,
    pub revision_number: u32,
    pub count: u32,
    pub status: StepStatus,
}

pub type ProgressStream = BoxStream<'static, Progress>;

/// A field value rendered for display, with a one-line context label.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldReading {
    pub label: String,
    pub value: String,
}

/// Snapshot shown after every controller action.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DisplayState {
    pub thread_id: Option<ThreadId>,
    pub checkpoint_id: Option<CheckpointId>,
    pub last_node: String,
    pub next_node: String,
    pub revision_number: u32,
    pub count: u32,
    pub state: Option<WorkflowState>,
}

#[derive(Debug, Default)]
struct ThreadRegistry {
    threads: Vec<ThreadId>,
    current: Option<ThreadId>,
}

impl ThreadRegistry {
    fn register(&mut self, thread_id: ThreadId) {
        if !self.threads.contains(&thread_id) {
            self.threads.push(thread_id);
            self.threads.sort();
        }
        self.current = Some(thread_id);
    }
}

pub struct SessionController {
    engine: WorkflowEngine,
    settings: SessionSettings,
    registry: Mutex<ThreadRegistry>,
    logger: Option<Arc<StructuredLogger>>,
}

impl SessionController {
    /// Opens a session over the engine. Threads already present in the
    /// checkpoint store are registered and the newest becomes current.
    pub async fn open(
        engine: WorkflowEngine,
        settings: SessionSettings,
        logger: Option<Arc<StructuredLogger>>,
    ) -> Result<Self, WorkflowError> {
        let threads = engine.threads().await?;
        let current = threads.iter().max().copied();
        if !threads.is_empty() {
            tracing::info!(count = threads.len(), "Recovered threads from checkpoint log");
        }
        Ok(Self {
            engine,
            settings,
            registry: Mutex::new(ThreadRegistry { threads, current }),
            logger,
        })
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn labels(&self) -> &NodeLabels {
        &self.settings.labels
    }

    fn registry(&self) -> MutexGuard<'_, ThreadRegistry> {
        match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn current_thread(&self) -> Option<ThreadId> {
        self.registry().current
    }

    /// Starts a new thread when asked to or when none is active; otherwise
    /// continues the current one. The returned stream yields one
    /// [`Progress`] per engine step.
    pub async fn start_or_continue(
        &self,
        task: &str,
        max_revisions: Option<u32>,
        interrupts: InterruptSet,
        new_run: bool,
    ) -> Result<(ThreadId, ProgressStream), WorkflowError> {
        let current = self.current_thread();
        let mode = match current {
            Some(thread_id) if !new_run => ExecuteMode::Resume(thread_id),
            _ => ExecuteMode::NewRun(RunInput {
                task: task.to_string(),
                max_revisions: max_revisions.unwrap_or(self.settings.default_max_revisions),
            }),
        };
        let starts_thread = matches!(mode, ExecuteMode::NewRun(_));
        if let Some(logger) = &self.logger {
            logger.log_session(SessionEvent::RunRequested {
                thread_id: current.filter(|_| !starts_thread).map(|t| t.0),
                new_run: starts_thread,
            });
        }

        let (thread_id, steps) = self.engine.execute(mode, interrupts).await?;
        if starts_thread {
            self.registry().register(thread_id);
            tracing::info!(thread = %thread_id, "New run started");
        }

        let labels = self.settings.labels.clone();
        let progress = steps
            .map(move |report| progress_from(&labels, report))
            .boxed();
        Ok((thread_id, progress))
    }

    /// Makes `thread_id` current. Only threads known to this session qualify.
    pub async fn switch_thread(&self, thread_id: u64) -> Result<DisplayState, WorkflowError> {
        let thread_id = ThreadId(thread_id);
        {
            let mut registry = self.registry();
            if !registry.threads.contains(&thread_id) {
                return Err(WorkflowError::InvalidThread {
                    thread_id: thread_id.0,
                });
            }
            registry.current = Some(thread_id);
        }
        if let Some(logger) = &self.logger {
            logger.log_session(SessionEvent::ThreadSwitched {
                thread_id: thread_id.0,
            });
        }
        tracing::info!(thread = %thread_id, "Switched thread");
        self.display_state().await
    }

    /// Known threads and the current one.
    pub fn list_threads(&self) -> (Vec<ThreadId>, Option<ThreadId>) {
        let registry = self.registry();
        (registry.threads.clone(), registry.current)
    }

    /// History of the current thread, newest first; empty with no thread.
    pub async fn list_history(&self) -> Result<Vec<HistoryEntry>, WorkflowError> {
        match self.current_thread() {
            Some(thread_id) => self.engine.list_history(thread_id).await,
            None => Ok(Vec::new()),
        }
    }

    /// Restores a checkpoint of the current thread and returns the refreshed
    /// display state. `None` when no thread is active.
    pub async fn select_history_step(
        &self,
        checkpoint_id: u64,
    ) -> Result<Option<DisplayState>, WorkflowError> {
        let Some(thread_id) = self.current_thread() else {
            return Ok(None);
        };
        self.engine
            .restore_checkpoint(thread_id, CheckpointId(checkpoint_id))
            .await?;
        if let Some(logger) = &self.logger {
            logger.log_session(SessionEvent::HistorySelected {
                thread_id: thread_id.0,
                checkpoint_id,
            });
        }
        self.display_state().await.map(Some)
    }

    /// Reads one field of the current thread's latest state.
    pub async fn read_field(&self, key: &str) -> Result<FieldReading, WorkflowError> {
        let field = resolve_field(key)?;
        let Some(thread_id) = self.current_thread() else {
            return Ok(FieldReading::default());
        };
        let Some(view) = self.engine.get_state(thread_id).await? else {
            return Ok(FieldReading::default());
        };

        let state = &view.state;
        Ok(FieldReading {
            label: format!(
                "Last Node: {}, Thread: {}, Rev: {}, Step: {}",
                self.settings.labels.display(state.last_node),
                thread_id,
                state.revision_number,
                state.count
            ),
            value: self.render_value(state.field(field)),
        })
    }

    /// Overwrites one field of the current thread as if `as_node` produced it.
    pub async fn write_field(
        &self,
        key: &str,
        as_node: &str,
        value: &str,
    ) -> Result<WriteOutcome, WorkflowError> {
        let field = resolve_field(key)?;
        let node = self
            .settings
            .labels
            .resolve(as_node)
            .ok_or_else(|| WorkflowError::UnknownNode {
                label: as_node.to_string(),
            })?;
        let Some(thread_id) = self.current_thread() else {
            tracing::warn!(field = %field, "No active thread; write ignored");
            return Ok(WriteOutcome::NoState);
        };

        let outcome = self
            .engine
            .overwrite_field(thread_id, field, node, value)
            .await?;
        if let (Some(logger), WriteOutcome::Written(_)) = (&self.logger, outcome) {
            logger.log_session(SessionEvent::FieldWritten {
                thread_id: thread_id.0,
                field: field.as_str(),
                as_node: node.as_str(),
            });
        }
        Ok(outcome)
    }

    /// Latest state of the current thread; empty with no thread or checkpoint.
    pub async fn display_state(&self) -> Result<DisplayState, WorkflowError> {
        let Some(thread_id) = self.current_thread() else {
            return Ok(DisplayState::default());
        };
        let Some(view) = self.engine.get_state(thread_id).await? else {
            return Ok(DisplayState {
                thread_id: Some(thread_id),
                ..DisplayState::default()
            });
        };

        let labels = &self.settings.labels;
        Ok(DisplayState {
            thread_id: Some(thread_id),
            checkpoint_id: Some(view.checkpoint_id),
            last_node: labels.display(view.state.last_node).to_string(),
            next_node: labels.display(view.next_node).to_string(),
            revision_number: view.state.revision_number,
            count: view.state.count,
            state: Some(view.state),
        })
    }

    fn render_value(&self, value: FieldValue) -> String {
        match value {
            FieldValue::Text(text) => text,
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Node(node) => self.settings.labels.display(node).to_string(),
            FieldValue::Documents(documents) if documents.is_empty() => format!(
                "No {} materials were retrieved for this task.",
                self.settings.profile.materials_noun()
            ),
            FieldValue::Documents(documents) => numbered_documents(&documents),
        }
    }
}

fn resolve_field(key: &str) -> Result<FieldKey, WorkflowError> {
    FieldKey::resolve(key).ok_or_else(|| WorkflowError::UnknownField {
        key: key.to_string(),
    })
}

fn progress_from(labels: &NodeLabels, report: StepReport) -> Progress {
    let last_node = if matches!(report.status, StepStatus::Failed { .. }) {
        ERROR_LABEL.to_string()
    } else {
        labels.display(report.last_node).to_string()
    };
    Progress {
        next_node: labels.display(report.next_node).to_string(),
        last_node,
        log: report.log,
        thread_id: report.thread_id,
        revision_number: report.revision_number,
        count: report.count,
        status: report.status,
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
