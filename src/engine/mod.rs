//! Revision workflow engine.
//!
//! The engine is the only place thread state changes. Each step reads the
//! thread's latest checkpoint, runs the pending node's stage, folds the
//! stage output into the successor state, routes, and appends exactly one
//! checkpoint. Steps of one thread are serialized by a per-thread lock;
//! threads never share state.

mod checkpoint;
mod errors;
mod file_store;
mod report;
mod routing;

pub use checkpoint::{Checkpoint, CheckpointId, CheckpointStore, MemoryCheckpointStore, ThreadId};
pub use errors::WorkflowError;
pub use file_store::{FileCheckpointStore, StoredCheckpoint};
pub use report::{HistoryEntry, StateView, StepReport, StepStatus, ERROR_LABEL};
pub use routing::{route, ENTRY_NODE};

use crate::stages::{StageExecutor, StageOutput};
use crate::state::{FieldKey, Node, WorkflowState};
use crate::structured_logger::StructuredLogger;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// Default per-thread bound on executed steps.
pub const DEFAULT_MAX_STEPS: u32 = 10;

/// Separator appended to the run log after every executed step.
pub const LOG_SEPARATOR: &str = "\n------------------\n\n";

/// Nodes after which automatic continuation halts.
pub type InterruptSet = BTreeSet<Node>;

/// Lazily evaluated step reports. Dropping the stream cancels the run
/// between steps.
pub type StepStream = BoxStream<'static, StepReport>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub max_steps: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

/// Inputs of a new run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInput {
    pub task: String,
    pub max_revisions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecuteMode {
    NewRun(RunInput),
    Resume(ThreadId),
}

/// Result of a field overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(CheckpointId),
    /// The thread exists but has nothing to edit yet; nothing was written.
    NoState,
}

struct EngineInner {
    store: Arc<dyn CheckpointStore>,
    stages: Arc<dyn StageExecutor>,
    settings: EngineSettings,
    steps_taken: Mutex<HashMap<ThreadId, u32>>,
    run_logs: Mutex<HashMap<ThreadId, String>>,
    step_locks: Mutex<HashMap<ThreadId, Arc<tokio::sync::Mutex<()>>>>,
    logger: Option<Arc<StructuredLogger>>,
}

/// Cheaply clonable handle to the engine.
#[derive(Clone)]
pub struct WorkflowEngine {
    inner: Arc<EngineInner>,
}

struct RunCursor {
    engine: WorkflowEngine,
    thread_id: ThreadId,
    interrupts: InterruptSet,
    log: String,
    halted: bool,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        stages: Arc<dyn StageExecutor>,
        settings: EngineSettings,
        logger: Option<Arc<StructuredLogger>>,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                stages,
                settings,
                steps_taken: Mutex::new(HashMap::new()),
                run_logs: Mutex::new(HashMap::new()),
                step_locks: Mutex::new(HashMap::new()),
                logger,
            }),
        }
    }

    pub fn settings(&self) -> EngineSettings {
        self.inner.settings
    }

    /// Creates a thread holding the initial state at step 0.
    pub async fn start_thread(&self, input: RunInput) -> Result<Checkpoint, WorkflowError> {
        let thread_id = self.inner.store.allocate_thread().await?;
        let state = WorkflowState::new(input.task, input.max_revisions);
        let next = route(None, &state);
        let checkpoint = self.inner.store.append(thread_id, None, next, state).await?;

        tracing::info!(thread = %thread_id, "Started new thread");
        self.log_event(
            "Engine",
            serde_json::json!({
                "type": "ThreadStarted",
                "thread_id": thread_id.0,
                "max_revisions": input.max_revisions,
            }),
        );
        Ok(checkpoint)
    }

    /// Starts or resumes a run and returns the lazy stream of its steps.
    ///
    /// The stream yields one report per step and ends after the first report
    /// whose status halts: an interruption, the terminal, the step bound or a
    /// stage failure. The output log carries over between calls on the same
    /// thread and starts empty for a new thread.
    pub async fn execute(
        &self,
        mode: ExecuteMode,
        interrupts: InterruptSet,
    ) -> Result<(ThreadId, StepStream), WorkflowError> {
        let (thread_id, log) = match mode {
            ExecuteMode::NewRun(input) => (self.start_thread(input).await?.thread_id, String::new()),
            ExecuteMode::Resume(thread_id) => {
                self.inner.store.history(thread_id).await?;
                (thread_id, self.run_log(thread_id))
            }
        };

        let cursor = RunCursor {
            engine: self.clone(),
            thread_id,
            interrupts,
            log,
            halted: false,
        };
        let steps = stream::unfold(cursor, |mut cursor| async move {
            if cursor.halted {
                return None;
            }
            let report = cursor
                .engine
                .step(cursor.thread_id, &cursor.interrupts, &mut cursor.log)
                .await;
            cursor.engine.remember_log(cursor.thread_id, &cursor.log);
            cursor.halted = report.status.is_halt();
            Some((report, cursor))
        })
        .boxed();

        Ok((thread_id, steps))
    }

    /// Runs at most one step of the thread.
    pub async fn step(
        &self,
        thread_id: ThreadId,
        interrupts: &InterruptSet,
        log: &mut String,
    ) -> StepReport {
        let lock = self.step_lock(thread_id);
        let _guard = lock.lock().await;

        match self.step_locked(thread_id, interrupts, log).await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(thread = %thread_id, error = %err, "Step failed");
                log.push_str(&format!("Error in processing: {}\n", err));
                StepReport {
                    log: log.clone(),
                    thread_id,
                    last_node: None,
                    next_node: None,
                    revision_number: 0,
                    count: 0,
                    checkpoint_id: None,
                    status: StepStatus::Failed {
                        message: err.to_string(),
                    },
                }
            }
        }
    }

    async fn step_locked(
        &self,
        thread_id: ThreadId,
        interrupts: &InterruptSet,
        log: &mut String,
    ) -> Result<StepReport, WorkflowError> {
        let current = self
            .inner
            .store
            .latest(thread_id)
            .await?
            .ok_or(WorkflowError::ThreadNotFound {
                thread_id: thread_id.0,
            })?;

        let report = |log: &String, checkpoint: &Checkpoint, status: StepStatus| StepReport {
            log: log.clone(),
            thread_id,
            last_node: checkpoint.state.last_node,
            next_node: checkpoint.next_node,
            revision_number: checkpoint.state.revision_number,
            count: checkpoint.state.count,
            checkpoint_id: Some(checkpoint.id),
            status,
        };

        let Some(node) = current.next_node else {
            return Ok(report(log, &current, StepStatus::Completed));
        };
        if self.steps_taken(thread_id) >= self.inner.settings.max_steps {
            tracing::info!(thread = %thread_id, "Step bound reached");
            return Ok(report(log, &current, StepStatus::StepLimitReached));
        }

        tracing::info!(thread = %thread_id, node = %node, "Running stage");
        let output = match self.inner.stages.run(node, &current.state).await {
            Ok(output) => output,
            Err(err) => {
                let message = format!("{:#}", err);
                tracing::warn!(thread = %thread_id, node = %node, error = %message, "Stage failed");
                self.log_event(
                    "Engine",
                    serde_json::json!({
                        "type": "StageFailed",
                        "thread_id": thread_id.0,
                        "node": node.as_str(),
                        "error": message,
                    }),
                );
                log.push_str(&format!("Error in processing: {}\n", message));
                let mut failed = report(log, &current, StepStatus::Failed { message });
                failed.next_node = None;
                failed.checkpoint_id = None;
                return Ok(failed);
            }
        };

        log.push_str(&format!("[{}]\n{}", node, output.summary()));
        log.push_str(LOG_SEPARATOR);

        let state = apply_stage_output(current.state.advance(node), output);
        let next = route(Some(node), &state);
        let checkpoint = self
            .inner
            .store
            .append(thread_id, Some(node), next, state)
            .await?;
        let taken = self.record_step(thread_id);

        let status = if next.is_none() {
            StepStatus::Completed
        } else if interrupts.contains(&node) {
            StepStatus::Interrupted
        } else if taken >= self.inner.settings.max_steps {
            StepStatus::StepLimitReached
        } else {
            StepStatus::Running
        };

        self.log_event(
            "Engine",
            serde_json::json!({
                "type": "StepExecuted",
                "thread_id": thread_id.0,
                "node": node.as_str(),
                "next_node": next.map(|n| n.as_str()),
                "checkpoint_id": checkpoint.id.0,
                "count": checkpoint.state.count,
                "revision_number": checkpoint.state.revision_number,
            }),
        );
        Ok(report(log, &checkpoint, status))
    }

    /// Latest state of the thread, or `None` when it has no checkpoint yet.
    pub async fn get_state(&self, thread_id: ThreadId) -> Result<Option<StateView>, WorkflowError> {
        Ok(self
            .inner
            .store
            .latest(thread_id)
            .await?
            .map(StateView::from))
    }

    /// Checkpoints after the initial one, newest first.
    pub async fn list_history(
        &self,
        thread_id: ThreadId,
    ) -> Result<Vec<HistoryEntry>, WorkflowError> {
        Ok(self
            .inner
            .store
            .history(thread_id)
            .await?
            .iter()
            .rev()
            .filter(|c| c.id.0 >= 1)
            .map(HistoryEntry::from)
            .collect())
    }

    /// Appends a copy of a historical checkpoint as the thread's newest one.
    pub async fn restore_checkpoint(
        &self,
        thread_id: ThreadId,
        checkpoint_id: CheckpointId,
    ) -> Result<Checkpoint, WorkflowError> {
        let lock = self.step_lock(thread_id);
        let _guard = lock.lock().await;

        let target = self
            .inner
            .store
            .get(thread_id, checkpoint_id)
            .await?
            .ok_or(WorkflowError::CheckpointNotFound {
                thread_id: thread_id.0,
                checkpoint_id: checkpoint_id.0,
            })?;
        let restored = self
            .inner
            .store
            .append(
                thread_id,
                target.state.last_node,
                target.next_node,
                target.state,
            )
            .await?;

        tracing::info!(
            thread = %thread_id,
            from = %checkpoint_id,
            to = %restored.id,
            "Restored checkpoint"
        );
        self.log_event(
            "Engine",
            serde_json::json!({
                "type": "CheckpointRestored",
                "thread_id": thread_id.0,
                "restored_from": checkpoint_id.0,
                "checkpoint_id": restored.id.0,
            }),
        );
        Ok(restored)
    }

    /// Replaces one field of the latest state and checkpoints the result as
    /// if `as_node` had produced it. The pending node is routed from `as_node`.
    pub async fn overwrite_field(
        &self,
        thread_id: ThreadId,
        field: FieldKey,
        as_node: Node,
        value: &str,
    ) -> Result<WriteOutcome, WorkflowError> {
        let lock = self.step_lock(thread_id);
        let _guard = lock.lock().await;

        let Some(current) = self.inner.store.latest(thread_id).await? else {
            tracing::warn!(thread = %thread_id, field = %field, "No state to edit; write ignored");
            return Ok(WriteOutcome::NoState);
        };

        let state = current
            .state
            .with_field(field, value)
            .map_err(|message| WorkflowError::InvalidFieldValue {
                field: field.to_string(),
                message,
            })?;
        let next = route(Some(as_node), &state);
        let checkpoint = self
            .inner
            .store
            .append(thread_id, Some(as_node), next, state)
            .await?;

        tracing::info!(thread = %thread_id, field = %field, as_node = %as_node, "Field overwritten");
        self.log_event(
            "Engine",
            serde_json::json!({
                "type": "FieldOverwritten",
                "thread_id": thread_id.0,
                "field": field.as_str(),
                "as_node": as_node.as_str(),
                "checkpoint_id": checkpoint.id.0,
            }),
        );
        Ok(WriteOutcome::Written(checkpoint.id))
    }

    pub async fn threads(&self) -> Result<Vec<ThreadId>, WorkflowError> {
        self.inner.store.threads().await
    }

    /// Steps this process has executed for the thread.
    pub fn steps_taken(&self, thread_id: ThreadId) -> u32 {
        self.inner
            .steps_taken
            .lock()
            .map(|steps| steps.get(&thread_id).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn record_step(&self, thread_id: ThreadId) -> u32 {
        match self.inner.steps_taken.lock() {
            Ok(mut steps) => {
                let taken = steps.entry(thread_id).or_insert(0);
                *taken += 1;
                *taken
            }
            Err(_) => self.inner.settings.max_steps,
        }
    }

    /// Output accumulated by earlier runs of the thread in this process.
    pub fn run_log(&self, thread_id: ThreadId) -> String {
        self.inner
            .run_logs
            .lock()
            .map(|logs| logs.get(&thread_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    fn remember_log(&self, thread_id: ThreadId, log: &str) {
        match self.inner.run_logs.lock() {
            Ok(mut logs) => {
                logs.insert(thread_id, log.to_string());
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(thread_id, log.to_string());
            }
        }
    }

    fn step_lock(&self, thread_id: ThreadId) -> Arc<tokio::sync::Mutex<()>> {
        match self.inner.step_locks.lock() {
            Ok(mut locks) => locks.entry(thread_id).or_default().clone(),
            Err(poisoned) => poisoned.into_inner().entry(thread_id).or_default().clone(),
        }
    }

    fn log_event(&self, component: &str, event: serde_json::Value) {
        if let Some(logger) = &self.inner.logger {
            logger.log(component, event);
        }
    }
}

/// Folds a stage's content into the successor state.
fn apply_stage_output(mut state: WorkflowState, output: StageOutput) -> WorkflowState {
    match output {
        StageOutput::Plan {
            plan,
            retrieved_documents,
        } => {
            state.plan = plan;
            state.retrieved_documents = retrieved_documents;
        }
        StageOutput::Draft { draft } => state.draft = draft,
        StageOutput::Critique { critique } => state.critique = critique,
    }
    state
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
