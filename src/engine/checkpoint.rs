//! Checkpoint records and the append-only stores that hold them.

use super::errors::WorkflowError;
use crate::state::{Node, WorkflowState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

/// Monotonic identifier of an independent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(pub u64);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-thread position of a checkpoint in its log. Step 0 is the initial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(pub u64);

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable snapshot of a thread's state after one operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    pub thread_id: ThreadId,
    pub id: CheckpointId,
    pub created_at: DateTime<Utc>,
    /// Node of record: the stage that produced this state, or the node an
    /// edit or restore was attributed to. Absent on the initial checkpoint.
    pub source: Option<Node>,
    /// Node that runs when the thread continues. Absent once terminal.
    pub next_node: Option<Node>,
    pub state: WorkflowState,
}

/// Append-only per-thread checkpoint log.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Registers a new thread and returns its id. Ids never repeat.
    async fn allocate_thread(&self) -> Result<ThreadId, WorkflowError>;

    /// All threads ever allocated, in creation order.
    async fn threads(&self) -> Result<Vec<ThreadId>, WorkflowError>;

    /// Appends a checkpoint with the next id for the thread.
    async fn append(
        &self,
        thread_id: ThreadId,
        source: Option<Node>,
        next_node: Option<Node>,
        state: WorkflowState,
    ) -> Result<Checkpoint, WorkflowError>;

    /// Newest checkpoint of the thread, if any.
    async fn latest(&self, thread_id: ThreadId) -> Result<Option<Checkpoint>, WorkflowError>;

    /// Every checkpoint of the thread, oldest first.
    async fn history(&self, thread_id: ThreadId) -> Result<Vec<Checkpoint>, WorkflowError>;

    async fn get(
        &self,
        thread_id: ThreadId,
        checkpoint_id: CheckpointId,
    ) -> Result<Option<Checkpoint>, WorkflowError> {
        Ok(self
            .history(thread_id)
            .await?
            .into_iter()
            .find(|c| c.id == checkpoint_id))
    }
}

#[derive(Default)]
struct MemoryLogs {
    next_thread: u64,
    logs: BTreeMap<ThreadId, Vec<Checkpoint>>,
}

/// Process-lifetime checkpoint store.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    inner: Mutex<MemoryLogs>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryLogs>, WorkflowError> {
        self.inner.lock().map_err(|_| WorkflowError::StorageFailure {
            message: "checkpoint store lock poisoned".to_string(),
        })
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn allocate_thread(&self) -> Result<ThreadId, WorkflowError> {
        let mut inner = self.lock()?;
        let id = ThreadId(inner.next_thread);
        inner.next_thread += 1;
        inner.logs.insert(id, Vec::new());
        Ok(id)
    }

    async fn threads(&self) -> Result<Vec<ThreadId>, WorkflowError> {
        Ok(self.lock()?.logs.keys().copied().collect())
    }

    async fn append(
        &self,
        thread_id: ThreadId,
        source: Option<Node>,
        next_node: Option<Node>,
        state: WorkflowState,
    ) -> Result<Checkpoint, WorkflowError> {
        let mut inner = self.lock()?;
        let log = inner
            .logs
            .get_mut(&thread_id)
            .ok_or(WorkflowError::ThreadNotFound {
                thread_id: thread_id.0,
            })?;
        let checkpoint = Checkpoint {
            thread_id,
            id: CheckpointId(log.len() as u64),
            created_at: Utc::now(),
            source,
            next_node,
            state,
        };
        log.push(checkpoint.clone());
        Ok(checkpoint)
    }

    async fn latest(&self, thread_id: ThreadId) -> Result<Option<Checkpoint>, WorkflowError> {
        let inner = self.lock()?;
        let log = inner.logs.get(&thread_id).ok_or(WorkflowError::ThreadNotFound {
            thread_id: thread_id.0,
        })?;
        Ok(log.last().cloned())
    }

    async fn history(&self, thread_id: ThreadId) -> Result<Vec<Checkpoint>, WorkflowError> {
        let inner = self.lock()?;
        inner
            .logs
            .get(&thread_id)
            .cloned()
            .ok_or(WorkflowError::ThreadNotFound {
                thread_id: thread_id.0,
            })
    }
}
