//! Caller-visible error taxonomy for the revision workflow.

use std::fmt::{Display, Formatter};

/// Errors surfaced by the engine and session controller.
///
/// Generation failures are not represented here: they halt a run and are
/// reported through the step stream instead of being returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// No thread with this id has ever been created.
    ThreadNotFound { thread_id: u64 },
    /// The thread exists but has no checkpoint with this id.
    CheckpointNotFound { thread_id: u64, checkpoint_id: u64 },
    /// Attempted to switch the session to a thread it never created.
    InvalidThread { thread_id: u64 },
    /// Caller key does not map onto a workflow field.
    UnknownField { key: String },
    /// Node label does not map onto a workflow node.
    UnknownNode { label: String },
    /// Supplied value cannot be stored in the addressed field.
    InvalidFieldValue { field: String, message: String },
    /// Checkpoint log read/write failure.
    StorageFailure { message: String },
}

impl Display for WorkflowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ThreadNotFound { thread_id } => write!(f, "thread {} not found", thread_id),
            Self::CheckpointNotFound {
                thread_id,
                checkpoint_id,
            } => write!(
                f,
                "checkpoint {} not found in thread {}",
                checkpoint_id, thread_id
            ),
            Self::InvalidThread { thread_id } => {
                write!(f, "invalid thread id: {}", thread_id)
            }
            Self::UnknownField { key } => write!(f, "unknown field: {}", key),
            Self::UnknownNode { label } => write!(f, "unknown node: {}", label),
            Self::InvalidFieldValue { field, message } => {
                write!(f, "invalid value for {}: {}", field, message)
            }
            Self::StorageFailure { message } => write!(f, "storage failure: {}", message),
        }
    }
}

impl std::error::Error for WorkflowError {}

impl From<std::io::Error> for WorkflowError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageFailure {
            message: err.to_string(),
        }
    }
}
