//! Per-step progress reports and history summaries.

use super::checkpoint::{Checkpoint, CheckpointId, ThreadId};
use crate::state::{Node, WorkflowState};
use std::fmt;

/// Label reported in place of a node when a stage failed.
pub const ERROR_LABEL: &str = "error";

/// Why a step report was the last one of a call, if it was.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    /// More steps follow in this call.
    Running,
    /// The node that just ran is in the interruption set.
    Interrupted,
    /// The graph reached its terminal.
    Completed,
    /// The thread has used its step budget.
    StepLimitReached,
    /// The stage failed; nothing was checkpointed for this step.
    Failed { message: String },
}

impl StepStatus {
    pub fn is_halt(&self) -> bool {
        !matches!(self, StepStatus::Running)
    }
}

/// One report per engine step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    /// Accumulated log text of the current call.
    pub log: String,
    pub thread_id: ThreadId,
    pub last_node: Option<Node>,
    pub next_node: Option<Node>,
    pub revision_number: u32,
    pub count: u32,
    pub checkpoint_id: Option<CheckpointId>,
    pub status: StepStatus,
}

impl StepReport {
    /// Internal name of the node that produced this step, or `"error"`.
    pub fn last_node_label(&self) -> &'static str {
        if matches!(self.status, StepStatus::Failed { .. }) {
            return ERROR_LABEL;
        }
        self.last_node.map(|n| n.as_str()).unwrap_or("")
    }
}

/// Latest state of a thread together with its pending node.
#[derive(Debug, Clone, PartialEq)]
pub struct StateView {
    pub thread_id: ThreadId,
    pub checkpoint_id: CheckpointId,
    pub state: WorkflowState,
    pub next_node: Option<Node>,
}

impl From<Checkpoint> for StateView {
    fn from(checkpoint: Checkpoint) -> Self {
        Self {
            thread_id: checkpoint.thread_id,
            checkpoint_id: checkpoint.id,
            state: checkpoint.state,
            next_node: checkpoint.next_node,
        }
    }
}

/// Summary line of one historical checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub thread_id: ThreadId,
    pub count: u32,
    pub last_node: Option<Node>,
    pub next_node: Option<Node>,
    pub revision_number: u32,
    pub checkpoint_id: CheckpointId,
}

impl From<&Checkpoint> for HistoryEntry {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            thread_id: checkpoint.thread_id,
            count: checkpoint.state.count,
            last_node: checkpoint.state.last_node,
            next_node: checkpoint.next_node,
            revision_number: checkpoint.state.revision_number,
            checkpoint_id: checkpoint.id,
        }
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}:{}",
            self.thread_id,
            self.count,
            self.last_node.map(|n| n.as_str()).unwrap_or(""),
            self.next_node.map(|n| n.as_str()).unwrap_or(""),
            self.revision_number,
            self.checkpoint_id
        )
    }
}
