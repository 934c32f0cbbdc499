//! Conditional edges of the revision graph.

use crate::state::{Node, WorkflowState};

/// Node every new thread starts at.
pub const ENTRY_NODE: Node = Node::Planner;

/// Next node after `last` produced `state`; `None` is the terminal.
///
/// The drafter ends the run once the revision count has passed the
/// thread's maximum, otherwise its draft goes to the finalizer for critique.
pub fn route(last: Option<Node>, state: &WorkflowState) -> Option<Node> {
    match last {
        None => Some(ENTRY_NODE),
        Some(Node::Planner) => Some(Node::Drafter),
        Some(Node::Drafter) if state.revision_number > state.max_revisions => None,
        Some(Node::Drafter) => Some(Node::Finalizer),
        Some(Node::Finalizer) => Some(Node::Drafter),
    }
}
