//! Canonical workflow state carried between stages and stored in checkpoints.
//!
//! Every transition builds its successor through [`WorkflowState::advance`],
//! and every decode from persisted data goes through
//! [`WorkflowState::from_value`], so no partially populated state can exist.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

pub const DEFAULT_MAX_REVISIONS: u32 = 2;
pub const DEFAULT_PLAN: &str = "no plan";
pub const DEFAULT_DRAFT: &str = "no draft";
pub const DEFAULT_CRITIQUE: &str = "no critique";
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// One of the three processing stages of the revision graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Planner,
    Drafter,
    Finalizer,
}

impl Node {
    pub const ALL: [Node; 3] = [Node::Planner, Node::Drafter, Node::Finalizer];

    /// Internal identifier used in checkpoints and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Planner => "planner",
            Node::Drafter => "drafter",
            Node::Finalizer => "finalizer",
        }
    }

    /// Parses an internal identifier. Deployment labels are resolved by
    /// [`crate::config::NodeLabels`].
    pub fn parse(name: &str) -> Option<Node> {
        match name.trim().to_ascii_lowercase().as_str() {
            "planner" => Some(Node::Planner),
            "drafter" => Some(Node::Drafter),
            "finalizer" => Some(Node::Finalizer),
            _ => None,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A retrieved reference passage with its source attribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub content: String,
    pub source: String,
}

impl RetrievedDocument {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
        }
    }
}

/// The document under revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub task: String,
    pub plan: String,
    pub draft: String,
    pub critique: String,
    pub revision_number: u32,
    pub max_revisions: u32,
    pub count: u32,
    pub last_node: Option<Node>,
    pub retrieved_documents: Vec<RetrievedDocument>,
}

impl WorkflowState {
    /// Fresh state for a new thread. All non-input fields take their defaults.
    pub fn new(task: impl Into<String>, max_revisions: u32) -> Self {
        Self {
            task: task.into(),
            plan: DEFAULT_PLAN.to_string(),
            draft: DEFAULT_DRAFT.to_string(),
            critique: DEFAULT_CRITIQUE.to_string(),
            revision_number: 0,
            max_revisions,
            count: 0,
            last_node: None,
            retrieved_documents: Vec::new(),
        }
    }

    /// Successor produced by executing `node`: one more step, tagged with
    /// the node, and one more revision when the node is the drafter.
    /// Content fields are carried over for the stage to replace.
    pub fn advance(&self, node: Node) -> Self {
        let mut next = self.clone();
        next.count = self.count.saturating_add(1);
        next.last_node = Some(node);
        if node == Node::Drafter {
            next.revision_number = self.revision_number.saturating_add(1);
        }
        next
    }

    /// True once a critique other than the placeholder exists.
    pub fn has_critique(&self) -> bool {
        let critique = self.critique.trim();
        !critique.is_empty() && critique != DEFAULT_CRITIQUE
    }

    /// Decodes a persisted state, coercing absent or ill-typed fields to
    /// their defaults instead of failing.
    pub fn from_value(value: &Value) -> Self {
        let empty = serde_json::Map::new();
        let map = value.as_object().unwrap_or(&empty);

        Self {
            task: coerce_string(map.get("task"), ""),
            plan: coerce_string(map.get("plan"), DEFAULT_PLAN),
            draft: coerce_string(map.get("draft"), DEFAULT_DRAFT),
            critique: coerce_string(map.get("critique"), DEFAULT_CRITIQUE),
            revision_number: coerce_u32(map.get("revision_number")).unwrap_or(0),
            max_revisions: coerce_u32(map.get("max_revisions")).unwrap_or(DEFAULT_MAX_REVISIONS),
            count: coerce_u32(map.get("count")).unwrap_or(0),
            last_node: map
                .get("last_node")
                .and_then(Value::as_str)
                .and_then(Node::parse),
            retrieved_documents: coerce_documents(map.get("retrieved_documents")),
        }
    }

    /// Reads a single field.
    pub fn field(&self, key: FieldKey) -> FieldValue {
        match key {
            FieldKey::Task => FieldValue::Text(self.task.clone()),
            FieldKey::Plan => FieldValue::Text(self.plan.clone()),
            FieldKey::Draft => FieldValue::Text(self.draft.clone()),
            FieldKey::Critique => FieldValue::Text(self.critique.clone()),
            FieldKey::RevisionNumber => FieldValue::Number(self.revision_number),
            FieldKey::MaxRevisions => FieldValue::Number(self.max_revisions),
            FieldKey::Count => FieldValue::Number(self.count),
            FieldKey::LastNode => FieldValue::Node(self.last_node),
            FieldKey::RetrievedDocuments => {
                FieldValue::Documents(self.retrieved_documents.clone())
            }
        }
    }

    /// Returns a copy with one field replaced from caller-supplied text.
    ///
    /// Only content fields are writable. The counters, the revision limit
    /// and the node of record belong to the engine. Documents must be a
    /// JSON array of `{content, source}` objects.
    pub fn with_field(&self, key: FieldKey, raw: &str) -> Result<Self, String> {
        let mut next = self.clone();
        match key {
            FieldKey::Task => next.task = raw.to_string(),
            FieldKey::Plan => next.plan = raw.to_string(),
            FieldKey::Draft => next.draft = raw.to_string(),
            FieldKey::Critique => next.critique = raw.to_string(),
            FieldKey::RevisionNumber
            | FieldKey::MaxRevisions
            | FieldKey::Count
            | FieldKey::LastNode => {
                return Err(format!(
                    "{} is maintained by the workflow and cannot be edited",
                    key
                ));
            }
            FieldKey::RetrievedDocuments => {
                let value: Value = serde_json::from_str(raw)
                    .map_err(|e| format!("documents must be a JSON array: {}", e))?;
                if !value.is_array() {
                    return Err("documents must be a JSON array".to_string());
                }
                next.retrieved_documents = coerce_documents(Some(&value));
            }
        }
        Ok(next)
    }
}

/// Internal workflow field addressed by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Task,
    Plan,
    Draft,
    Critique,
    RevisionNumber,
    MaxRevisions,
    Count,
    LastNode,
    RetrievedDocuments,
}

/// Caller-facing aliases. Anything not listed maps to the field of the same name.
const FIELD_ALIASES: &[(&str, FieldKey)] = &[
    ("proposal", FieldKey::Draft),
    ("design", FieldKey::Draft),
    ("materials", FieldKey::RetrievedDocuments),
];

impl FieldKey {
    pub const ALL: [FieldKey; 9] = [
        FieldKey::Task,
        FieldKey::Plan,
        FieldKey::Draft,
        FieldKey::Critique,
        FieldKey::RevisionNumber,
        FieldKey::MaxRevisions,
        FieldKey::Count,
        FieldKey::LastNode,
        FieldKey::RetrievedDocuments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::Task => "task",
            FieldKey::Plan => "plan",
            FieldKey::Draft => "draft",
            FieldKey::Critique => "critique",
            FieldKey::RevisionNumber => "revision_number",
            FieldKey::MaxRevisions => "max_revisions",
            FieldKey::Count => "count",
            FieldKey::LastNode => "last_node",
            FieldKey::RetrievedDocuments => "retrieved_documents",
        }
    }

    /// Maps a caller-facing key onto an internal field.
    pub fn resolve(key: &str) -> Option<FieldKey> {
        let key = key.trim().to_ascii_lowercase();
        FIELD_ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, field)| *field)
            .or_else(|| FieldKey::ALL.into_iter().find(|f| f.as_str() == key))
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A field value as read from a state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Number(u32),
    Node(Option<Node>),
    Documents(Vec<RetrievedDocument>),
}

fn coerce_string(value: Option<&Value>, default: &str) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        _ => default.to_string(),
    }
}

fn coerce_u32(value: Option<&Value>) -> Option<u32> {
    match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                n.as_f64()
                    .filter(|f| f.is_finite() && *f >= 0.0)
                    .map(|f| f as u64)
            })
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u32>().ok(),
        _ => None,
    }
}

fn coerce_documents(value: Option<&Value>) -> Vec<RetrievedDocument> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_object)
        .map(|doc| RetrievedDocument {
            content: coerce_string(doc.get("content"), ""),
            source: coerce_string(doc.get("source"), UNKNOWN_SOURCE),
        })
        .collect()
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
