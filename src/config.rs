use crate::agents::AgentConfig;
use crate::documents::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::engine::{InterruptSet, DEFAULT_MAX_STEPS};
use crate::stages::DocumentProfile;
use crate::state::{Node, DEFAULT_MAX_REVISIONS};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const DEFAULT_WORKFLOW_YAML: &str = include_str!("../workflow.yaml");

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub profile: DocumentProfile,
    pub generation: GenerationConfig,
    pub agents: HashMap<String, AgentConfig>,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Overrides the profile's node labels.
    #[serde(default)]
    pub node_labels: Option<NodeLabels>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Name of the entry in `agents` used by every stage.
    pub agent: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Executed steps allowed per thread.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_max_revisions")]
    pub default_max_revisions: u32,
    /// Node labels after which automatic continuation stops.
    #[serde(default = "default_interrupt_after")]
    pub interrupt_after: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            default_max_revisions: default_max_revisions(),
            interrupt_after: default_interrupt_after(),
        }
    }
}

fn default_max_steps() -> u32 {
    DEFAULT_MAX_STEPS
}

fn default_max_revisions() -> u32 {
    DEFAULT_MAX_REVISIONS
}

fn default_interrupt_after() -> Vec<String> {
    Node::ALL.iter().map(|n| n.as_str().to_string()).collect()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_materials_dir")]
    pub materials_dir: PathBuf,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            materials_dir: default_materials_dir(),
            top_k: default_top_k(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_materials_dir() -> PathBuf {
    PathBuf::from("materials")
}

fn default_top_k() -> usize {
    3
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
        }
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Checkpoint log location. `None` uses the per-working-directory default.
    #[serde(default)]
    pub checkpoint_log: Option<PathBuf>,
}

/// Deployment names of the three nodes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NodeLabels {
    pub planner: String,
    pub drafter: String,
    pub finalizer: String,
}

impl NodeLabels {
    pub fn for_profile(profile: DocumentProfile) -> Self {
        match profile {
            DocumentProfile::EsgProposal => Self {
                planner: "planner".to_string(),
                drafter: "drafter".to_string(),
                finalizer: "finalizer".to_string(),
            },
            DocumentProfile::Course => Self {
                planner: "planner".to_string(),
                drafter: "course designer".to_string(),
                finalizer: "reflect".to_string(),
            },
        }
    }

    pub fn label(&self, node: Node) -> &str {
        match node {
            Node::Planner => &self.planner,
            Node::Drafter => &self.drafter,
            Node::Finalizer => &self.finalizer,
        }
    }

    /// Maps a deployment label (or an internal node name) onto a node.
    pub fn resolve(&self, label: &str) -> Option<Node> {
        let wanted = label.trim();
        Node::ALL
            .into_iter()
            .find(|node| self.label(*node).eq_ignore_ascii_case(wanted))
            .or_else(|| Node::parse(wanted))
    }

    /// Label for an optional node; the terminal renders as an empty string.
    pub fn display(&self, node: Option<Node>) -> &str {
        node.map_or("", |n| self.label(n))
    }
}

impl WorkflowConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// The embedded `workflow.yaml`.
    pub fn default_config() -> Result<Self> {
        let config: Self = serde_yaml::from_str(DEFAULT_WORKFLOW_YAML)
            .context("Failed to parse embedded workflow.yaml")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Self::default_config(),
        }
    }

    fn validate(&self) -> Result<()> {
        if !self.agents.contains_key(&self.generation.agent) {
            bail!(
                "Generation agent '{}' not found in agents configuration",
                self.generation.agent
            );
        }
        if self.engine.max_steps == 0 {
            bail!("engine.max_steps must be at least 1");
        }
        if self.retrieval.chunk_size == 0 {
            bail!("retrieval.chunk_size must be at least 1");
        }
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            bail!(
                "retrieval.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.retrieval.chunk_overlap,
                self.retrieval.chunk_size
            );
        }
        self.interrupt_set()?;
        Ok(())
    }

    pub fn node_labels(&self) -> NodeLabels {
        self.node_labels
            .clone()
            .unwrap_or_else(|| NodeLabels::for_profile(self.profile))
    }

    /// Resolves `engine.interrupt_after` through the node labels.
    pub fn interrupt_set(&self) -> Result<InterruptSet> {
        let labels = self.node_labels();
        self.engine
            .interrupt_after
            .iter()
            .map(|label| {
                labels
                    .resolve(label)
                    .with_context(|| format!("Unknown node '{}' in engine.interrupt_after", label))
            })
            .collect()
    }

    pub fn get_agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.get(name)
    }

    pub fn generation_agent(&self) -> Result<&AgentConfig> {
        self.get_agent(&self.generation.agent).with_context(|| {
            format!(
                "Generation agent '{}' not found in agents configuration",
                self.generation.agent
            )
        })
    }

    pub fn materials_dir(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.retrieval.materials_dir)
    }

    pub fn export_dir(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.export.dir)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
