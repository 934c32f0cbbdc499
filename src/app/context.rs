//! Wiring of configuration, storage, generation and logging for one process.

use crate::agents::build_generator;
use crate::app::cli::GlobalArgs;
use crate::config::WorkflowConfig;
use crate::documents::{DocumentStore, KeywordRetriever};
use crate::engine::{EngineSettings, FileCheckpointStore, WorkflowEngine};
use crate::export::Exporter;
use crate::paths;
use crate::session::{SessionController, SessionSettings};
use crate::stages::{DocumentProfile, StageRunner};
use crate::structured_logger::StructuredLogger;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct AppContext {
    pub config: WorkflowConfig,
    pub working_dir: PathBuf,
    pub checkpoint_log: PathBuf,
    pub logger: Option<Arc<StructuredLogger>>,
}

impl AppContext {
    pub fn load(global: &GlobalArgs) -> Result<Self> {
        let working_dir = match &global.working_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to get current directory")?,
        };
        let mut config = WorkflowConfig::load_or_default(global.config.as_deref())?;
        if let Some(profile) = global.profile {
            config.profile = profile;
        }
        let checkpoint_log = resolve_checkpoint_log(global, &config, &working_dir)?;
        tracing::debug!(
            working_dir = %working_dir.display(),
            checkpoint_log = %checkpoint_log.display(),
            profile = config.profile.as_str(),
            "Loaded configuration"
        );

        Ok(Self {
            logger: open_logger(&working_dir),
            config,
            working_dir,
            checkpoint_log,
        })
    }

    pub fn profile(&self) -> DocumentProfile {
        self.config.profile
    }

    pub fn document_store(&self) -> DocumentStore {
        DocumentStore::new(self.config.materials_dir(&self.working_dir))
    }

    pub fn exporter(&self) -> Exporter {
        Exporter::new(
            self.config.export_dir(&self.working_dir),
            format!("{} Summary", self.profile().export_title()),
        )
    }

    pub fn checkpoint_store(&self) -> FileCheckpointStore {
        FileCheckpointStore::new(&self.checkpoint_log)
    }

    /// Builds the engine with the configured generator and keyword retrieval.
    pub fn engine(&self) -> Result<WorkflowEngine> {
        let agent_name = &self.config.generation.agent;
        let generator = build_generator(
            agent_name,
            self.config.generation_agent()?,
            &self.working_dir,
        )
        .with_context(|| format!("Failed to set up generation agent '{}'", agent_name))?;

        let retrieval = &self.config.retrieval;
        let retriever = KeywordRetriever::new(
            self.document_store(),
            retrieval.chunk_size,
            retrieval.chunk_overlap,
        );
        let stages = StageRunner::new(
            generator,
            Arc::new(retriever),
            self.profile().prompts(),
            retrieval.top_k,
        );

        Ok(WorkflowEngine::new(
            Arc::new(self.checkpoint_store()),
            Arc::new(stages),
            EngineSettings {
                max_steps: self.config.engine.max_steps,
            },
            self.logger.clone(),
        ))
    }

    pub async fn open_session(&self) -> Result<SessionController> {
        let settings = SessionSettings {
            profile: self.profile(),
            labels: self.config.node_labels(),
            default_max_revisions: self.config.engine.default_max_revisions,
        };
        SessionController::open(self.engine()?, settings, self.logger.clone())
            .await
            .context("Failed to open session")
    }
}

fn resolve_checkpoint_log(
    global: &GlobalArgs,
    config: &WorkflowConfig,
    working_dir: &Path,
) -> Result<PathBuf> {
    match global
        .checkpoint_log
        .as_ref()
        .or(config.storage.checkpoint_log.as_ref())
    {
        Some(path) => Ok(working_dir.join(path)),
        None => paths::checkpoint_log_path(working_dir),
    }
}

fn open_logger(working_dir: &Path) -> Option<Arc<StructuredLogger>> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let opened = paths::logs_dir(working_dir)
        .and_then(|dir| StructuredLogger::new(&session_id, &dir));
    match opened {
        Ok(logger) => {
            tracing::debug!(path = %logger.path().display(), "Structured event log opened");
            Some(Arc::new(logger))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Structured event log unavailable");
            None
        }
    }
}

#[cfg(test)]
#[path = "tests/context_tests.rs"]
mod tests;
