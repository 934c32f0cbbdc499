//! Stage functions of the revision graph: plan, draft and critique.
//!
//! Stages only produce content. The engine folds a [`StageOutput`] into the
//! successor state, so step and revision counters are never touched here.

mod prompts;

pub use prompts::{numbered_documents, DocumentProfile, StagePrompts};

use crate::agents::{ChatMessage, GenerationRequest, Generator};
use crate::documents::Retriever;
use crate::state::{Node, RetrievedDocument, WorkflowState};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Content produced by one stage execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutput {
    Plan {
        plan: String,
        retrieved_documents: Vec<RetrievedDocument>,
    },
    Draft {
        draft: String,
    },
    Critique {
        critique: String,
    },
}

impl StageOutput {
    /// Text shown in the run log for this step.
    pub fn summary(&self) -> &str {
        match self {
            StageOutput::Plan { plan, .. } => plan,
            StageOutput::Draft { draft } => draft,
            StageOutput::Critique { critique } => critique,
        }
    }
}

/// Executes the stage for a node against the current state.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    async fn run(&self, node: Node, state: &WorkflowState) -> Result<StageOutput>;
}

/// Stage executor backed by a text generator and a retriever.
pub struct StageRunner {
    generator: Arc<dyn Generator>,
    retriever: Arc<dyn Retriever>,
    prompts: StagePrompts,
    retrieval_k: usize,
}

impl StageRunner {
    pub fn new(
        generator: Arc<dyn Generator>,
        retriever: Arc<dyn Retriever>,
        prompts: StagePrompts,
        retrieval_k: usize,
    ) -> Self {
        Self {
            generator,
            retriever,
            prompts,
            retrieval_k,
        }
    }

    async fn plan(&self, state: &WorkflowState) -> Result<StageOutput> {
        let documents = self.retriever.retrieve(&state.task, self.retrieval_k).await;
        tracing::debug!(count = documents.len(), "Retrieved reference passages");

        let prompt = prompts::plan_prompt(&state.task, &documents);
        let plan = self
            .generator
            .generate(GenerationRequest::new(
                self.prompts.plan.clone(),
                vec![ChatMessage::user(prompt)],
            ))
            .await?;
        Ok(StageOutput::Plan {
            plan,
            retrieved_documents: documents,
        })
    }

    async fn draft(&self, state: &WorkflowState) -> Result<StageOutput> {
        let mut messages = vec![ChatMessage::user(prompts::draft_prompt(
            &state.task,
            &state.plan,
        ))];
        if state.has_critique() {
            messages.push(ChatMessage::user(prompts::critique_followup(
                &state.critique,
            )));
        }
        let draft = self
            .generator
            .generate(GenerationRequest::new(self.prompts.draft.clone(), messages))
            .await?;
        Ok(StageOutput::Draft { draft })
    }

    async fn finalize(&self, state: &WorkflowState) -> Result<StageOutput> {
        let critique = self
            .generator
            .generate(GenerationRequest::new(
                self.prompts.finalize.clone(),
                vec![ChatMessage::user(state.draft.clone())],
            ))
            .await?;
        Ok(StageOutput::Critique { critique })
    }
}

#[async_trait]
impl StageExecutor for StageRunner {
    async fn run(&self, node: Node, state: &WorkflowState) -> Result<StageOutput> {
        match node {
            Node::Planner => self.plan(state).await,
            Node::Drafter => self.draft(state).await,
            Node::Finalizer => self.finalize(state).await,
        }
    }
}

#[cfg(test)]
#[path = "tests/stage_tests.rs"]
mod tests;
