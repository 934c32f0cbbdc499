//! Deterministic stand-ins for generation and stage execution in tests.

use crate::agents::{GenerationRequest, Generator};
use crate::engine::{EngineSettings, MemoryCheckpointStore, WorkflowEngine};
use crate::stages::{StageExecutor, StageOutput};
use crate::state::{Node, RetrievedDocument, WorkflowState};
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Generator that replays queued responses and records every request.
/// Once the queue is empty it answers `"generated <n>"`.
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: &[&str]) -> Self {
        let generator = Self::new();
        for response in responses {
            generator.push_response(response);
        }
        generator
    }

    pub fn push_response(&self, response: &str) {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(Ok(response.to_string()));
    }

    pub fn push_failure(&self, message: &str) {
        self.responses
            .lock()
            .expect("responses lock")
            .push_back(Err(message.to_string()));
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let call = {
            let mut requests = self.requests.lock().expect("requests lock");
            requests.push(request);
            requests.len()
        };
        match self.responses.lock().expect("responses lock").pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => bail!(message),
            None => Ok(format!("generated {}", call)),
        }
    }
}

/// Stage executor producing content derived from the incoming state, with
/// optional one-shot failures on chosen calls (1-based).
#[derive(Default)]
pub struct ScriptedStages {
    calls: Mutex<Vec<Node>>,
    fail_on: Mutex<Vec<usize>>,
    documents: Vec<RetrievedDocument>,
}

impl ScriptedStages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: Vec<RetrievedDocument>) -> Self {
        Self {
            documents,
            ..Self::default()
        }
    }

    pub fn fail_on_call(self, call: usize) -> Self {
        self.fail_on.lock().expect("fail lock").push(call);
        self
    }

    /// Nodes executed so far, failures included.
    pub fn calls(&self) -> Vec<Node> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl StageExecutor for ScriptedStages {
    async fn run(&self, node: Node, state: &WorkflowState) -> Result<StageOutput> {
        let call = {
            let mut calls = self.calls.lock().expect("calls lock");
            calls.push(node);
            calls.len()
        };
        {
            let mut fail_on = self.fail_on.lock().expect("fail lock");
            if let Some(pos) = fail_on.iter().position(|c| *c == call) {
                fail_on.remove(pos);
                bail!("generation backend unavailable");
            }
        }
        Ok(match node {
            Node::Planner => StageOutput::Plan {
                plan: format!("plan for {}", state.task),
                retrieved_documents: self.documents.clone(),
            },
            Node::Drafter => StageOutput::Draft {
                draft: format!("draft {}", state.revision_number + 1),
            },
            Node::Finalizer => StageOutput::Critique {
                critique: format!("critique of {}", state.draft),
            },
        })
    }
}

pub fn memory_engine(stages: Arc<ScriptedStages>, max_steps: u32) -> WorkflowEngine {
    WorkflowEngine::new(
        Arc::new(MemoryCheckpointStore::new()),
        stages,
        EngineSettings { max_steps },
        None,
    )
}
