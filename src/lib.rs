//! Checkpointed plan, draft and critique workflow for long-form proposals.

pub mod agents;
pub mod app;
pub mod config;
pub mod documents;
pub mod engine;
pub mod export;
pub mod paths;
pub mod session;
pub mod stages;
pub mod state;
pub mod structured_logger;

#[cfg(test)]
mod test_support;
