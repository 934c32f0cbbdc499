use crate::export::ExportFormat;
use crate::stages::DocumentProfile;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "proposal-designer")]
#[command(about = "Plan, draft and critique long-form proposals with human-in-the-loop revision")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Workflow configuration file (defaults to the built-in workflow.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Working directory (defaults to current directory)
    #[arg(long, global = true)]
    pub working_dir: Option<PathBuf>,

    /// Document profile, overriding the configuration
    #[arg(long, global = true, value_parser = parse_profile)]
    pub profile: Option<DocumentProfile>,

    /// Checkpoint log, overriding the configuration
    #[arg(long, global = true)]
    pub checkpoint_log: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a new thread to completion without interruptions
    Run(RunArgs),
    /// Interactive controller over the checkpointed threads
    Session,
    /// Manage uploaded reference materials
    Materials {
        #[command(subcommand)]
        action: MaterialsAction,
    },
    /// Export the latest draft of a thread
    Export(ExportArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// The task - what to write (all arguments are joined)
    #[arg(trailing_var_arg = true, required = true)]
    pub task: Vec<String>,

    /// Revisions before the drafter ends the run
    #[arg(short, long)]
    pub max_revisions: Option<u32>,

    /// Export the final draft in these formats
    #[arg(long, value_delimiter = ',', value_parser = parse_format)]
    pub export: Vec<ExportFormat>,

    /// JSON file with export overrides (title, target company, objective)
    #[arg(long)]
    pub params: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum MaterialsAction {
    List,
    Add { files: Vec<PathBuf> },
    Remove { names: Vec<String> },
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Thread to export (defaults to the newest thread)
    #[arg(long)]
    pub thread: Option<u64>,

    #[arg(short, long, value_delimiter = ',', value_parser = parse_format, default_value = "csv")]
    pub format: Vec<ExportFormat>,

    #[arg(long)]
    pub params: Option<PathBuf>,
}

fn parse_profile(value: &str) -> Result<DocumentProfile, String> {
    DocumentProfile::parse(value).ok_or_else(|| {
        format!(
            "unknown profile '{}' (expected esg_proposal or course)",
            value
        )
    })
}

pub(crate) fn parse_format(value: &str) -> Result<ExportFormat, String> {
    ExportFormat::parse(value)
        .ok_or_else(|| format!("unknown export format '{}' (expected csv, xlsx or html)", value))
}
