use anyhow::Result;
use clap::Parser;
use proposal_designer::app::{self, cli::Cli};
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("PROPOSAL_DESIGNER_GIT_SHA"),
        "proposal-designer starting"
    );
    app::run(cli).await
}
