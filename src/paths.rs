//! Home-based storage paths for proposal-designer persistence.
//!
//! Everything lives under `~/.proposal-designer/` (or `$PROPOSAL_DESIGNER_HOME`):
//! - `state/<wd-hash>/checkpoints.jsonl` - Checkpoint log for a working directory
//! - `logs/<wd-hash>/events.jsonl` - Structured event log for a working directory

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = ".proposal-designer";

/// Overrides the storage root.
pub const HOME_ENV: &str = "PROPOSAL_DESIGNER_HOME";

/// Returns the storage root, creating it if needed.
pub fn app_home_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV) {
        Some(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => dirs::home_dir()
            .context("Could not determine home directory for proposal-designer storage")?
            .join(APP_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create storage directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns `<root>/state/<wd-hash>/`, creating it if needed.
pub fn state_dir(working_dir: &Path) -> Result<PathBuf> {
    let dir = app_home_dir()?
        .join("state")
        .join(working_dir_hash(working_dir));
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create state directory: {}", dir.display()))?;
    Ok(dir)
}

pub fn checkpoint_log_path(working_dir: &Path) -> Result<PathBuf> {
    Ok(state_dir(working_dir)?.join("checkpoints.jsonl"))
}

/// Returns `<root>/logs/<wd-hash>/`, creating it if needed.
pub fn logs_dir(working_dir: &Path) -> Result<PathBuf> {
    let dir = app_home_dir()?
        .join("logs")
        .join(working_dir_hash(working_dir));
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}

/// Short stable hash of a working directory, 12 hex characters.
pub fn working_dir_hash(path: &Path) -> String {
    let bytes = match fs::canonicalize(path) {
        Ok(canonical) => canonical.to_string_lossy().into_owned().into_bytes(),
        Err(_) => path.to_string_lossy().into_owned().into_bytes(),
    };
    let digest = Sha256::digest(&bytes);
    hex_encode(&digest[..6])
}

pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
#[path = "tests/paths_tests.rs"]
mod tests;
