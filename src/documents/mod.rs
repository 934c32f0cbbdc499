//! Uploaded reference materials and retrieval over them.

mod chunking;
mod keyword;

pub use chunking::{split_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use keyword::KeywordRetriever;

use crate::state::RetrievedDocument;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Extensions loaded as reference text.
pub const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];

/// Free-text query to ranked passages. Failures degrade to an empty list.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Vec<RetrievedDocument>;
}

/// Returns a fixed list of passages regardless of the query.
#[derive(Debug, Clone, Default)]
pub struct StaticRetriever {
    documents: Vec<RetrievedDocument>,
}

impl StaticRetriever {
    pub fn new(documents: Vec<RetrievedDocument>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, _query: &str, k: usize) -> Vec<RetrievedDocument> {
        self.documents.iter().take(k).cloned().collect()
    }
}

/// A file in the materials directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    /// Path relative to the materials directory, `/`-separated.
    pub name: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(String),
    /// Identical content was already stored under this name.
    AlreadyPresent(String),
}

/// Text of one reference file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText {
    pub source: String,
    pub content: String,
}

/// Immutable store of uploaded reference files. Files are added or
/// removed whole and never rewritten in place.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stored files, sorted by name. A missing directory is empty.
    pub fn list(&self) -> Result<Vec<StoredDocument>> {
        let mut documents = Vec::new();
        if self.root.is_dir() {
            self.walk(&self.root, &mut documents)?;
        }
        documents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(documents)
    }

    fn walk(&self, dir: &Path, out: &mut Vec<StoredDocument>) -> Result<()> {
        let entries = fs::read_dir(dir)
            .with_context(|| format!("Failed to read materials directory: {}", dir.display()))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.walk(&path, out)?;
            } else if path.is_file() {
                let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
                out.push(StoredDocument {
                    name: self.relative_name(&path),
                    size,
                });
            }
        }
        Ok(())
    }

    fn relative_name(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Copies `source` into the store under its file name.
    pub fn add(&self, source: &Path) -> Result<AddOutcome> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Not a file path: {}", source.display()))?
            .to_string();
        let content = fs::read(source)
            .with_context(|| format!("Failed to read material: {}", source.display()))?;
        let target = self.root.join(&name);

        if target.exists() {
            let existing = fs::read(&target)
                .with_context(|| format!("Failed to read stored material: {}", target.display()))?;
            if digest(&existing) == digest(&content) {
                tracing::debug!(name = %name, "Material already stored");
                return Ok(AddOutcome::AlreadyPresent(name));
            }
            bail!(
                "A different material named '{}' is already stored; remove it first",
                name
            );
        }

        fs::create_dir_all(&self.root).with_context(|| {
            format!("Failed to create materials directory: {}", self.root.display())
        })?;
        fs::write(&target, &content)
            .with_context(|| format!("Failed to store material: {}", target.display()))?;
        tracing::info!(name = %name, bytes = content.len(), "Stored material");
        Ok(AddOutcome::Added(name))
    }

    /// Deletes a stored file. Returns whether anything was removed.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let relative = Path::new(name);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("Invalid material name: {}", name);
        }
        let target = self.root.join(relative);
        if !target.is_file() {
            return Ok(false);
        }
        fs::remove_file(&target)
            .with_context(|| format!("Failed to remove material: {}", target.display()))?;
        tracing::info!(name = %name, "Removed material");
        Ok(true)
    }

    /// Contents of every stored text file. Unreadable files are skipped.
    pub fn load_texts(&self) -> Result<Vec<SourceText>> {
        let mut texts = Vec::new();
        for document in self.list()? {
            let path = self.root.join(&document.name);
            let is_text = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if !is_text {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(content) => texts.push(SourceText {
                    source: document.name,
                    content,
                }),
                Err(e) => tracing::warn!(name = %document.name, error = %e, "Skipping unreadable material"),
            }
        }
        Ok(texts)
    }
}

fn digest(bytes: &[u8]) -> Vec<u8> {
    Sha256::digest(bytes).to_vec()
}

#[cfg(test)]
#[path = "tests/documents_tests.rs"]
mod tests;
