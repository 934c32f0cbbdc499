//! JSONL checkpoint log shared by all threads.
//!
//! Each line is one record: a thread allocation or a checkpoint. Writers
//! take an exclusive file lock, readers a shared one. Lines that fail to
//! parse (including lines that are not UTF-8) are skipped, and stored
//! states are decoded through the lenient [`WorkflowState::from_value`] so
//! a damaged field never blocks a thread. A record left without its
//! newline by an interrupted write is closed off before the next append.
//! All file work runs on the blocking pool.

use super::checkpoint::{Checkpoint, CheckpointId, CheckpointStore, ThreadId};
use super::errors::WorkflowError;
use crate::state::{Node, WorkflowState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A stored checkpoint line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCheckpoint {
    pub thread_id: u64,
    pub checkpoint_id: u64,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub next_node: Option<String>,
    pub state: Value,
}

impl StoredCheckpoint {
    fn into_checkpoint(self) -> Checkpoint {
        Checkpoint {
            thread_id: ThreadId(self.thread_id),
            id: CheckpointId(self.checkpoint_id),
            created_at: self.recorded_at,
            source: self.source.as_deref().and_then(Node::parse),
            next_node: self.next_node.as_deref().and_then(Node::parse),
            state: WorkflowState::from_value(&self.state),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum StoredRecord {
    ThreadCreated {
        thread_id: u64,
        recorded_at: DateTime<Utc>,
    },
    Checkpoint(StoredCheckpoint),
}

/// File-backed [`CheckpointStore`].
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    log_path: PathBuf,
}

impl FileCheckpointStore {
    /// Opens (or lazily creates) the log at `log_path`. Threads recorded by
    /// earlier processes stay addressable and allocation continues after them.
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    fn read_records(&self) -> Result<Vec<StoredRecord>, WorkflowError> {
        let file = match File::open(&self.log_path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        file.lock_shared()?;
        parse_records(&file, &self.log_path)
    }

    fn checkpoints_for(&self, thread_id: ThreadId) -> Result<Vec<Checkpoint>, WorkflowError> {
        let records = self.read_records()?;
        if !thread_known(&records, thread_id) {
            return Err(WorkflowError::ThreadNotFound {
                thread_id: thread_id.0,
            });
        }
        Ok(records
            .into_iter()
            .filter_map(|record| match record {
                StoredRecord::Checkpoint(c) if c.thread_id == thread_id.0 => {
                    Some(c.into_checkpoint())
                }
                _ => None,
            })
            .collect())
    }

    /// Runs `write` with the log open for append under an exclusive lock,
    /// handing it every record already on disk.
    fn with_exclusive<T>(
        &self,
        write: impl FnOnce(&[StoredRecord]) -> Result<(StoredRecord, T), WorkflowError>,
    ) -> Result<T, WorkflowError> {
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.log_path)?;
        file.lock_exclusive()?;

        let records = parse_records(&file, &self.log_path)?;
        let (record, result) = write(&records)?;

        let line = serde_json::to_string(&record).map_err(|e| WorkflowError::StorageFailure {
            message: e.to_string(),
        })?;
        if ends_mid_record(&file)? {
            tracing::warn!(
                path = %self.log_path.display(),
                "Checkpoint log ends in a partial record; terminating it"
            );
            file.write_all(b"\n")?;
        }
        writeln!(file, "{}", line)?;
        file.flush()?;
        file.sync_all()?;
        Ok(result)
    }

    /// Runs `work` against a clone of the store on the blocking pool.
    async fn blocking<T, F>(&self, work: F) -> Result<T, WorkflowError>
    where
        T: Send + 'static,
        F: FnOnce(&FileCheckpointStore) -> Result<T, WorkflowError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || work(&store))
            .await
            .map_err(|e| WorkflowError::StorageFailure {
                message: format!("checkpoint log task failed: {}", e),
            })?
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn allocate_thread(&self) -> Result<ThreadId, WorkflowError> {
        self.blocking(|store| {
            store.with_exclusive(|records| {
                let next = records
                    .iter()
                    .map(record_thread)
                    .max()
                    .map_or(0, |max| max + 1);
                let record = StoredRecord::ThreadCreated {
                    thread_id: next,
                    recorded_at: Utc::now(),
                };
                Ok((record, ThreadId(next)))
            })
        })
        .await
    }

    async fn threads(&self) -> Result<Vec<ThreadId>, WorkflowError> {
        let records = self.blocking(|store| store.read_records()).await?;
        let mut ids: Vec<u64> = records.iter().map(record_thread).collect();
        ids.sort_unstable();
        ids.dedup();
        Ok(ids.into_iter().map(ThreadId).collect())
    }

    async fn append(
        &self,
        thread_id: ThreadId,
        source: Option<Node>,
        next_node: Option<Node>,
        state: WorkflowState,
    ) -> Result<Checkpoint, WorkflowError> {
        let state_value =
            serde_json::to_value(&state).map_err(|e| WorkflowError::StorageFailure {
                message: e.to_string(),
            })?;

        self.blocking(move |store| {
            store.with_exclusive(move |records| {
                if !thread_known(records, thread_id) {
                    return Err(WorkflowError::ThreadNotFound {
                        thread_id: thread_id.0,
                    });
                }
                let next_id = records
                    .iter()
                    .filter_map(|record| match record {
                        StoredRecord::Checkpoint(c) if c.thread_id == thread_id.0 => {
                            Some(c.checkpoint_id)
                        }
                        _ => None,
                    })
                    .max()
                    .map_or(0, |max| max + 1);

                let stored = StoredCheckpoint {
                    thread_id: thread_id.0,
                    checkpoint_id: next_id,
                    recorded_at: Utc::now(),
                    source: source.map(|n| n.as_str().to_string()),
                    next_node: next_node.map(|n| n.as_str().to_string()),
                    state: state_value,
                };
                let checkpoint = Checkpoint {
                    thread_id,
                    id: CheckpointId(next_id),
                    created_at: stored.recorded_at,
                    source,
                    next_node,
                    state,
                };
                Ok((StoredRecord::Checkpoint(stored), checkpoint))
            })
        })
        .await
    }

    async fn latest(&self, thread_id: ThreadId) -> Result<Option<Checkpoint>, WorkflowError> {
        Ok(self
            .blocking(move |store| store.checkpoints_for(thread_id))
            .await?
            .into_iter()
            .max_by_key(|c| c.id))
    }

    async fn history(&self, thread_id: ThreadId) -> Result<Vec<Checkpoint>, WorkflowError> {
        let mut checkpoints = self
            .blocking(move |store| store.checkpoints_for(thread_id))
            .await?;
        checkpoints.sort_by_key(|c| c.id);
        Ok(checkpoints)
    }
}

fn record_thread(record: &StoredRecord) -> u64 {
    match record {
        StoredRecord::ThreadCreated { thread_id, .. } => *thread_id,
        StoredRecord::Checkpoint(c) => c.thread_id,
    }
}

fn thread_known(records: &[StoredRecord], thread_id: ThreadId) -> bool {
    records.iter().any(|r| record_thread(r) == thread_id.0)
}

fn parse_records(file: &File, path: &Path) -> Result<Vec<StoredRecord>, WorkflowError> {
    let mut reader = BufReader::new(file.try_clone()?);
    reader.seek(SeekFrom::Start(0))?;

    let mut records = Vec::new();
    let mut buf = Vec::new();
    let mut line_number = 0usize;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_number += 1;
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    line = line_number,
                    error = %e,
                    "Skipping checkpoint record that is not UTF-8"
                );
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(
                path = %path.display(),
                line = line_number,
                error = %e,
                "Skipping unreadable checkpoint record"
            ),
        }
    }
    Ok(records)
}

fn ends_mid_record(file: &File) -> Result<bool, WorkflowError> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut reader = file.try_clone()?;
    reader.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    reader.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

#[cfg(test)]
#[path = "tests/file_store_tests.rs"]
mod tests;
