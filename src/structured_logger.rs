//! JSONL event log for reconstructing what a session did.
//!
//! Every line is one [`LogEntry`] carrying a monotonic sequence number, a
//! microsecond UTC timestamp, and the session/run ids used for correlation.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub const LOG_FILE_NAME: &str = "events.jsonl";

pub struct StructuredLogger {
    session_id: String,
    run_id: AtomicU64,
    seq: AtomicU64,
    log_file: Mutex<File>,
    log_path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub seq: u64,
    pub ts: String,
    pub session_id: String,
    /// Bumped each time a new run starts within the session.
    pub run_id: u64,
    pub component: String,
    pub event: Value,
}

/// Operator-facing actions recorded by the session layer.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum SessionEvent<'a> {
    RunRequested {
        thread_id: Option<u64>,
        new_run: bool,
    },
    ThreadSwitched {
        thread_id: u64,
    },
    HistorySelected {
        thread_id: u64,
        checkpoint_id: u64,
    },
    FieldWritten {
        thread_id: u64,
        field: &'a str,
        as_node: &'a str,
    },
    Exported {
        format: &'a str,
        path: &'a Path,
    },
}

impl StructuredLogger {
    /// Opens `<logs_dir>/events.jsonl` for appending.
    pub fn new(session_id: &str, logs_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(logs_dir)?;
        let log_path = logs_dir.join(LOG_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        Ok(Self {
            session_id: session_id.to_string(),
            run_id: AtomicU64::new(1),
            seq: AtomicU64::new(0),
            log_file: Mutex::new(file),
            log_path,
        })
    }

    pub fn increment_run_id(&self) {
        self.run_id.fetch_add(1, Ordering::SeqCst);
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Appends one event. Write failures are swallowed; logging never
    /// interrupts a run.
    pub fn log(&self, component: &str, event: impl Serialize) {
        let entry = LogEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            session_id: self.session_id.clone(),
            run_id: self.run_id.load(Ordering::SeqCst),
            component: component.to_string(),
            event: serde_json::to_value(event).unwrap_or(Value::Null),
        };

        if let Ok(mut file) = self.log_file.lock() {
            if let Ok(line) = serde_json::to_string(&entry) {
                let _ = writeln!(file, "{}", line);
                let _ = file.flush();
            }
        }
    }

    pub fn log_session(&self, event: SessionEvent<'_>) {
        if matches!(event, SessionEvent::RunRequested { new_run: true, .. }) {
            self.increment_run_id();
        }
        self.log("Session", event);
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

#[cfg(test)]
#[path = "tests/structured_logger_tests.rs"]
mod tests;
