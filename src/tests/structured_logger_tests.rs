use super::*;
use tempfile::TempDir;

fn create_test_logger() -> (StructuredLogger, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let logger =
        StructuredLogger::new("test-session", temp_dir.path()).expect("Failed to create logger");
    (logger, temp_dir)
}

fn read_entries(dir: &TempDir) -> Vec<LogEntry> {
    let content =
        std::fs::read_to_string(dir.path().join(LOG_FILE_NAME)).expect("Failed to read log file");
    content
        .lines()
        .map(|line| serde_json::from_str(line).expect("Failed to parse log entry"))
        .collect()
}

#[test]
fn test_entries_carry_session_and_component() {
    let (logger, temp_dir) = create_test_logger();

    logger.log("Engine", serde_json::json!({"type": "StepExecuted", "node": "planner"}));
    logger.log("Engine", serde_json::json!({"type": "StepExecuted", "node": "drafter"}));

    let entries = read_entries(&temp_dir);
    assert_eq!(entries.len(), 2);
    for entry in &entries {
        assert_eq!(entry.session_id, "test-session");
        assert_eq!(entry.component, "Engine");
        assert!(entry.ts.ends_with('Z'));
    }
    assert_eq!(entries[1].event["node"], "drafter");
    assert_eq!(logger.path(), temp_dir.path().join(LOG_FILE_NAME));
}

#[test]
fn test_sequence_numbers_monotonic() {
    let (logger, temp_dir) = create_test_logger();

    for i in 0..10 {
        logger.log("Test", serde_json::json!({"iteration": i}));
    }

    let seqs: Vec<u64> = read_entries(&temp_dir).iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (1..=10).collect::<Vec<_>>());
}

#[test]
fn test_new_run_request_bumps_run_id() {
    let (logger, temp_dir) = create_test_logger();

    logger.log_session(SessionEvent::RunRequested {
        thread_id: Some(0),
        new_run: false,
    });
    logger.log_session(SessionEvent::RunRequested {
        thread_id: None,
        new_run: true,
    });
    logger.log_session(SessionEvent::ThreadSwitched { thread_id: 3 });

    let entries = read_entries(&temp_dir);
    assert_eq!(
        entries.iter().map(|e| e.run_id).collect::<Vec<_>>(),
        vec![1, 2, 2]
    );
    assert_eq!(entries[0].component, "Session");
    assert_eq!(entries[0].event["type"], "RunRequested");
    assert_eq!(entries[2].event["thread_id"], 3);
}

#[test]
fn test_concurrent_logging() {
    use std::sync::Arc;
    use std::thread;

    let (logger, temp_dir) = create_test_logger();
    let logger = Arc::new(logger);

    let handles: Vec<_> = (0..5)
        .map(|t| {
            let logger = Arc::clone(&logger);
            thread::spawn(move || {
                for i in 0..20 {
                    logger.log("Thread", serde_json::json!({"thread": t, "iteration": i}));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    assert_eq!(read_entries(&temp_dir).len(), 100);
}

#[test]
fn test_reopening_appends() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    {
        let logger = StructuredLogger::new("first", temp_dir.path()).expect("logger");
        logger.log("Test", serde_json::json!({"n": 1}));
    }
    let logger = StructuredLogger::new("second", temp_dir.path()).expect("logger");
    logger.log("Test", serde_json::json!({"n": 2}));

    let entries = read_entries(&temp_dir);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].session_id, "first");
    assert_eq!(entries[1].session_id, "second");
    assert_eq!(logger.session_id(), "second");
}
