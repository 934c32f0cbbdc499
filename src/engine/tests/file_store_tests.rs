use super::*;
use std::io::Write as _;
use tempfile::TempDir;

fn store_in(dir: &TempDir) -> FileCheckpointStore {
    FileCheckpointStore::new(dir.path().join("state").join("checkpoints.jsonl"))
}

#[tokio::test]
async fn test_missing_log_has_no_threads() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);

    assert!(store.threads().await.expect("threads").is_empty());
    assert_eq!(
        store.latest(ThreadId(0)).await.expect_err("unknown"),
        WorkflowError::ThreadNotFound { thread_id: 0 }
    );
}

#[tokio::test]
async fn test_append_assigns_sequential_ids_per_thread() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    let first = store.allocate_thread().await.expect("allocate");
    let second = store.allocate_thread().await.expect("allocate");

    let state = WorkflowState::new("task", 1);
    store
        .append(first, None, Some(Node::Planner), state.clone())
        .await
        .expect("append");
    let planned = state.advance(Node::Planner);
    let checkpoint = store
        .append(first, Some(Node::Planner), Some(Node::Drafter), planned.clone())
        .await
        .expect("append");
    let other = store
        .append(second, None, Some(Node::Planner), state)
        .await
        .expect("append");

    assert_eq!(checkpoint.id, CheckpointId(1));
    assert_eq!(other.id, CheckpointId(0));
    let latest = store.latest(first).await.expect("latest").expect("some");
    assert_eq!(latest.state, planned);
    assert_eq!(latest.source, Some(Node::Planner));
    assert_eq!(latest.next_node, Some(Node::Drafter));
    assert_eq!(store.history(first).await.expect("history").len(), 2);
}

#[tokio::test]
async fn test_append_to_unknown_thread_fails() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);

    let err = store
        .append(ThreadId(7), None, None, WorkflowState::new("t", 1))
        .await
        .expect_err("unknown thread");

    assert_eq!(err, WorkflowError::ThreadNotFound { thread_id: 7 });
}

#[tokio::test]
async fn test_malformed_records_are_coerced_or_skipped() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    let thread = store.allocate_thread().await.expect("allocate");
    store
        .append(thread, None, Some(Node::Planner), WorkflowState::new("task", 1))
        .await
        .expect("append");

    let mut file = OpenOptions::new()
        .append(true)
        .open(store.path())
        .expect("open log");
    writeln!(file, "this is not json").expect("write");
    writeln!(
        file,
        "{}",
        serde_json::json!({
            "record": "checkpoint",
            "thread_id": 0,
            "checkpoint_id": 1,
            "recorded_at": "2026-01-01T00:00:00Z",
            "source": "drafter",
            "next_node": "finalizer",
            "state": {"task": "task", "revision_number": "abc", "count": 2}
        })
    )
    .expect("write");
    drop(file);

    let latest = store.latest(thread).await.expect("latest").expect("some");
    assert_eq!(latest.id, CheckpointId(1));
    assert_eq!(latest.state.revision_number, 0);
    assert_eq!(latest.state.count, 2);
    assert_eq!(latest.next_node, Some(Node::Finalizer));

    let next = store
        .append(thread, None, None, latest.state)
        .await
        .expect("append after garbage");
    assert_eq!(next.id, CheckpointId(2));
}

#[tokio::test]
async fn test_reopened_store_continues_allocation() {
    let dir = TempDir::new().expect("temp dir");
    {
        let store = store_in(&dir);
        store.allocate_thread().await.expect("allocate");
        store.allocate_thread().await.expect("allocate");
    }

    let store = store_in(&dir);
    assert_eq!(
        store.threads().await.expect("threads"),
        vec![ThreadId(0), ThreadId(1)]
    );
    assert_eq!(store.allocate_thread().await.expect("allocate"), ThreadId(2));
}

#[tokio::test]
async fn test_non_utf8_line_is_skipped() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    let thread = store.allocate_thread().await.expect("allocate");
    store
        .append(thread, None, Some(Node::Planner), WorkflowState::new("task", 1))
        .await
        .expect("append");

    let mut file = OpenOptions::new()
        .append(true)
        .open(store.path())
        .expect("open log");
    file.write_all(b"{\"record\":\"garbage\xff\xfe\"}\n")
        .expect("write");
    drop(file);

    let latest = store.latest(thread).await.expect("latest").expect("some");
    assert_eq!(latest.id, CheckpointId(0));
    assert_eq!(store.threads().await.expect("threads"), vec![thread]);

    let next = store
        .append(thread, None, None, latest.state)
        .await
        .expect("append after damaged line");
    assert_eq!(next.id, CheckpointId(1));
    assert_eq!(store.history(thread).await.expect("history").len(), 2);
}

#[tokio::test]
async fn test_append_after_partial_record_starts_new_line() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    let thread = store.allocate_thread().await.expect("allocate");
    store
        .append(thread, None, Some(Node::Planner), WorkflowState::new("task", 1))
        .await
        .expect("append");

    let mut file = OpenOptions::new()
        .append(true)
        .open(store.path())
        .expect("open log");
    write!(file, "{{\"record\":\"checkpoint\",\"thread_id\":0").expect("write");
    drop(file);

    let checkpoint = store
        .append(thread, None, None, WorkflowState::new("task", 1))
        .await
        .expect("append after partial record");

    assert_eq!(checkpoint.id, CheckpointId(1));
    let history = store.history(thread).await.expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].id, CheckpointId(1));
    let content = std::fs::read_to_string(store.path()).expect("read log");
    assert!(content.ends_with("}\n"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_appends_get_distinct_ids() {
    let dir = TempDir::new().expect("temp dir");
    let store = store_in(&dir);
    let thread = store.allocate_thread().await.expect("allocate");

    let appends = (0..8).map(|i| {
        let store = store.clone();
        async move {
            store
                .append(thread, None, None, WorkflowState::new(format!("task {}", i), 1))
                .await
                .expect("append")
                .id
        }
    });
    let mut ids = futures::future::join_all(appends).await;
    ids.sort();

    assert_eq!(ids, (0..8).map(CheckpointId).collect::<Vec<_>>());
    assert_eq!(store.history(thread).await.expect("history").len(), 8);
}
