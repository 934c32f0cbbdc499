use super::*;
use crate::engine::{EngineSettings, MemoryCheckpointStore};
use crate::state::{Node, RetrievedDocument};
use crate::test_support::{memory_engine, ScriptedStages};
use tempfile::TempDir;

fn all_nodes() -> InterruptSet {
    Node::ALL.into_iter().collect()
}

async fn session_with(stages: ScriptedStages, profile: DocumentProfile) -> SessionController {
    let engine = memory_engine(Arc::new(stages), 10);
    SessionController::open(engine, SessionSettings::for_profile(profile, 1), None)
        .await
        .expect("open session")
}

async fn session() -> SessionController {
    session_with(ScriptedStages::new(), DocumentProfile::EsgProposal).await
}

async fn drain(session: &SessionController, task: &str, new_run: bool) -> Vec<Progress> {
    let (_, stream) = session
        .start_or_continue(task, None, all_nodes(), new_run)
        .await
        .expect("start");
    stream.collect().await
}

#[tokio::test]
async fn test_first_call_starts_a_thread_even_without_new_run() {
    let session = session().await;
    assert_eq!(session.current_thread(), None);

    let progress = drain(&session, "Test Proposal", false).await;

    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].last_node, "planner");
    assert_eq!(progress[0].next_node, "drafter");
    assert_eq!(progress[0].thread_id, ThreadId(0));
    assert_eq!(session.list_threads(), (vec![ThreadId(0)], Some(ThreadId(0))));
}

#[tokio::test]
async fn test_continue_follows_current_thread() {
    let session = session().await;
    drain(&session, "Test Proposal", true).await;

    let progress = drain(&session, "ignored", false).await;

    assert_eq!(progress[0].last_node, "drafter");
    assert_eq!(progress[0].count, 2);
    assert_eq!(progress[0].revision_number, 1);
}

#[tokio::test]
async fn test_course_profile_reports_deployment_labels() {
    let session = session_with(ScriptedStages::new(), DocumentProfile::Course).await;
    drain(&session, "Intro to ESG", true).await;

    let progress = drain(&session, "", false).await;

    assert_eq!(progress[0].last_node, "course designer");
    assert_eq!(progress[0].next_node, "reflect");
}

#[tokio::test]
async fn test_failed_step_reports_error_label() {
    let stages = ScriptedStages::new().fail_on_call(1);
    let session = session_with(stages, DocumentProfile::EsgProposal).await;

    let progress = drain(&session, "task", true).await;

    assert_eq!(progress.len(), 1);
    assert_eq!(progress[0].last_node, "error");
    assert_eq!(progress[0].next_node, "");
    assert!(progress[0].log.starts_with("Error in processing: "));
}

#[tokio::test]
async fn test_switch_thread_validates_id() {
    let session = session().await;
    drain(&session, "first", true).await;
    drain(&session, "second", true).await;

    let display = session.switch_thread(0).await.expect("switch");
    assert_eq!(display.thread_id, Some(ThreadId(0)));
    assert_eq!(display.state.map(|s| s.task), Some("first".to_string()));

    assert_eq!(
        session.switch_thread(9).await.expect_err("unknown"),
        WorkflowError::InvalidThread { thread_id: 9 }
    );
    assert_eq!(session.current_thread(), Some(ThreadId(0)));
}

#[tokio::test]
async fn test_select_history_step_restores_and_refreshes() {
    let session = session().await;
    drain(&session, "task", true).await;
    drain(&session, "", false).await;

    let display = session
        .select_history_step(1)
        .await
        .expect("restore")
        .expect("active thread");

    assert_eq!(display.checkpoint_id, Some(CheckpointId(3)));
    assert_eq!(display.last_node, "planner");
    assert_eq!(display.next_node, "drafter");
    assert_eq!(display.count, 1);
    assert_eq!(session.list_history().await.expect("history").len(), 3);
}

#[tokio::test]
async fn test_select_history_without_thread_returns_none() {
    let session = session().await;
    assert_eq!(session.select_history_step(1).await.expect("ok"), None);
    assert!(session.list_history().await.expect("history").is_empty());
}

#[tokio::test]
async fn test_read_field_uses_caller_keys() {
    let session = session().await;
    drain(&session, "task", true).await;
    drain(&session, "", false).await;

    let reading = session.read_field("proposal").await.expect("read");

    assert_eq!(reading.value, "draft 1");
    assert_eq!(reading.label, "Last Node: drafter, Thread: 0, Rev: 1, Step: 2");
    assert!(matches!(
        session.read_field("budget").await,
        Err(WorkflowError::UnknownField { .. })
    ));
}

#[tokio::test]
async fn test_read_materials_renders_numbered_block() {
    let documents = vec![
        RetrievedDocument::new("Carbon data", "carbon.md"),
        RetrievedDocument::new("Water data", "water.txt"),
    ];
    let session = session_with(
        ScriptedStages::with_documents(documents),
        DocumentProfile::EsgProposal,
    )
    .await;
    drain(&session, "task", true).await;

    let reading = session.read_field("materials").await.expect("read");

    assert_eq!(
        reading.value,
        "Document 1 - Source: carbon.md\nCarbon data\n\nDocument 2 - Source: water.txt\nWater data\n\n"
    );
}

#[tokio::test]
async fn test_read_empty_materials_explains() {
    let session = session_with(ScriptedStages::new(), DocumentProfile::Course).await;
    drain(&session, "task", true).await;

    let reading = session.read_field("materials").await.expect("read");

    assert_eq!(reading.value, "No teaching materials were retrieved for this task.");
}

#[tokio::test]
async fn test_read_without_thread_is_empty() {
    let session = session().await;
    assert_eq!(
        session.read_field("plan").await.expect("read"),
        FieldReading::default()
    );
    assert_eq!(session.display_state().await.expect("display"), DisplayState::default());
}

#[tokio::test]
async fn test_write_then_read_round_trip() {
    let session = session().await;
    drain(&session, "task", true).await;

    let outcome = session
        .write_field("plan", "planner", "X")
        .await
        .expect("write");

    assert!(matches!(outcome, WriteOutcome::Written(_)));
    assert_eq!(session.read_field("plan").await.expect("read").value, "X");
    assert_eq!(session.read_field("task").await.expect("read").value, "task");
}

#[tokio::test]
async fn test_write_accepts_deployment_label() {
    let session = session_with(ScriptedStages::new(), DocumentProfile::Course).await;
    drain(&session, "task", true).await;

    session
        .write_field("design", "course designer", "outline v2")
        .await
        .expect("write");

    let display = session.display_state().await.expect("display");
    assert_eq!(display.last_node, "planner");
    assert_eq!(display.next_node, "reflect");
    assert_eq!(display.state.map(|s| s.draft), Some("outline v2".to_string()));
}

#[tokio::test]
async fn test_write_rejects_unknown_node_and_ignores_without_thread() {
    let session = session().await;
    assert_eq!(
        session.write_field("plan", "planner", "x").await.expect("no thread"),
        WriteOutcome::NoState
    );

    drain(&session, "task", true).await;
    assert!(matches!(
        session.write_field("plan", "reviewer", "x").await,
        Err(WorkflowError::UnknownNode { .. })
    ));
}

#[tokio::test]
async fn test_write_refuses_counters_and_revision_limit() {
    let session = session().await;
    drain(&session, "task", true).await;

    for field in ["count", "max_revisions", "revision_number"] {
        assert!(matches!(
            session.write_field(field, "planner", "0").await,
            Err(WorkflowError::InvalidFieldValue { .. })
        ));
    }

    let display = session.display_state().await.expect("display");
    assert_eq!(display.count, 1);
    assert_eq!(display.state.map(|s| s.max_revisions), Some(1));
}

#[tokio::test]
async fn test_open_recovers_existing_threads() {
    let store = Arc::new(MemoryCheckpointStore::new());
    let engine = WorkflowEngine::new(
        store.clone(),
        Arc::new(ScriptedStages::new()),
        EngineSettings::default(),
        None,
    );
    let first = SessionController::open(
        engine.clone(),
        SessionSettings::for_profile(DocumentProfile::EsgProposal, 1),
        None,
    )
    .await
    .expect("open");
    drain(&first, "a", true).await;
    drain(&first, "b", true).await;

    let second = SessionController::open(
        engine,
        SessionSettings::for_profile(DocumentProfile::EsgProposal, 1),
        None,
    )
    .await
    .expect("reopen");

    assert_eq!(
        second.list_threads(),
        (vec![ThreadId(0), ThreadId(1)], Some(ThreadId(1)))
    );
}

#[tokio::test]
async fn test_session_events_are_logged() {
    let dir = TempDir::new().expect("temp dir");
    let logger = Arc::new(StructuredLogger::new("session-test", dir.path()).expect("logger"));
    let session = SessionController::open(
        memory_engine(Arc::new(ScriptedStages::new()), 10),
        SessionSettings::for_profile(DocumentProfile::EsgProposal, 1),
        Some(logger.clone()),
    )
    .await
    .expect("open");

    drain(&session, "task", true).await;
    session.switch_thread(0).await.expect("switch");

    let content = std::fs::read_to_string(logger.path()).expect("read log");
    let types: Vec<String> = content
        .lines()
        .map(|line| {
            let entry: serde_json::Value = serde_json::from_str(line).expect("json");
            entry["event"]["type"].as_str().unwrap_or_default().to_string()
        })
        .collect();
    assert_eq!(types, vec!["RunRequested", "ThreadSwitched"]);
}
