use super::*;
use crate::session::SessionSettings;
use crate::stages::DocumentProfile;
use crate::state::Node;
use crate::test_support::{memory_engine, ScriptedStages};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_parse_basic_commands() {
    assert_eq!(ReplCommand::parse("   "), Ok(None));
    assert_eq!(
        ReplCommand::parse("new ESG proposal for Acme"),
        Ok(Some(ReplCommand::New("ESG proposal for Acme".to_string())))
    );
    assert_eq!(ReplCommand::parse("continue"), Ok(Some(ReplCommand::Continue)));
    assert_eq!(ReplCommand::parse("switch 3"), Ok(Some(ReplCommand::Switch(3))));
    assert_eq!(ReplCommand::parse("restore 2"), Ok(Some(ReplCommand::Restore(2))));
    assert_eq!(ReplCommand::parse("revisions 4"), Ok(Some(ReplCommand::Revisions(4))));
    assert_eq!(ReplCommand::parse("QUIT"), Ok(Some(ReplCommand::Quit)));
}

#[test]
fn test_parse_rejects_bad_input() {
    assert!(ReplCommand::parse("new").is_err());
    assert!(ReplCommand::parse("switch x").is_err());
    assert!(ReplCommand::parse("set plan").is_err());
    assert!(ReplCommand::parse("export pdf").is_err());
    assert!(ReplCommand::parse("dance").is_err());
}

#[test]
fn test_parse_set_with_multiword_node() {
    assert_eq!(
        ReplCommand::parse("set design course designer: Week 1\\nWeek 2"),
        Ok(Some(ReplCommand::Set {
            field: "design".to_string(),
            node: "course designer".to_string(),
            value: "Week 1\nWeek 2".to_string(),
        }))
    );
}

#[test]
fn test_parse_interrupts_and_export() {
    assert_eq!(
        ReplCommand::parse("interrupts planner, drafter"),
        Ok(Some(ReplCommand::Interrupts(vec![
            "planner".to_string(),
            "drafter".to_string()
        ])))
    );
    assert_eq!(
        ReplCommand::parse("interrupts none"),
        Ok(Some(ReplCommand::Interrupts(Vec::new())))
    );
    assert_eq!(
        ReplCommand::parse("export csv,html params.json"),
        Ok(Some(ReplCommand::Export {
            formats: vec![ExportFormat::Csv, ExportFormat::Html],
            params: Some(PathBuf::from("params.json")),
        }))
    );
    assert_eq!(
        ReplCommand::parse("export"),
        Ok(Some(ReplCommand::Export {
            formats: vec![ExportFormat::Csv],
            params: None,
        }))
    );
}

async fn session(profile: DocumentProfile) -> SessionController {
    SessionController::open(
        memory_engine(Arc::new(ScriptedStages::new()), 10),
        SessionSettings::for_profile(profile, 1),
        None,
    )
    .await
    .expect("session")
}

async fn run_script(session: &SessionController, exports: &TempDir, script: &str) -> String {
    let interrupts: InterruptSet = Node::ALL.into_iter().collect();
    let mut repl = Repl::new(
        session,
        Exporter::new(exports.path(), "ESG Proposal Summary"),
        interrupts,
    );
    let mut out = Vec::new();
    repl.run(script.as_bytes(), &mut out).await.expect("repl");
    String::from_utf8(out).expect("utf8")
}

#[tokio::test]
async fn test_script_steps_through_interrupts() {
    let session = session(DocumentProfile::EsgProposal).await;
    let exports = TempDir::new().expect("temp dir");

    let output = run_script(
        &session,
        &exports,
        "new Test Proposal\ncontinue\nhistory\nget proposal\nquit\nstate\n",
    )
    .await;

    assert!(output.contains("Started thread 0."));
    assert!(output.contains("[thread 0] step 1 rev 0: planner -> drafter"));
    assert!(output.contains("[thread 0] step 2 rev 1: drafter -> finalizer"));
    assert!(output.contains("Paused. Use 'continue' to resume."));
    assert!(output.contains("0:2:drafter:finalizer:1:2\n0:1:planner:drafter:0:1"));
    assert!(output.contains("Last Node: drafter, Thread: 0, Rev: 1, Step: 2\ndraft 1"));
    assert!(!output.contains("Task: Test Proposal"));
}

#[tokio::test]
async fn test_continue_prints_only_new_output() {
    let session = session(DocumentProfile::EsgProposal).await;
    let exports = TempDir::new().expect("temp dir");

    let output = run_script(&session, &exports, "new Test Proposal\ncontinue\nquit\n").await;

    assert_eq!(output.matches("plan for Test Proposal").count(), 1);
    assert_eq!(output.matches("draft 1").count(), 1);
}

#[tokio::test]
async fn test_errors_do_not_end_the_session() {
    let session = session(DocumentProfile::EsgProposal).await;
    let exports = TempDir::new().expect("temp dir");

    let output = run_script(
        &session,
        &exports,
        "continue\nswitch 5\nbogus\nnew task\nget budget\nthreads\n",
    )
    .await;

    assert!(output.contains("No active thread; start one with 'new <task>'."));
    assert!(output.contains("Error: invalid thread id: 5"));
    assert!(output.contains("unknown command 'bogus'"));
    assert!(output.contains("Error: unknown field: budget"));
    assert!(output.contains("* 0"));
}

#[tokio::test]
async fn test_edit_restore_and_export() {
    let session = session(DocumentProfile::Course).await;
    let exports = TempDir::new().expect("temp dir");

    let output = run_script(
        &session,
        &exports,
        "new Intro course\nset design course designer: # Climate Basics\\n## Week One\nstate\nexport csv,html\nrestore 1\n",
    )
    .await;

    assert!(output.contains("Wrote design as checkpoint 2."));
    assert!(output.contains("last planner next reflect rev 0/1 step 1"));
    assert!(output.contains("Thread 0 checkpoint 3: last planner next drafter"));
    assert!(exports.path().join("climate_basics_summary.csv").exists());
    assert!(exports.path().join("climate_basics_summary.html").exists());
}

#[tokio::test]
async fn test_interrupts_command_changes_pauses() {
    let session = session(DocumentProfile::EsgProposal).await;
    let exports = TempDir::new().expect("temp dir");

    let output = run_script(&session, &exports, "interrupts none\nnew task\n").await;

    assert!(output.contains("Interrupting after: \n"));
    assert!(output.contains("[thread 0] step 4 rev 2: drafter -> end"));
    assert!(output.contains("Completed."));
}
