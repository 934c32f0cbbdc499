use super::*;
use crate::agents::Role;
use crate::documents::StaticRetriever;
use crate::test_support::ScriptedGenerator;

fn passages() -> Vec<RetrievedDocument> {
    vec![
        RetrievedDocument::new("Scope 1 and 2 emissions fell 12%.", "ghg_report.md"),
        RetrievedDocument::new("Board adopted a net-zero target.", "governance.txt"),
    ]
}

fn runner(generator: Arc<ScriptedGenerator>, documents: Vec<RetrievedDocument>) -> StageRunner {
    StageRunner::new(
        generator,
        Arc::new(StaticRetriever::new(documents)),
        DocumentProfile::EsgProposal.prompts(),
        3,
    )
}

#[tokio::test]
async fn test_plan_includes_numbered_sources() {
    let generator = Arc::new(ScriptedGenerator::with_responses(&["1. Baseline\n2. Targets"]));
    let stages = runner(generator.clone(), passages());
    let state = WorkflowState::new("ESG proposal for Acme", 2);

    let output = stages.run(Node::Planner, &state).await.expect("plan");

    assert_eq!(
        output,
        StageOutput::Plan {
            plan: "1. Baseline\n2. Targets".to_string(),
            retrieved_documents: passages(),
        }
    );
    let requests = generator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].system_prompt, DocumentProfile::EsgProposal.prompts().plan);
    let prompt = &requests[0].messages[0].content;
    assert!(prompt.starts_with("ESG proposal for Acme\n\n"));
    assert!(prompt.contains(
        "Document 1 - Source: ghg_report.md\nScope 1 and 2 emissions fell 12%.\n\n"
    ));
    assert!(prompt.contains("Document 2 - Source: governance.txt\n"));
}

#[tokio::test]
async fn test_plan_without_materials_sends_bare_task() {
    let generator = Arc::new(ScriptedGenerator::new());
    let stages = runner(generator.clone(), Vec::new());

    let output = stages
        .run(Node::Planner, &WorkflowState::new("Course on ESG", 1))
        .await
        .expect("plan");

    assert!(matches!(output, StageOutput::Plan { ref retrieved_documents, .. } if retrieved_documents.is_empty()));
    assert_eq!(generator.requests()[0].messages[0].content, "Course on ESG");
}

#[tokio::test]
async fn test_first_draft_has_no_critique_message() {
    let generator = Arc::new(ScriptedGenerator::with_responses(&["# Draft"]));
    let stages = runner(generator.clone(), Vec::new());
    let mut state = WorkflowState::new("task", 2);
    state.plan = "the plan".to_string();

    let output = stages.run(Node::Drafter, &state).await.expect("draft");

    assert_eq!(
        output,
        StageOutput::Draft {
            draft: "# Draft".to_string()
        }
    );
    let messages = &generator.requests()[0].messages;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "task\n\nHere is my plan:\n\nthe plan");
}

#[tokio::test]
async fn test_redraft_carries_critique() {
    let generator = Arc::new(ScriptedGenerator::new());
    let stages = runner(generator.clone(), Vec::new());
    let mut state = WorkflowState::new("task", 2);
    state.critique = "Budget is missing".to_string();

    stages.run(Node::Drafter, &state).await.expect("draft");

    let messages = &generator.requests()[0].messages;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(
        messages[1].content,
        "Here is feedback on my previous draft:\n\nBudget is missing"
    );
}

#[tokio::test]
async fn test_finalize_critiques_current_draft() {
    let generator = Arc::new(ScriptedGenerator::with_responses(&["Needs KPIs"]));
    let stages = runner(generator.clone(), Vec::new());
    let mut state = WorkflowState::new("task", 2);
    state.draft = "# Proposal body".to_string();

    let output = stages.run(Node::Finalizer, &state).await.expect("critique");

    assert_eq!(output.summary(), "Needs KPIs");
    let request = &generator.requests()[0];
    assert_eq!(request.system_prompt, DocumentProfile::EsgProposal.prompts().finalize);
    assert_eq!(request.messages[0].content, "# Proposal body");
}

#[tokio::test]
async fn test_generation_failure_propagates() {
    let generator = Arc::new(ScriptedGenerator::new());
    generator.push_failure("rate limited");
    let stages = runner(generator, Vec::new());

    let err = stages
        .run(Node::Drafter, &WorkflowState::new("task", 1))
        .await
        .expect_err("should fail");

    assert!(err.to_string().contains("rate limited"));
}

#[test]
fn test_profiles_differ() {
    assert_ne!(
        DocumentProfile::EsgProposal.prompts(),
        DocumentProfile::Course.prompts()
    );
    assert_eq!(DocumentProfile::parse("course"), Some(DocumentProfile::Course));
    assert_eq!(
        DocumentProfile::parse("esg-proposal"),
        Some(DocumentProfile::EsgProposal)
    );
    assert_eq!(DocumentProfile::parse("novel"), None);
}
