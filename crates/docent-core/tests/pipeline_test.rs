//! End-to-end pipeline tests against a seeded store and stub models

mod common;

use common::{gateway, seeded_store, PromptStub, SlowBackend, WFH_ROLLBACK_QUERY};
use docent_core::evidence::ToolRunOutcome;
use docent_core::llm::ProviderGateway;
use docent_core::{
    AnswerMode, Intent, PipelineOptions, RagPipeline, RunOutcome, RunRequest, ToolRegistry,
};
use std::sync::Arc;
use std::time::Duration;

async fn pipeline_with(gateway: Option<Arc<ProviderGateway>>) -> RagPipeline {
    let store = seeded_store().await;
    RagPipeline::new(gateway, ToolRegistry::standard(store), PipelineOptions::default())
}

fn answered(outcome: RunOutcome) -> docent_core::RunResult {
    match outcome {
        RunOutcome::Answered(result) => result,
        RunOutcome::NoAnswer(n) => panic!("expected an answer, got {:?}", n),
    }
}

#[tokio::test]
async fn test_wfh_and_rollback_with_summary() {
    let stub = Arc::new(
        PromptStub::new("policy, ops")
            .with_split(r#"{"policy_query": "work from home Fridays", "ops_query": "roll back failed deployment"}"#)
            .with_summary("You may work from home on Fridays. Roll back with the release tool."),
    );
    let pipeline = pipeline_with(Some(gateway(stub.clone()))).await;

    let result = answered(
        pipeline
            .run(RunRequest::new(WFH_ROLLBACK_QUERY, "ana"))
            .await,
    );

    assert_eq!(result.metadata.tool_calls, vec!["policy_tool", "ops_tool"]);
    assert_eq!(result.metadata.intent, Some(Intent::Ambiguous));
    assert_eq!(result.answer_mode(), Some(AnswerMode::LlmSummary));
    assert_eq!(result.provider_used, "stub");
    assert!(result.response.starts_with("You may work from home"));
    assert!(result.response.contains("Sources:"));
    assert_eq!(result.metadata.requested_by.as_deref(), Some("ana"));

    // Split queries reach the tools
    let runs = &result.metadata.tool_runs;
    assert_eq!(runs[0].query, "work from home Fridays");
    assert_eq!(runs[1].query, "roll back failed deployment");

    // Evidence from both categories
    assert!(result.evidence.iter().any(|e| e.category() == Some("policy")));
    assert!(result.evidence.iter().any(|e| e.category() == Some("ops")));

    // Not requested, so not reported
    assert!(result.metadata.rewritten_query.is_none());
    assert_eq!(stub.calls(), vec!["intent", "split", "summary"]);
}

#[tokio::test]
async fn test_wfh_and_rollback_without_models() {
    let pipeline = pipeline_with(None).await;

    let result = answered(
        pipeline
            .run(RunRequest::new(WFH_ROLLBACK_QUERY, "ana").with_rewrite(true))
            .await,
    );

    assert_eq!(result.metadata.tool_calls, vec!["policy_tool", "ops_tool"]);
    assert_eq!(result.answer_mode(), Some(AnswerMode::Snippet));
    assert_eq!(result.provider_used, "graph");
    assert!(!result.response.is_empty());
    assert_eq!(result.metadata.intent_source.as_deref(), Some("default"));
    // Rewrite requested but unavailable: the original text is reported
    assert_eq!(
        result.metadata.rewritten_query.as_deref(),
        Some(WFH_ROLLBACK_QUERY)
    );
    assert!(result.metadata.rewrite_provider.is_none());
}

#[tokio::test]
async fn test_summary_failure_falls_back_to_both_categories() {
    // Classifier works, every generation attempt fails
    let stub = Arc::new(PromptStub::new("policy,ops"));
    let pipeline = pipeline_with(Some(gateway(stub))).await;

    let result = answered(pipeline.run(RunRequest::new(WFH_ROLLBACK_QUERY, "ana")).await);

    assert_eq!(result.answer_mode(), Some(AnswerMode::SnippetFallback));
    assert_eq!(result.provider_used, "graph");
    assert!(result.metadata.summary_provider.is_none());
    assert!(result.response.contains("policy and operations"));

    let lines: Vec<&str> = result
        .response
        .lines()
        .filter(|l| l.starts_with("- ") && l.contains(".md:"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert!(lines.iter().any(|l| l.contains("remote-work.md") || l.contains("leave.md")));
    assert!(lines.iter().any(|l| l.contains("rollback.md") || l.contains("oncall.md")));
}

#[tokio::test]
async fn test_single_intent_uses_one_tool() {
    let stub = Arc::new(PromptStub::new("ops").with_summary("Use the release tool."));
    let pipeline = pipeline_with(Some(gateway(stub.clone()))).await;

    let result = answered(
        pipeline
            .run(RunRequest::new("How do I roll back a deployment?", "bo"))
            .await,
    );

    assert_eq!(result.metadata.tool_calls, vec!["ops_tool"]);
    assert!(result.metadata.sub_queries.is_none());
    assert!(result.evidence.iter().all(|e| e.category() == Some("ops")));
    // Ascending distance within the single tool
    let distances: Vec<f64> = result.evidence.iter().map(|e| e.distance()).collect();
    assert!(distances.windows(2).all(|w| w[0] <= w[1]));
    // No split call for a one-tool plan
    assert!(!stub.calls().contains(&"split".to_string()));
}

#[tokio::test]
async fn test_provider_label_from_tools_when_no_summary() {
    let stub = Arc::new(PromptStub::new("policy"));
    let pipeline = pipeline_with(Some(gateway(stub))).await;
    let result = answered(
        pipeline
            .run(RunRequest::new("How many leave days do I get?", "bo"))
            .await,
    );
    assert_eq!(result.provider_used, "policy-lookup");
}

#[tokio::test]
async fn test_rewrite_feeds_classification_and_tools() {
    let stub = Arc::new(
        PromptStub::new("policy")
            .with_rewrite("remote work policy Fridays")
            .with_summary("Yes."),
    );
    let pipeline = pipeline_with(Some(gateway(stub.clone()))).await;

    let result = answered(
        pipeline
            .run(
                RunRequest::new("hey so am i allowed to like work from home on fridays", "cy")
                    .with_rewrite(true),
            )
            .await,
    );

    assert_eq!(
        result.metadata.rewritten_query.as_deref(),
        Some("remote work policy Fridays")
    );
    assert_eq!(result.metadata.rewrite_provider.as_deref(), Some("stub"));
    assert_eq!(result.metadata.tool_runs[0].query, "remote work policy Fridays");
    assert_eq!(stub.calls()[0], "rewrite");
}

#[tokio::test]
async fn test_short_query_is_not_rewritten() {
    let stub = Arc::new(PromptStub::new("policy").with_rewrite("never used"));
    let pipeline = pipeline_with(Some(gateway(stub.clone()))).await;
    let outcome = pipeline
        .run(RunRequest::new("leave days", "cy").with_rewrite(true))
        .await;
    assert_eq!(outcome.metadata().rewritten_query.as_deref(), Some("leave days"));
    assert!(!stub.calls().contains(&"rewrite".to_string()));
}

#[tokio::test]
async fn test_runs_are_idempotent() {
    let stub = Arc::new(PromptStub::new("policy, ops").with_summary("Summary."));
    let pipeline = pipeline_with(Some(gateway(stub))).await;

    let first = pipeline.run(RunRequest::new(WFH_ROLLBACK_QUERY, "ana")).await;
    let second = pipeline.run(RunRequest::new(WFH_ROLLBACK_QUERY, "ana")).await;
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}

#[tokio::test]
async fn test_empty_store_returns_no_answer_with_suggestions() {
    let store: Arc<dyn docent_core::VectorStore> = Arc::new(
        docent_core::SqliteVectorStore::open_in_memory(
            "empty",
            Arc::new(docent_core::HashEmbedder::new(64)),
        )
        .unwrap(),
    );
    let stub = Arc::new(
        PromptStub::new("policy")
            .with_suggestions("1. What is the remote work policy?\n2. Who approves leave?\n3. Extra"),
    );
    let pipeline = RagPipeline::new(
        Some(gateway(stub)),
        ToolRegistry::standard(store),
        PipelineOptions::default(),
    );

    let outcome = pipeline.run(RunRequest::new("parking rules", "dee")).await;
    let RunOutcome::NoAnswer(no_answer) = outcome else {
        panic!("expected no answer");
    };
    assert_eq!(no_answer.error, docent_core::pipeline::NO_ANSWER);
    assert_eq!(
        no_answer.metadata.suggestions,
        vec!["What is the remote work policy?", "Who approves leave?"]
    );
    assert_eq!(
        no_answer.metadata.tool_runs[0].outcome,
        ToolRunOutcome::ResultCount(0)
    );

    let json = serde_json::to_value(&RunOutcome::NoAnswer(no_answer)).unwrap();
    assert!(json.get("response").is_none());
    assert_eq!(json["error"], "no-answer");
}

#[tokio::test]
async fn test_missing_tool_is_recorded_and_skipped() {
    let store = seeded_store().await;
    let registry = ToolRegistry::new().with(Arc::new(docent_core::CategoryLookupTool::new(
        docent_core::POLICY_TOOL,
        "policy",
        store,
    )));
    let pipeline = RagPipeline::new(None, registry, PipelineOptions::default());

    let result = answered(pipeline.run(RunRequest::new(WFH_ROLLBACK_QUERY, "ana")).await);
    assert_eq!(result.metadata.tool_calls, vec!["policy_tool"]);
    let failed = &result.metadata.tool_runs[1];
    assert_eq!(failed.tool, "ops_tool");
    assert!(matches!(failed.outcome, ToolRunOutcome::Error(_)));
    assert_eq!(result.provider_used, "policy-lookup");
}

#[tokio::test(start_paused = true)]
async fn test_deadline_exceeded() {
    let store = seeded_store().await;
    let slow = Arc::new(ProviderGateway::new(
        Arc::new(SlowBackend(Duration::from_secs(600))),
        common::two_model_chain(),
    ));
    let mut options = PipelineOptions::default();
    options.deadline = Some(Duration::from_secs(5));
    let pipeline = RagPipeline::new(Some(slow), ToolRegistry::standard(store), options);

    let outcome = pipeline.run(RunRequest::new("leave days", "eve")).await;
    let RunOutcome::NoAnswer(no_answer) = outcome else {
        panic!("expected deadline no-answer");
    };
    assert_eq!(no_answer.error, docent_core::pipeline::DEADLINE_EXCEEDED);
    assert_eq!(no_answer.metadata.requested_by.as_deref(), Some("eve"));
}
