//! End-to-end tests for the research pipeline

mod common;

use common::*;
use deepcite_core::{ContinuationPolicy, DeepciteConfig, ResearchDepth, SearchDepth};
use deepcite_research::{PipelineStage, ResearchError, ResearchRequest, Severity, Stage};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const RSA_QUERY: &str = "history of RSA encryption";

#[tokio::test]
async fn rsa_run_accumulates_unique_sources_and_compiles_report() {
    let config = DeepciteConfig::default();
    let completion = Arc::new(ScriptedCompletion::new());
    let search = Arc::new(ScriptedSearch::new(vec![
        SearchStep::Results(docs(1..=3)),
        SearchStep::Results(vec![doc(4), doc(2), doc(5)]),
    ]));

    let run = engine(&config, &completion, &search)
        .run(ResearchRequest::new(RSA_QUERY).with_iterations(2))
        .await
        .unwrap();

    assert!(run.is_done());
    assert!(run.finished_at.is_some());
    let state = &run.state;
    assert_eq!(state.current_iteration, 2);
    assert_eq!(state.research_data.len(), 5);
    let titles: Vec<_> = state.research_data.iter().map(|d| d.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["RSA source 1", "RSA source 2", "RSA source 3", "RSA source 4", "RSA source 5"]
    );

    // One correction pass between the two iterations
    assert_eq!(state.original_query, RSA_QUERY);
    assert_eq!(state.query, format!("{} \"RSA security proofs\"", RSA_QUERY));
    assert_eq!(completion.prompts_of(PromptKind::Correction).len(), 1);

    let answer = state.answer.as_deref().unwrap();
    assert!(answer.contains("RSA was invented in 1977. [Source 1]"));
    assert!(!answer.contains("claim"));

    assert!(state.fact_checks.is_some());
    assert_eq!(state.final_checks.as_deref(), Some(&["No remaining issues.".to_string()][..]));

    let report = state.professional_report.as_deref().unwrap();
    assert!(report.starts_with(REPORT_RESPONSE));
    assert!(report.contains("\n\n## Appendices\n"));
    assert_eq!(report.matches("### Source").count(), 5);

    let requests = search.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.depth == SearchDepth::Advanced));
    assert!(requests.iter().all(|r| r.max_results == 10));
    assert_eq!(requests[0].query, "RSA encryption milestones");
}

#[tokio::test]
async fn search_parameters_follow_depth() {
    let config = DeepciteConfig::default();
    for (depth, expected_depth, expected_max) in [
        (ResearchDepth::Overview, SearchDepth::Basic, 10),
        (ResearchDepth::Detailed, SearchDepth::Advanced, 10),
        (ResearchDepth::DeepDive, SearchDepth::Advanced, 15),
    ] {
        let completion = Arc::new(ScriptedCompletion::new());
        let search = Arc::new(ScriptedSearch::new(vec![]));

        engine(&config, &completion, &search)
            .run(ResearchRequest::new(RSA_QUERY).with_iterations(1).with_depth(depth))
            .await
            .unwrap();

        let requests = search.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].depth, expected_depth);
        assert_eq!(requests[0].max_results, expected_max);
    }
}

#[tokio::test]
async fn iteration_budget_is_never_exceeded() {
    let config = DeepciteConfig::default();
    let completion = Arc::new(ScriptedCompletion::new());
    let search = Arc::new(ScriptedSearch::new(vec![]));

    let run = engine(&config, &completion, &search)
        .run(ResearchRequest::new(RSA_QUERY).with_iterations(3))
        .await
        .unwrap();

    assert_eq!(run.state.current_iteration, 3);
    assert_eq!(search.requests().len(), 3);
    assert_eq!(completion.prompts_of(PromptKind::FactCheck).len(), 3);
    // No correction after the last fact check
    assert_eq!(completion.prompts_of(PromptKind::Correction).len(), 2);
    assert!(run
        .audit
        .for_stage(Stage::Orchestrator)
        .any(|e| e.message.contains("Maximum iterations reached")));
}

#[tokio::test]
async fn search_failure_does_not_abort_the_run() {
    let config = DeepciteConfig::default();
    let completion = Arc::new(ScriptedCompletion::new());
    let search = Arc::new(ScriptedSearch::new(vec![SearchStep::Fail("quota exceeded")]));

    let run = engine(&config, &completion, &search)
        .run(ResearchRequest::new(RSA_QUERY).with_iterations(1))
        .await
        .unwrap();

    assert!(run.is_done());
    assert!(run.state.research_data.is_empty());
    assert_eq!(run.state.current_iteration, 1);
    let failure = run
        .audit
        .for_stage(Stage::Researcher)
        .find(|e| e.severity == Severity::Error)
        .unwrap();
    assert!(failure.message.starts_with("Research failed:"));
    assert!(failure.message.contains("quota exceeded"));

    // An empty source list still yields a report with an empty appendix
    let report = run.state.professional_report.unwrap();
    assert!(report.ends_with("\n\n## Appendices\n"));
}

#[tokio::test]
async fn refiner_failure_falls_back_to_current_query() {
    let config = DeepciteConfig::default();
    let completion = Arc::new(ScriptedCompletion::new().fail_on(PromptKind::Refine));
    let search = Arc::new(ScriptedSearch::new(vec![SearchStep::Results(docs(1..=2))]));

    let run = engine(&config, &completion, &search)
        .run(ResearchRequest::new(RSA_QUERY).with_iterations(1))
        .await
        .unwrap();

    assert!(run.is_done());
    assert_eq!(search.requests()[0].query, RSA_QUERY);
    assert!(run
        .audit
        .for_stage(Stage::QueryRefiner)
        .any(|e| e.severity == Severity::Warning && e.message.contains("Query refinement failed")));
}

#[tokio::test]
async fn completion_failure_aborts_with_stage_and_query() {
    let config = DeepciteConfig::default();
    let completion = Arc::new(ScriptedCompletion::new().fail_on(PromptKind::FactCheck));
    let search = Arc::new(ScriptedSearch::new(vec![SearchStep::Results(docs(1..=3))]));

    let failure = engine(&config, &completion, &search)
        .run(ResearchRequest::new(RSA_QUERY).with_iterations(2))
        .await
        .unwrap_err();

    match &failure.error {
        ResearchError::Stage { stage, query, .. } => {
            assert_eq!(*stage, Stage::FactChecker);
            assert_eq!(query, RSA_QUERY);
        }
        other => panic!("Expected stage error, got {:?}", other),
    }
    assert!(!failure.is_cancelled());

    // State reflects the last completed stage
    let run = &failure.run;
    assert_eq!(run.stage, PipelineStage::Drafting);
    assert!(run.state.answer.is_some());
    assert!(run.state.fact_checks.is_none());
    assert_eq!(run.state.research_data.len(), 3);
    assert!(run.finished_at.is_some());
    assert_eq!(run.audit.last().map(|e| e.severity), Some(Severity::Error));
    assert!(completion.prompts_of(PromptKind::Validation).is_empty());
}

#[tokio::test]
async fn cancellation_keeps_last_committed_state() {
    let config = DeepciteConfig::default();
    let token = CancellationToken::new();
    let completion =
        Arc::new(ScriptedCompletion::new().cancel_on(PromptKind::Validation, token.clone()));
    let search = Arc::new(ScriptedSearch::new(vec![SearchStep::Results(docs(1..=3))]));

    let failure = engine(&config, &completion, &search)
        .run_with_cancellation(ResearchRequest::new(RSA_QUERY).with_iterations(1), token)
        .await
        .unwrap_err();

    assert!(failure.is_cancelled());
    assert!(matches!(
        failure.error,
        ResearchError::Cancelled {
            stage: Stage::Validator
        }
    ));
    assert_eq!(failure.run.stage, PipelineStage::Checking);
    assert!(failure.run.state.fact_checks.is_some());
    assert!(failure.run.state.final_checks.is_none());
    assert!(failure.run.state.professional_report.is_none());
}

#[tokio::test]
async fn cancelled_token_stops_before_any_call() {
    let config = DeepciteConfig::default();
    let completion = Arc::new(ScriptedCompletion::new());
    let search = Arc::new(ScriptedSearch::new(vec![]));
    let token = CancellationToken::new();
    token.cancel();

    let failure = engine(&config, &completion, &search)
        .run_with_cancellation(ResearchRequest::new(RSA_QUERY), token)
        .await
        .unwrap_err();

    assert!(failure.is_cancelled());
    assert_eq!(failure.run.stage, PipelineStage::Init);
    assert_eq!(failure.run.state.current_iteration, 0);
    assert!(completion.prompts().is_empty());
    assert!(search.requests().is_empty());
}

#[tokio::test]
async fn while_issues_policy_stops_when_draft_is_clean() {
    let mut config = DeepciteConfig::default();
    config.research.continuation = ContinuationPolicy::WhileIssues { min_issues: 1 };
    let completion = Arc::new(
        ScriptedCompletion::new().respond(PromptKind::FactCheck, "All claims are supported."),
    );
    let search = Arc::new(ScriptedSearch::new(vec![SearchStep::Results(docs(1..=2))]));

    let run = engine(&config, &completion, &search)
        .run(ResearchRequest::new(RSA_QUERY).with_iterations(4))
        .await
        .unwrap();

    assert!(run.is_done());
    assert_eq!(run.state.current_iteration, 1);
    assert_eq!(search.requests().len(), 1);
    assert!(completion.prompts_of(PromptKind::Correction).is_empty());
}

#[tokio::test]
async fn corrector_without_issue_lines_skips_the_model() {
    let config = DeepciteConfig::default();
    let completion = Arc::new(
        ScriptedCompletion::new().respond(PromptKind::FactCheck, "No problems detected."),
    );
    let search = Arc::new(ScriptedSearch::new(vec![]));

    let run = engine(&config, &completion, &search)
        .run(ResearchRequest::new(RSA_QUERY).with_iterations(2))
        .await
        .unwrap();

    assert_eq!(run.state.query, RSA_QUERY);
    assert!(completion.prompts_of(PromptKind::Correction).is_empty());
    assert!(run
        .audit
        .for_stage(Stage::Corrector)
        .any(|e| e.message.contains("query unchanged")));
}

#[tokio::test]
async fn corrector_without_resolution_queries_keeps_query() {
    let config = DeepciteConfig::default();
    let completion = Arc::new(
        ScriptedCompletion::new().respond(PromptKind::Correction, "I cannot help with that."),
    );
    let search = Arc::new(ScriptedSearch::new(vec![]));

    let run = engine(&config, &completion, &search)
        .run(ResearchRequest::new(RSA_QUERY).with_iterations(2))
        .await
        .unwrap();

    assert_eq!(run.state.query, RSA_QUERY);
    assert_eq!(completion.prompts_of(PromptKind::Correction).len(), 1);
}

#[tokio::test]
async fn out_of_range_iterations_are_rejected() {
    let config = DeepciteConfig::default();
    let completion = Arc::new(ScriptedCompletion::new());
    let search = Arc::new(ScriptedSearch::new(vec![]));
    let engine = engine(&config, &completion, &search);

    for iterations in [0, 11] {
        let failure = engine
            .run(ResearchRequest::new(RSA_QUERY).with_iterations(iterations))
            .await
            .unwrap_err();
        assert!(matches!(failure.error, ResearchError::InvalidRequest { .. }));
        assert_eq!(failure.run.stage, PipelineStage::Init);
    }

    let failure = engine.run(ResearchRequest::new("   ")).await.unwrap_err();
    assert!(matches!(failure.error, ResearchError::InvalidRequest { .. }));
    assert!(completion.prompts().is_empty());
}

#[tokio::test]
async fn final_checks_reach_the_report_only_when_enabled() {
    let findings = "- [❌] [RSA is unbreakable]\n  Required Action: Remove";

    for enabled in [false, true] {
        let mut config = DeepciteConfig::default();
        config.research.include_final_checks_in_report = enabled;
        let completion =
            Arc::new(ScriptedCompletion::new().respond(PromptKind::Validation, findings));
        let search = Arc::new(ScriptedSearch::new(vec![SearchStep::Results(docs(1..=2))]));

        engine(&config, &completion, &search)
            .run(ResearchRequest::new(RSA_QUERY).with_iterations(1))
            .await
            .unwrap();

        let report_prompt = &completion.prompts_of(PromptKind::Report)[0];
        assert_eq!(report_prompt.contains("Validation Findings"), enabled);
    }
}
