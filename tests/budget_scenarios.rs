//! End-to-end budget scenarios over the full six-step sequence.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;
use tower::{Service, ServiceExt};

use daybrief::provider::ScriptedReasoner;
use daybrief::retry::{BackoffKind, RetryConfig, RetryPolicy};
use daybrief::runner::{RunRequest, StepRunner};
use daybrief::steps::StepSequence;
use daybrief::templates::{InMemoryTemplateStore, TemplateStore};
use daybrief::{BudgetGuard, HaltReason, RunResult, RunState};

fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 8, 21).unwrap()
}

fn reference_templates(seq: &StepSequence) -> Arc<dyn TemplateStore> {
    let mut store = InMemoryTemplateStore::new("You are a market analyst.");
    for step in seq.iter() {
        store = store.with_template(&step.template_id, "Analysis for {date}:\n{context}");
    }
    Arc::new(store)
}

fn no_jitter_retry(max_retries: usize) -> RetryPolicy {
    RetryPolicy::new(RetryConfig {
        max_retries,
        backoff: BackoffKind::Fixed,
        initial_delay_ms: 1,
        max_delay_ms: 1,
        backoff_multiplier: 1.0,
        jitter: false,
    })
}

fn wide_guard(token_budget: u64) -> BudgetGuard {
    BudgetGuard::with_limits(
        Duration::from_secs(3600),
        Duration::from_secs(300),
        token_budget,
    )
    .unwrap()
}

async fn execute(mut runner: StepRunner) -> RunResult {
    let req = RunRequest {
        date: test_date(),
        events: vec![],
    };
    runner.ready().await.unwrap().call(req).await.unwrap()
}

#[tokio::test]
async fn six_steps_within_budget_complete_with_exact_usage() {
    let seq = StepSequence::reference(150);
    let templates = reference_templates(&seq);
    let reasoner = ScriptedReasoner::repeating(json!({"note": "steady"}), 150, 6);

    let runner = StepRunner::new(
        seq,
        templates,
        reasoner.clone().into_svc(),
        wide_guard(1000),
        no_jitter_retry(0),
    );
    let result = execute(runner).await;

    assert_eq!(result.state, RunState::Complete);
    assert!(!result.halted_early);
    assert_eq!(result.completed_steps.len(), 6);
    assert_eq!(result.guard.tokens_used, 900);
    assert_eq!(result.guard.remaining_tokens, 100);
    assert_eq!(reasoner.calls(), 6);
}

#[tokio::test]
async fn budget_exhaustion_halts_before_sixth_step() {
    let seq = StepSequence::reference(200);
    let templates = reference_templates(&seq);
    let reasoner = ScriptedReasoner::repeating(json!({"note": "heavy"}), 200, 6);

    let runner = StepRunner::new(
        seq,
        templates,
        reasoner.clone().into_svc(),
        wide_guard(1000),
        no_jitter_retry(0),
    );
    let result = execute(runner).await;

    assert_eq!(result.state, RunState::Halted);
    assert!(result.halted_early);
    assert_eq!(result.halt_reason, HaltReason::TokenExceeded);
    assert_eq!(result.completed_steps.len(), 5);
    assert_eq!(result.guard.tokens_used, 1000);
    // The sixth step was refused, not attempted.
    assert_eq!(reasoner.calls(), 5);
}

#[tokio::test]
async fn halted_run_preserves_partial_bundle() {
    let seq = StepSequence::reference(200);
    let templates = reference_templates(&seq);
    let reasoner = ScriptedReasoner::repeating(json!({"regime": "neutral"}), 200, 6);

    let runner = StepRunner::new(
        seq,
        templates,
        reasoner.into_svc(),
        wide_guard(1000),
        no_jitter_retry(0),
    );
    let result = execute(runner).await;

    let bundle = result.output_bundle();
    assert_eq!(bundle["date"], "2026-08-21");
    let steps = bundle["steps"].as_object().unwrap();
    assert_eq!(steps.len(), 5);
    assert!(steps.contains_key("filter_events"));
    assert!(steps.contains_key("scenarios"));
    assert!(!steps.contains_key("brief"));
}

#[tokio::test]
async fn actual_cost_governs_refusal_not_estimates() {
    // Estimates say 100 per step; the model actually bills 400. The guard
    // gates on recorded usage, so the overshoot surfaces two steps in.
    let seq = StepSequence::reference(100);
    let templates = reference_templates(&seq);
    let reasoner = ScriptedReasoner::repeating(json!({}), 400, 6);

    let runner = StepRunner::new(
        seq,
        templates,
        reasoner.clone().into_svc(),
        wide_guard(1000),
        no_jitter_retry(0),
    );
    let result = execute(runner).await;

    // 400 + 400 = 800, then 800 + 100 estimated <= 1000 allows a third
    // step; 1200 + 100 refuses the fourth.
    assert_eq!(result.state, RunState::Halted);
    assert_eq!(result.completed_steps.len(), 3);
    assert_eq!(result.guard.tokens_used, 1200);
    assert!(result.guard.remaining_tokens < 0);
    assert!(result.guard.exceeded);
}

#[tokio::test]
async fn retried_step_stays_within_budget_accounting() {
    let seq = StepSequence::reference(150);
    let templates = reference_templates(&seq);
    let mut script: Vec<Result<daybrief::provider::StepResponse, String>> = Vec::new();
    script.push(Err("rate limited".to_string()));
    for _ in 0..6 {
        script.push(Ok(daybrief::provider::StepResponse {
            output: json!({"ok": true}),
            tokens: 150,
        }));
    }
    let reasoner = ScriptedReasoner::new(script);

    let runner = StepRunner::new(
        seq,
        templates,
        reasoner.clone().into_svc(),
        wide_guard(1000),
        no_jitter_retry(2),
    );
    let result = execute(runner).await;

    assert_eq!(result.state, RunState::Complete);
    assert_eq!(result.completed_steps.len(), 6);
    // The failed attempt cost nothing.
    assert_eq!(result.guard.tokens_used, 900);
    assert_eq!(reasoner.calls(), 7);
}
