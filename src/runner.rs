//! Sequential step runner
//!
//! Executes the fixed ordered pipeline of reasoning steps, consulting the
//! budget guard before every dispatch and retry. The loop is a Tower
//! service over [`RunRequest`]; the reasoning model behind it is injected
//! as a boxed service, so the runner's own logic is deterministic given the
//! same sequence of (success/failure, cost) outcomes.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tower::{BoxError, Service};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::context::RunContext;
use crate::events::EventRecord;
use crate::guard::BudgetGuard;
use crate::provider::{dispatch, ReasoningSvc, StepRequest, StepResponse};
use crate::result::{CompletedStep, HaltReason, RunResult, RunState};
use crate::retry::RetryPolicy;
use crate::steps::{StepDefinition, StepSequence};
use crate::templates::TemplateStore;

/// Input to one run: the date and its normalized events.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub date: NaiveDate,
    pub events: Vec<EventRecord>,
}

/// How a single step's dispatch (including retries) ended.
enum StepExecution {
    Completed(StepResponse),
    Halted(HaltReason),
    Failed(String),
}

/// The step-loop service. Owns the guard for its run; a runner instance
/// serves exactly one run and must not be shared across concurrent runs.
pub struct StepRunner {
    steps: Arc<StepSequence>,
    templates: Arc<dyn TemplateStore>,
    reasoner: ReasoningSvc,
    guard: Arc<Mutex<BudgetGuard>>,
    retry: RetryPolicy,
}

impl StepRunner {
    pub fn new(
        steps: StepSequence,
        templates: Arc<dyn TemplateStore>,
        reasoner: ReasoningSvc,
        guard: BudgetGuard,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            steps: Arc::new(steps),
            templates,
            reasoner,
            guard: Arc::new(Mutex::new(guard)),
            retry,
        }
    }
}

impl Service<RunRequest> for StepRunner {
    type Response = RunResult;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RunRequest) -> Self::Future {
        let steps = self.steps.clone();
        let templates = self.templates.clone();
        let reasoner = self.reasoner.clone();
        let guard = self.guard.clone();
        let retry = self.retry;
        Box::pin(run_loop(steps, templates, reasoner, guard, retry, req))
    }
}

async fn run_loop(
    steps: Arc<StepSequence>,
    templates: Arc<dyn TemplateStore>,
    reasoner: ReasoningSvc,
    guard: Arc<Mutex<BudgetGuard>>,
    retry: RetryPolicy,
    req: RunRequest,
) -> Result<RunResult, BoxError> {
    let date = req.date;
    let mut ctx = RunContext::new(date, req.events);
    let mut completed: Vec<CompletedStep> = Vec::new();

    for step in steps.iter() {
        // Advisory gate before dispatch; an in-flight call is never killed.
        let refusal = guard.lock().await.refusal(step.estimated_tokens);
        if let Some(reason) = refusal {
            warn!(
                order = step.order,
                template = %step.template_id,
                reason = ?reason,
                "guard refused next step"
            );
            return Ok(finalize(
                date,
                RunState::Halted,
                completed,
                reason,
                None,
                &guard,
            )
            .await);
        }

        let template = match templates.get(&step.template_id) {
            Ok(t) => t,
            Err(e) => {
                return Ok(finalize(
                    date,
                    RunState::Failed,
                    completed,
                    HaltReason::None,
                    Some(e.to_string()),
                    &guard,
                )
                .await)
            }
        };
        let rendered = match template.render(&ctx) {
            Ok(r) => r,
            Err(e) => {
                return Ok(finalize(
                    date,
                    RunState::Failed,
                    completed,
                    HaltReason::None,
                    Some(e.to_string()),
                    &guard,
                )
                .await)
            }
        };

        let span = info_span!("step", order = step.order, template = %step.template_id);
        let execution = execute_step(reasoner.clone(), rendered, retry, &guard, step)
            .instrument(span)
            .await;

        match execution {
            StepExecution::Completed(resp) => {
                guard.lock().await.record_usage(resp.tokens);
                info!(
                    order = step.order,
                    template = %step.template_id,
                    tokens = resp.tokens,
                    "step complete"
                );
                ctx.merge_output(&step.output_key, resp.output.clone());
                completed.push(CompletedStep {
                    order: step.order,
                    template_id: step.template_id.clone(),
                    output_key: step.output_key.clone(),
                    output: resp.output,
                    token_cost: resp.tokens,
                });
            }
            StepExecution::Halted(reason) => {
                return Ok(
                    finalize(date, RunState::Halted, completed, reason, None, &guard).await,
                )
            }
            StepExecution::Failed(msg) => {
                return Ok(finalize(
                    date,
                    RunState::Failed,
                    completed,
                    HaltReason::None,
                    Some(msg),
                    &guard,
                )
                .await)
            }
        }
    }

    Ok(finalize(
        date,
        RunState::Complete,
        completed,
        HaltReason::None,
        None,
        &guard,
    )
    .await)
}

/// Dispatch one step with bounded retries. Failed attempts cost zero
/// tokens; every retry re-checks the guard, so a run near its budget halts
/// instead of failing.
async fn execute_step(
    reasoner: ReasoningSvc,
    rendered: StepRequest,
    retry: RetryPolicy,
    guard: &Arc<Mutex<BudgetGuard>>,
    step: &StepDefinition,
) -> StepExecution {
    let mut attempt = 0usize;
    loop {
        match dispatch(reasoner.clone(), rendered.clone()).await {
            Ok(resp) => {
                if attempt > 0 {
                    debug!(attempts = attempt + 1, "step succeeded after retries");
                }
                return StepExecution::Completed(resp);
            }
            Err(e) => {
                if attempt >= retry.max_retries() {
                    warn!(
                        attempts = attempt + 1,
                        error = %e,
                        "retries exhausted"
                    );
                    return StepExecution::Failed(format!(
                        "step {} failed after {} attempts: {e}",
                        step.template_id,
                        attempt + 1
                    ));
                }
                let delay = retry.delay_for_attempt(attempt);
                attempt += 1;
                warn!(
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "step attempt failed, retrying"
                );
                sleep(delay).await;
                if let Some(reason) = guard.lock().await.refusal(step.estimated_tokens) {
                    return StepExecution::Halted(reason);
                }
            }
        }
    }
}

async fn finalize(
    date: NaiveDate,
    state: RunState,
    completed_steps: Vec<CompletedStep>,
    halt_reason: HaltReason,
    error: Option<String>,
    guard: &Arc<Mutex<BudgetGuard>>,
) -> RunResult {
    let guard_status = guard.lock().await.status();
    RunResult {
        date,
        state,
        completed_steps,
        halted_early: state == RunState::Halted,
        halt_reason,
        error,
        guard: guard_status,
    }
}
