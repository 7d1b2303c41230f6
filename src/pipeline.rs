//! Daily pipeline orchestration
//!
//! One run per date: load and normalize the day's events, build a fresh
//! guard, execute the step sequence, then archive whatever the runner
//! produced. Partial output from a halted run is archived the same way a
//! complete one is; validation only runs over complete output.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower::{Service, ServiceExt};
use tracing::{info, info_span, warn, Instrument};

use crate::archive::Archive;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::events::{normalize_events, YamlEventSource};
use crate::guard::{BudgetGuard, GuardStatus};
use crate::provider::ReasoningSvc;
use crate::result::{RunResult, RunState};
use crate::retry::RetryPolicy;
use crate::runner::{RunRequest, StepRunner};
use crate::templates::{TemplateStore, YamlTemplateStore};
use crate::validation::{validate_output, ValidationReport};

/// Overall outcome of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// All steps completed.
    Success,
    /// Halted within budget limits; partial output archived.
    Partial,
    /// A step failed terminally.
    Failed,
}

/// What a run produced, for the caller and the logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub date: NaiveDate,
    pub status: RunStatus,
    pub steps_completed: usize,
    pub guard: GuardStatus,
    pub validation: Option<ValidationReport>,
    pub error: Option<String>,
}

/// The daily analysis pipeline. Holds configuration and a reasoning
/// service handle; each [`run`](DailyPipeline::run) builds its own guard
/// and runner, so budgets never leak across dates.
pub struct DailyPipeline {
    config: PipelineConfig,
    reasoner: ReasoningSvc,
}

impl DailyPipeline {
    pub fn new(config: PipelineConfig, reasoner: ReasoningSvc) -> Self {
        Self { config, reasoner }
    }

    pub async fn run(&self, date: NaiveDate) -> Result<PipelineSummary> {
        let span = info_span!("pipeline", %date);
        self.run_inner(date).instrument(span).await
    }

    async fn run_inner(&self, date: NaiveDate) -> Result<PipelineSummary> {
        let source = YamlEventSource::new(self.config.paths.events_dir());
        let raw = source.load_raw(date)?;
        let events = normalize_events(&raw.events);
        source.save_normalized(date, &events)?;
        info!(events = events.len(), "events ready");

        let guard = BudgetGuard::new(&self.config.limits)?;
        let steps = self.config.step_sequence()?;
        let expected_keys = steps.output_keys();
        let templates: Arc<dyn TemplateStore> =
            Arc::new(YamlTemplateStore::new(self.config.paths.prompts_dir.clone())?);

        let mut runner = StepRunner::new(
            steps,
            templates,
            self.reasoner.clone(),
            guard,
            RetryPolicy::new(self.config.retry),
        );
        let request = RunRequest {
            date,
            events,
        };
        let result = runner
            .ready()
            .await
            .map_err(|e| PipelineError::Other(e.to_string()))?
            .call(request)
            .await
            .map_err(|e| PipelineError::Other(e.to_string()))?;

        self.archive_run(date, &result, &expected_keys)
    }

    /// Archive the run output and, for complete runs, the validation
    /// report. Partial output is always preserved.
    fn archive_run(
        &self,
        date: NaiveDate,
        result: &RunResult,
        expected_keys: &[String],
    ) -> Result<PipelineSummary> {
        let archive = Archive::new(self.config.paths.archive_dir());
        let bundle = result.output_bundle();
        archive.save_analysis(date, &bundle)?;

        let (status, validation) = match result.state {
            RunState::Complete => {
                let report = validate_output(&bundle, expected_keys, &self.config.constraints)?;
                archive.save_report(date, &report)?;
                (RunStatus::Success, Some(report))
            }
            RunState::Halted => {
                warn!(
                    reason = ?result.halt_reason,
                    steps = result.completed_steps.len(),
                    "run halted within budget limits"
                );
                (RunStatus::Partial, None)
            }
            _ => {
                warn!(error = ?result.error, "run failed");
                (RunStatus::Failed, None)
            }
        };

        info!(
            ?status,
            steps = result.completed_steps.len(),
            tokens = result.guard.tokens_used,
            "run archived"
        );
        Ok(PipelineSummary {
            date,
            status,
            steps_completed: result.completed_steps.len(),
            guard: result.guard,
            validation,
            error: result.error.clone(),
        })
    }
}
