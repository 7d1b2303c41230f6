//! Run result types for the step runner

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::guard::GuardStatus;

/// Runner state machine. `Halted`, `Complete`, and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Halted,
    Complete,
    Failed,
}

/// Which ceiling refused the next dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    TimeExceeded,
    TokenExceeded,
    None,
}

/// One successfully executed step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedStep {
    pub order: u32,
    pub template_id: String,
    pub output_key: String,
    pub output: Value,
    pub token_cost: u64,
}

/// Final, partial-tolerant record of a run. Built incrementally by the
/// runner and finalized once the guard refuses, a step fails fatally, or
/// all steps complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub date: NaiveDate,
    pub state: RunState,
    pub completed_steps: Vec<CompletedStep>,
    pub halted_early: bool,
    pub halt_reason: HaltReason,
    /// Terminal error message when `state == Failed`.
    pub error: Option<String>,
    /// Guard snapshot taken when the run finalized.
    pub guard: GuardStatus,
}

impl RunResult {
    /// The output bundle handed to validation and the archive:
    /// `{date, steps: {output_key: output, ...}}`.
    pub fn output_bundle(&self) -> Value {
        let mut steps = serde_json::Map::new();
        for step in &self.completed_steps {
            steps.insert(step.output_key.clone(), step.output.clone());
        }
        serde_json::json!({
            "date": self.date.to_string(),
            "steps": Value::Object(steps),
        })
    }

    pub fn is_complete(&self) -> bool {
        self.state == RunState::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_bundle_keyed_by_output_key() {
        let result = RunResult {
            date: NaiveDate::from_ymd_opt(2026, 8, 21).unwrap(),
            state: RunState::Complete,
            completed_steps: vec![
                CompletedStep {
                    order: 1,
                    template_id: "01_filter_events".to_string(),
                    output_key: "filter_events".to_string(),
                    output: serde_json::json!({"kept": 3}),
                    token_cost: 150,
                },
                CompletedStep {
                    order: 2,
                    template_id: "02_macro_regime".to_string(),
                    output_key: "macro_regime".to_string(),
                    output: serde_json::json!({"regime": "neutral"}),
                    token_cost: 150,
                },
            ],
            halted_early: false,
            halt_reason: HaltReason::None,
            error: None,
            guard: crate::guard::BudgetGuard::with_limits(
                std::time::Duration::from_secs(60),
                std::time::Duration::from_secs(1),
                1000,
            )
            .unwrap()
            .status(),
        };

        let bundle = result.output_bundle();
        assert_eq!(bundle["date"], "2026-08-21");
        assert_eq!(bundle["steps"]["filter_events"]["kept"], 3);
        assert_eq!(bundle["steps"]["macro_regime"]["regime"], "neutral");
    }

    #[test]
    fn halt_reason_serializes_snake_case() {
        let yaml = serde_yaml::to_string(&HaltReason::TokenExceeded).unwrap();
        assert_eq!(yaml.trim(), "token_exceeded");
    }
}
