//! Budget guard: wall-clock and token ceilings for a single run
//!
//! The guard is the single source of truth for "can we still spend time and
//! tokens". It is queried before every costly operation and records actual
//! cost after the operation returns. The gate is advisory-before, not
//! preventive-after: an in-flight model call is never interrupted, only the
//! next dispatch is blocked.
//!
//! One guard per run. Two runs executing concurrently must each hold their
//! own guard.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};
use crate::result::HaltReason;

/// Configured ceilings for a run, as they appear in `config.yaml`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Wall-clock ceiling for the whole run, in minutes.
    #[serde(alias = "execution_window_minutes")]
    pub max_duration_mins: u64,

    /// Token ceiling for the whole run.
    #[serde(alias = "daily_token_budget")]
    pub token_budget: u64,

    /// Buffer before the wall-clock ceiling at which dispatching stops.
    #[serde(alias = "safety_margin_minutes", default = "default_safety_margin")]
    pub safety_margin_mins: u64,
}

fn default_safety_margin() -> u64 {
    5
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_duration_mins: 60,
            token_budget: 100_000,
            safety_margin_mins: 5,
        }
    }
}

/// Serializable snapshot of guard state, for logging and the run archive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GuardStatus {
    pub elapsed_seconds: f64,
    pub remaining_seconds: f64,
    pub tokens_used: u64,
    pub remaining_tokens: i64,
    pub exceeded: bool,
}

/// Tracks elapsed time and cumulative token consumption against ceilings.
#[derive(Debug)]
pub struct BudgetGuard {
    start_time: Instant,
    max_duration: Duration,
    safety_margin: Duration,
    token_budget: u64,
    tokens_used: u64,
}

impl BudgetGuard {
    /// Create a guard from config limits. Fails fast on zero budgets or a
    /// safety margin that leaves no usable window; a misconfigured guard
    /// must never silently behave as always-exhausted or always-permissive.
    pub fn new(config: &BudgetConfig) -> Result<Self> {
        Self::with_limits(
            Duration::from_secs(config.max_duration_mins * 60),
            Duration::from_secs(config.safety_margin_mins * 60),
            config.token_budget,
        )
    }

    /// Create a guard with explicit durations. Used directly by tests that
    /// need sub-minute windows.
    pub fn with_limits(
        max_duration: Duration,
        safety_margin: Duration,
        token_budget: u64,
    ) -> Result<Self> {
        if max_duration.is_zero() {
            return Err(PipelineError::InvalidBudget(
                "max_duration must be positive".to_string(),
            ));
        }
        if token_budget == 0 {
            return Err(PipelineError::InvalidBudget(
                "token_budget must be positive".to_string(),
            ));
        }
        if safety_margin >= max_duration {
            return Err(PipelineError::InvalidBudget(format!(
                "safety_margin ({:?}) must be smaller than max_duration ({:?})",
                safety_margin, max_duration
            )));
        }
        debug!(
            max_duration_secs = max_duration.as_secs_f64(),
            token_budget, "budget guard created"
        );
        Ok(Self {
            start_time: Instant::now(),
            max_duration,
            safety_margin,
            token_budget,
            tokens_used: 0,
        })
    }

    /// Seconds since guard creation.
    pub fn elapsed_seconds(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Seconds left before the wall-clock ceiling. Negative signals overrun.
    pub fn remaining_seconds(&self) -> f64 {
        self.max_duration.as_secs_f64() - self.elapsed_seconds()
    }

    /// Tokens left under the budget. Negative signals overshoot.
    pub fn remaining_tokens(&self) -> i64 {
        self.token_budget as i64 - self.tokens_used as i64
    }

    pub fn tokens_used(&self) -> u64 {
        self.tokens_used
    }

    /// Whether a new operation of the given estimated cost may start.
    ///
    /// False once remaining time is within the safety margin, or once the
    /// estimate would push usage past the token budget. Exhaustion is a
    /// boolean signal, not an error.
    pub fn may_proceed(&self, estimated_next_cost: u64) -> bool {
        self.refusal(estimated_next_cost).is_none()
    }

    /// Like [`may_proceed`](Self::may_proceed), but reports which ceiling
    /// refused. Time is checked first.
    pub fn refusal(&self, estimated_next_cost: u64) -> Option<HaltReason> {
        if self.remaining_seconds() <= self.safety_margin.as_secs_f64() {
            return Some(HaltReason::TimeExceeded);
        }
        if self.tokens_used + estimated_next_cost > self.token_budget {
            return Some(HaltReason::TokenExceeded);
        }
        None
    }

    /// Record the actual cost of a completed operation. No upper clamp:
    /// usage may exceed the budget after this call; the guard blocks the
    /// next dispatch, not the one that already ran.
    pub fn record_usage(&mut self, actual_cost: u64) {
        self.tokens_used += actual_cost;
        let pct = (self.tokens_used as f64 / self.token_budget as f64) * 100.0;
        if self.tokens_used > self.token_budget {
            warn!(
                tokens_used = self.tokens_used,
                token_budget = self.token_budget,
                "token budget overshot"
            );
        } else {
            debug!(
                tokens_used = self.tokens_used,
                token_budget = self.token_budget,
                pct = format!("{:.1}", pct).as_str(),
                "tokens recorded"
            );
        }
    }

    /// Snapshot for logging and reporting.
    pub fn status(&self) -> GuardStatus {
        let remaining_seconds = self.remaining_seconds();
        let remaining_tokens = self.remaining_tokens();
        GuardStatus {
            elapsed_seconds: self.elapsed_seconds(),
            remaining_seconds,
            tokens_used: self.tokens_used,
            remaining_tokens,
            exceeded: remaining_seconds <= 0.0 || remaining_tokens <= 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(budget: u64) -> BudgetGuard {
        BudgetGuard::with_limits(
            Duration::from_secs(3600),
            Duration::from_secs(300),
            budget,
        )
        .unwrap()
    }

    #[test]
    fn fresh_guard_has_full_budgets() {
        let g = guard(1000);
        assert_eq!(g.tokens_used(), 0);
        assert_eq!(g.remaining_tokens(), 1000);
        // Construction time is effectively zero against a one-hour window.
        assert!((g.remaining_seconds() - 3600.0).abs() < 1.0);
    }

    #[test]
    fn record_usage_is_additive_and_monotonic() {
        let mut g = guard(1000);
        g.record_usage(150);
        g.record_usage(250);
        assert_eq!(g.tokens_used(), 400);
        assert_eq!(g.remaining_tokens(), 600);
    }

    #[test]
    fn record_usage_has_no_upper_clamp() {
        let mut g = guard(100);
        g.record_usage(250);
        assert_eq!(g.tokens_used(), 250);
        assert_eq!(g.remaining_tokens(), -150);
        assert!(g.status().exceeded);
    }

    #[test]
    fn may_proceed_refuses_when_estimate_exceeds_remaining_tokens() {
        let mut g = guard(1000);
        g.record_usage(900);
        assert!(g.may_proceed(100));
        assert!(!g.may_proceed(101));
        assert_eq!(g.refusal(101), Some(HaltReason::TokenExceeded));
    }

    #[test]
    fn may_proceed_refuses_inside_safety_margin_regardless_of_tokens() {
        // Window of 50ms with a 40ms margin leaves ~10ms of usable time.
        let g = BudgetGuard::with_limits(
            Duration::from_millis(50),
            Duration::from_millis(40),
            1_000_000,
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(!g.may_proceed(0));
        assert_eq!(g.refusal(0), Some(HaltReason::TimeExceeded));
    }

    #[test]
    fn remaining_time_goes_negative_after_overrun() {
        let g = BudgetGuard::with_limits(
            Duration::from_millis(10),
            Duration::from_millis(1),
            100,
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(25));
        assert!(g.remaining_seconds() < 0.0);
        assert!(g.status().exceeded);
    }

    #[test]
    fn zero_budgets_fail_fast() {
        assert!(BudgetGuard::with_limits(Duration::ZERO, Duration::ZERO, 100).is_err());
        assert!(
            BudgetGuard::with_limits(Duration::from_secs(60), Duration::from_secs(1), 0).is_err()
        );
        // Margin swallowing the whole window is also a misconfiguration.
        assert!(BudgetGuard::with_limits(
            Duration::from_secs(60),
            Duration::from_secs(60),
            100
        )
        .is_err());
    }

    #[test]
    fn status_snapshot_is_consistent() {
        let mut g = guard(1000);
        g.record_usage(400);
        let s = g.status();
        assert_eq!(s.tokens_used, 400);
        assert_eq!(s.remaining_tokens, 600);
        assert!(!s.exceeded);
    }
}
