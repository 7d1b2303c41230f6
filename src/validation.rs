//! Output validation: schema presence and forbidden-content rules
//!
//! Validation is informational. A failed report never rolls back or
//! retries completed steps; the caller decides what to do with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;

/// Forbidden-content keyword lists. The defaults mirror the pipeline's
/// standing constraints: no price predictions, no trading advice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintRules {
    #[serde(default = "default_price_keywords")]
    pub price_keywords: Vec<String>,
    #[serde(default = "default_trading_keywords")]
    pub trading_keywords: Vec<String>,
}

fn default_price_keywords() -> Vec<String> {
    ["target price", "will go up", "will go down", "bull run", "crash"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_trading_keywords() -> Vec<String> {
    ["buy", "sell", "go long", "go short", "increase exposure"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for ConstraintRules {
    fn default() -> Self {
        Self {
            price_keywords: default_price_keywords(),
            trading_keywords: default_trading_keywords(),
        }
    }
}

/// Result of the full validation suite over an output bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub timestamp: DateTime<Utc>,
    pub schema_valid: bool,
    pub schema_errors: Vec<String>,
    pub constraints_met: bool,
    pub constraint_violations: Vec<String>,
    pub overall_valid: bool,
}

/// Check that the bundle has a date and one entry per expected step.
fn validate_schema(bundle: &Value, expected_steps: &[String]) -> (bool, Vec<String>) {
    let mut errors = Vec::new();

    if bundle.get("date").is_none() {
        errors.push("missing 'date' field".to_string());
    }
    let steps = bundle.get("steps");
    if steps.is_none() {
        errors.push("missing 'steps' field".to_string());
    }
    for key in expected_steps {
        let present = steps
            .and_then(|s| s.get(key))
            .is_some();
        if !present {
            errors.push(format!("missing step: {key}"));
        }
    }

    (errors.is_empty(), errors)
}

/// Scan the serialized bundle for forbidden phrasing, case-insensitively.
fn check_constraints(bundle: &Value, rules: &ConstraintRules) -> Result<(bool, Vec<String>)> {
    let text = serde_yaml::to_string(bundle)?.to_lowercase();
    let mut violations = Vec::new();

    for keyword in &rules.price_keywords {
        if text.contains(&keyword.to_lowercase()) {
            violations.push(format!("price prediction keyword detected: '{keyword}'"));
        }
    }
    for keyword in &rules.trading_keywords {
        if text.contains(&keyword.to_lowercase()) {
            violations.push(format!("trading advice keyword detected: '{keyword}'"));
        }
    }

    Ok((violations.is_empty(), violations))
}

/// Run the full validation suite over an output bundle.
pub fn validate_output(
    bundle: &Value,
    expected_steps: &[String],
    rules: &ConstraintRules,
) -> Result<ValidationReport> {
    let (schema_valid, schema_errors) = validate_schema(bundle, expected_steps);
    let (constraints_met, constraint_violations) = check_constraints(bundle, rules)?;

    let report = ValidationReport {
        timestamp: Utc::now(),
        schema_valid,
        schema_errors,
        constraints_met,
        constraint_violations,
        overall_valid: schema_valid && constraints_met,
    };

    if report.overall_valid {
        info!("validation passed");
    } else {
        warn!(
            schema_errors = report.schema_errors.len(),
            violations = report.constraint_violations.len(),
            "validation failed"
        );
    }

    Ok(report)
}
