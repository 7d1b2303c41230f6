//! Step definitions and the validated step sequence
//!
//! The runner executes whatever sequence it is handed; structural
//! invariants (non-empty, strictly ascending order, unique output keys)
//! are enforced here, at assembly time.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// One reasoning step in the fixed pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Position in the sequence; steps run in ascending order.
    pub order: u32,
    /// Reference to an external prompt template, opaque to the runner.
    pub template_id: String,
    /// Key under which this step's output is merged into the run context.
    pub output_key: String,
    /// Token cost estimate supplied to the guard before dispatch.
    #[serde(default = "default_estimate")]
    pub estimated_tokens: u64,
}

fn default_estimate() -> u64 {
    1500
}

/// An ordered, structurally valid sequence of steps.
#[derive(Debug, Clone)]
pub struct StepSequence {
    steps: Vec<StepDefinition>,
}

impl StepSequence {
    pub fn new(steps: Vec<StepDefinition>) -> Result<Self> {
        if steps.is_empty() {
            return Err(PipelineError::InvalidSteps(
                "step sequence must not be empty".to_string(),
            ));
        }
        for pair in steps.windows(2) {
            if pair[1].order <= pair[0].order {
                return Err(PipelineError::InvalidSteps(format!(
                    "step order must be strictly ascending: {} then {}",
                    pair[0].order, pair[1].order
                )));
            }
        }
        let mut keys: Vec<&str> = steps.iter().map(|s| s.output_key.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        if keys.len() != steps.len() {
            return Err(PipelineError::InvalidSteps(
                "output keys must be unique".to_string(),
            ));
        }
        Ok(Self { steps })
    }

    /// The reference six-step configuration of the daily pipeline.
    pub fn reference(estimated_tokens: u64) -> Self {
        let ids = [
            "01_filter_events",
            "02_macro_regime",
            "03_policy_impact",
            "04_second_order",
            "05_scenarios",
            "06_brief",
        ];
        let steps = ids
            .iter()
            .enumerate()
            .map(|(i, id)| StepDefinition {
                order: (i + 1) as u32,
                template_id: id.to_string(),
                output_key: id[3..].to_string(),
                estimated_tokens,
            })
            .collect();
        // The reference sequence is ascending with unique keys by construction.
        Self::new(steps).expect("reference sequence is valid")
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StepDefinition> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn output_keys(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.output_key.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(order: u32, key: &str) -> StepDefinition {
        StepDefinition {
            order,
            template_id: format!("{order:02}_{key}"),
            output_key: key.to_string(),
            estimated_tokens: 150,
        }
    }

    #[test]
    fn empty_sequence_rejected() {
        assert!(StepSequence::new(vec![]).is_err());
    }

    #[test]
    fn non_ascending_order_rejected() {
        let err = StepSequence::new(vec![step(2, "a"), step(1, "b")]);
        assert!(err.is_err());
        let err = StepSequence::new(vec![step(1, "a"), step(1, "b")]);
        assert!(err.is_err());
    }

    #[test]
    fn duplicate_output_keys_rejected() {
        assert!(StepSequence::new(vec![step(1, "a"), step(2, "a")]).is_err());
    }

    #[test]
    fn reference_sequence_has_six_ordered_steps() {
        let seq = StepSequence::reference(150);
        assert_eq!(seq.len(), 6);
        assert_eq!(
            seq.output_keys(),
            vec![
                "filter_events",
                "macro_regime",
                "policy_impact",
                "second_order",
                "scenarios",
                "brief"
            ]
        );
        let orders: Vec<u32> = seq.iter().map(|s| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3, 4, 5, 6]);
    }
}
