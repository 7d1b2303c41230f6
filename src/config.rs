//! Pipeline configuration
//!
//! One explicit configuration object, constructed once per run and passed
//! into the guard and runner. Loaded from `config.yaml` with env-var
//! overrides; every section has defaults matching the reference setup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::guard::BudgetConfig;
use crate::retry::RetryConfig;
use crate::steps::{StepDefinition, StepSequence};
use crate::validation::ConstraintRules;

/// Model API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.2,
            max_tokens: 1024,
        }
    }
}

/// Filesystem layout for data and prompt files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub prompts_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            prompts_dir: PathBuf::from("prompts"),
        }
    }
}

impl PathsConfig {
    pub fn events_dir(&self) -> PathBuf {
        self.data_dir.join("events")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.data_dir.join("archive")
    }

    pub fn markets_dir(&self) -> PathBuf {
        self.data_dir.join("markets")
    }
}

fn default_steps() -> Vec<StepDefinition> {
    StepSequence::reference(1500).iter().cloned().collect()
}

/// Full pipeline configuration, as read from `config.yaml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub limits: BudgetConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub constraints: ConstraintRules,
    #[serde(default = "default_steps")]
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limits: BudgetConfig::default(),
            api: ApiConfig::default(),
            retry: RetryConfig::default(),
            constraints: ConstraintRules::default(),
            steps: default_steps(),
            paths: PathsConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let mut config: Self = serde_yaml::from_str(&contents)?;
        config.apply_env();
        Ok(config)
    }

    /// Load `config.yaml` if present, otherwise fall back to defaults.
    /// Env overrides apply either way.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            debug!("no config file, using defaults");
            let mut config = Self::default();
            config.apply_env();
            Ok(config)
        }
    }

    /// Environment overrides for the budget limits and model choice.
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("DAYBRIEF_TOKEN_BUDGET") {
            if let Ok(n) = v.parse::<u64>() {
                self.limits.token_budget = n;
            }
        }
        if let Ok(v) = std::env::var("DAYBRIEF_MAX_DURATION_MINS") {
            if let Ok(n) = v.parse::<u64>() {
                self.limits.max_duration_mins = n;
            }
        }
        if let Ok(v) = std::env::var("DAYBRIEF_MODEL") {
            self.api.model = v;
        }
    }

    /// The validated step sequence for this configuration.
    pub fn step_sequence(&self) -> Result<StepSequence> {
        StepSequence::new(self.steps.clone())
    }
}
