//! daybrief: budget-guarded daily market analysis pipeline
//!
//! A sequential chain of LLM reasoning steps over a day's curated economic
//! events, bounded by a wall-clock window and a token budget. The pipeline
//! runs unattended once a day, so the design favors degrading gracefully
//! over finishing at any cost: the budget guard refuses the next step
//! rather than killing the current one, and a halted run archives whatever
//! it completed.
//!
//! The moving parts:
//!
//! - [`guard::BudgetGuard`] tracks elapsed time and token spend against
//!   configured ceilings and gates every dispatch.
//! - [`runner::StepRunner`] is a Tower service that walks the fixed step
//!   sequence, threading each step's output into the next step's prompt.
//! - [`provider`] holds the reasoning service seam: an OpenAI-backed
//!   implementation and a scripted one for tests and offline runs.
//! - [`pipeline::DailyPipeline`] ties events, guard, runner, validation,
//!   and the archive together for one date.
//!
//! ```no_run
//! use std::sync::Arc;
//! use daybrief::config::PipelineConfig;
//! use daybrief::pipeline::DailyPipeline;
//! use daybrief::provider::OpenAiReasoner;
//!
//! # async fn run() -> daybrief::error::Result<()> {
//! let config = PipelineConfig::load_or_default("config.yaml")?;
//! let client = Arc::new(async_openai::Client::new());
//! let reasoner = OpenAiReasoner::new(
//!     client,
//!     &config.api.model,
//!     config.api.temperature,
//!     config.api.max_tokens,
//! );
//! let pipeline = DailyPipeline::new(config, reasoner.into_svc());
//! let summary = pipeline.run(chrono::Utc::now().date_naive()).await?;
//! println!("{}", serde_yaml::to_string(&summary).unwrap());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod calendar;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod guard;
pub mod pipeline;
pub mod provider;
pub mod result;
pub mod retry;
pub mod runner;
pub mod steps;
pub mod templates;
pub mod validation;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use guard::{BudgetConfig, BudgetGuard, GuardStatus};
pub use pipeline::{DailyPipeline, PipelineSummary, RunStatus};
pub use result::{HaltReason, RunResult, RunState};
pub use runner::{RunRequest, StepRunner};
pub use steps::{StepDefinition, StepSequence};
