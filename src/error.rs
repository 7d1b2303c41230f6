//! Error types for the pipeline

use thiserror::Error;

/// Result type alias for the pipeline
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Budget limits rejected at guard construction
    #[error("invalid budget configuration: {0}")]
    InvalidBudget(String),

    /// Step sequence rejected at assembly
    #[error("invalid step sequence: {0}")]
    InvalidSteps(String),

    /// Prompt template missing or unreadable
    #[error("template error: {0}")]
    Template(String),

    /// Error from the OpenAI API
    #[error("OpenAI API error: {0}")]
    OpenAi(#[from] async_openai::error::OpenAIError),

    /// YAML read/write error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}
