use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Reasoning error: {0}")]
    Reasoning(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Polars error: {0}")]
    Polars(String),
}

impl From<polars::prelude::PolarsError> for InsightsError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        InsightsError::Polars(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InsightsError>;
