use std::time::Duration;

/// Everything that can go wrong between the query source and a sink.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Missing or malformed startup configuration.
    #[error("config error: {0}")]
    Config(String),

    /// The metric name listing could not be fetched.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A single derived query failed.
    #[error("query `{query}` failed: {cause}")]
    QueryFailed { query: String, cause: String },

    /// At least one page of a submission failed.
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// A network call ran past its time box.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl HarvestError {
    pub fn query_failed(query: impl Into<String>, cause: impl ToString) -> Self {
        Self::QueryFailed {
            query: query.into(),
            cause: cause.to_string(),
        }
    }

    /// Discovery failures mean the configuration itself is likely wrong.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_) | Self::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, HarvestError>;
