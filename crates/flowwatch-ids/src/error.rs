use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors from the detection pipeline.
#[derive(Debug, Error)]
pub enum IdsError {
    #[error("invalid configuration: {field} -- {reason}")]
    InvalidConfig { field: String, reason: String },

    #[error("detector {detector} runs on a {detector_secs}s period, scheduler expects {scheduler_secs}s")]
    PeriodMismatch {
        detector: String,
        detector_secs: f64,
        scheduler_secs: f64,
    },

    #[error("window {index} starting at {start} runs past the last representable timestamp")]
    TimeOverflow { index: u64, start: DateTime<Utc> },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config decode error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("config encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),

    #[error("record pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record channel closed for scheduler {0}")]
    ChannelClosed(String),

    #[error("detector task failed: {0}")]
    Task(String),
}

impl IdsError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        IdsError::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<tokio::task::JoinError> for IdsError {
    fn from(e: tokio::task::JoinError) -> Self {
        IdsError::Task(e.to_string())
    }
}

/// Convenience type alias for pipeline results.
pub type IdsResult<T> = Result<T, IdsError>;
