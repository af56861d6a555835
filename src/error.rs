// src/error.rs
use thiserror::Error;

use crate::snapshot::MetricKind;

/// Failures raised by the ingestion scheduler, fetchers, store and publisher.
///
/// Startup failures (`InvalidInterval`, `UnknownTask`) disable a single task.
/// Everything else is recovered inside the tick that produced it.
#[derive(Debug, Error)]
pub enum PulseError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("empty result from {0}")]
    EmptyResult(String),

    #[error("invalid interval for `{key}`")]
    InvalidInterval { key: String },

    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("no snapshot of kind {0:?} yet")]
    NotFound(MetricKind),
}

impl PulseError {
    /// Short label used for metric dimensions.
    pub fn reason(&self) -> &'static str {
        match self {
            PulseError::Transport(_) => "transport",
            PulseError::Decode(_) => "decode",
            PulseError::EmptyResult(_) => "empty",
            PulseError::InvalidInterval { .. } => "invalid_interval",
            PulseError::UnknownTask(_) => "unknown_task",
            PulseError::Persistence(_) => "persistence",
            PulseError::NotFound(_) => "not_found",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PulseError::NotFound(_))
    }
}

impl From<reqwest::Error> for PulseError {
    fn from(e: reqwest::Error) -> Self {
        // a body that fails to parse as JSON is a decode problem, not a transport one
        if e.is_decode() {
            PulseError::Decode(e.to_string())
        } else {
            PulseError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for PulseError {
    fn from(e: serde_json::Error) -> Self {
        PulseError::Decode(e.to_string())
    }
}

impl From<rusqlite::Error> for PulseError {
    fn from(e: rusqlite::Error) -> Self {
        PulseError::Persistence(e.to_string())
    }
}

pub type PulseResult<T> = Result<T, PulseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_errors_map_to_decode() {
        let err: PulseError = serde_json::from_str::<Vec<u32>>("{oops").unwrap_err().into();
        assert!(matches!(err, PulseError::Decode(_)));
        assert_eq!(err.reason(), "decode");
    }

    #[test]
    fn not_found_is_flagged() {
        assert!(PulseError::NotFound(MetricKind::BlockStats).is_not_found());
        assert!(!PulseError::EmptyResult("x".into()).is_not_found());
    }
}
