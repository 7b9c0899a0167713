use serde::Serialize;
use thiserror::Error;

/// Errors that abort the current operation and surface to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClusterError {
    /// Unknown method name, invalid K range, out-of-domain knob.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Not enough rows (or clusters) for what was asked.
    #[error("insufficient data: {0}")]
    DataInsufficiency(String),

    #[error("shape mismatch: expected {expected} rows, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("number of features ({got}) doesn't match training data ({expected})")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("{0} not fitted, call fit() first")]
    NotFitted(&'static str),
}

impl ClusterError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        ClusterError::Configuration(msg.into())
    }

    pub(crate) fn insufficient(msg: impl Into<String>) -> Self {
        ClusterError::DataInsufficiency(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;

/// A single validation metric that could not be computed.
///
/// Recorded in place of a score; never thrown.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("{metric} unavailable: {reason}")]
pub struct MetricUnavailable {
    pub metric: &'static str,
    pub reason: String,
}

impl MetricUnavailable {
    pub fn new(metric: &'static str, reason: impl Into<String>) -> Self {
        Self {
            metric,
            reason: reason.into(),
        }
    }
}
