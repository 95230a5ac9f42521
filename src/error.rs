//! Error types for the load-generation engine
//!
//! Only failures of the engine itself live here. A request that fails to
//! execute is not an error at this level: it becomes an `Outcome` with
//! `success == false` and is counted by the consumer.

use thiserror::Error;

/// Engine error type
#[derive(Error, Debug)]
pub enum BenchError {
    /// The benchmark configuration cannot be run
    #[error("configuration error: {0}")]
    Config(String),

    /// The outcome channel closed before every dispatched request reported back
    #[error("pipeline under-delivered: expected {expected} outcomes, received {received}")]
    Underdelivered {
        /// Outcomes the consumer was waiting for
        expected: u64,
        /// Outcomes actually observed before the channel closed
        received: u64,
    },

    /// Latency histogram error
    #[error("metrics error: {0}")]
    Metrics(String),
}

impl BenchError {
    /// Shorthand for a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<hdrhistogram::CreationError> for BenchError {
    fn from(err: hdrhistogram::CreationError) -> Self {
        Self::Metrics(err.to_string())
    }
}

impl From<hdrhistogram::RecordError> for BenchError {
    fn from(err: hdrhistogram::RecordError) -> Self {
        Self::Metrics(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underdelivered_message() {
        let err = BenchError::Underdelivered {
            expected: 10,
            received: 7,
        };
        assert_eq!(
            err.to_string(),
            "pipeline under-delivered: expected 10 outcomes, received 7"
        );
    }

    #[test]
    fn test_config_shorthand() {
        let err = BenchError::config("concurrency must be greater than 0");
        assert!(matches!(err, BenchError::Config(_)));
        assert_eq!(
            err.to_string(),
            "configuration error: concurrency must be greater than 0"
        );
    }
}
