//! # error
//!
//! Centralised error types for the RSI engine.
//!
//! Three layers, matching the error taxonomy of the pipeline:
//!
//! * [`DecodeError`]: a malformed input message.  Logged and skipped, never fatal.
//! * [`BrokerError`]: the transport misbehaved (unreachable, unknown topic, closed).
//! * [`EngineError`]: everything a worker or the coordinator can surface; wraps
//!   the two above and adds timeouts, encoding failures and shutdown.

use std::time::Duration;

use thiserror::Error;

// ─── Malformed Input ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not valid JSON or does not match the trade-event shape.
    #[error("Invalid payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field is present but empty.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Price must be finite and strictly positive.
    #[error("Invalid price: {0}")]
    InvalidPrice(f64),

    /// Timestamp could not be interpreted as ISO-8601 or epoch.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

// ─── Transport ────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum BrokerError {
    /// Broker cannot be reached right now.  Always worth retrying.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// Topic has not been created on the broker.
    #[error("Unknown topic: {0}")]
    UnknownTopic(String),

    /// Partition index outside the topic's partition range.
    #[error("Unknown partition {partition} on topic {topic}")]
    UnknownPartition { topic: String, partition: u32 },

    /// The stream was closed underneath the consumer.
    #[error("Stream closed")]
    Closed,
}

// ─── Engine ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// A receive or publish did not complete within its configured budget.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// Outgoing event could not be serialized.
    #[error("Encode error: {0}")]
    Encode(#[source] serde_json::Error),

    /// Publish gave up after exhausting its retry budget.
    #[error("Publish failed after {attempts} attempts: {last}")]
    PublishExhausted { attempts: u32, last: String },

    /// Startup could not complete (bad config, broker unreachable, topic missing).
    #[error("Fatal configuration error: {0}")]
    Config(String),

    /// Shutdown was requested while the operation was waiting.
    #[error("Shutdown requested")]
    Shutdown,
}

impl EngineError {
    /// Transient errors are retried in place by the publisher and, when the
    /// retry budget runs out, by the worker holding the event and re-sending it.
    ///
    /// Encoding failures count as transient on the publish path: the input
    /// offset stays uncommitted instead of the event being dropped.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Broker(BrokerError::Unavailable(_)) => true,
            EngineError::Timeout { .. } => true,
            EngineError::PublishExhausted { .. } => true,
            EngineError::Encode(_) => true,
            EngineError::Broker(_)
            | EngineError::Decode(_)
            | EngineError::Config(_)
            | EngineError::Shutdown => false,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(EngineError::Broker(BrokerError::Unavailable("down".into())).is_retryable());
        assert!(EngineError::Timeout { op: "publish", after: Duration::from_millis(5) }.is_retryable());
    }

    #[test]
    fn test_fatal_errors_are_not_retryable() {
        assert!(!EngineError::Config("no broker".into()).is_retryable());
        assert!(!EngineError::Broker(BrokerError::UnknownTopic("x".into())).is_retryable());
        assert!(!EngineError::Shutdown.is_retryable());
    }
}
