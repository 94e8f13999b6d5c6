//! Engine error types
//!
//! Hard errors reject a request before any model work happens. A runtime
//! failure during generation is not represented here: the session engine
//! captures it as a degraded response so the conversational audit trail
//! stays intact.

use crate::quota::DenyReason;
use crate::runtime::RuntimeError;

/// Errors surfaced by the session engine and service
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The runtime has no loaded model; not retryable until a load succeeds
    #[error("model not loaded")]
    ModelNotLoaded,

    /// Malformed or out-of-range request; a caller error, not retried
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A daily ceiling was exhausted; admissible again after date rollover
    #[error("{0}")]
    QuotaExceeded(DenyReason),

    /// The per-minute ceiling was hit; admissible again after the window lapses
    #[error("{0}")]
    RateLimited(DenyReason),

    /// The runtime failed outside of generation, e.g. while loading
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::InvalidRequest("prompt must not be empty".to_string());
        assert_eq!(err.to_string(), "invalid request: prompt must not be empty");

        let err = EngineError::QuotaExceeded(DenyReason::DailyMessages(50));
        assert_eq!(err.to_string(), "Daily message limit reached (50)");
    }
}
