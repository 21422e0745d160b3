//! Validation-error taxonomy for inbound events (§4.5, §7 (i)).
//!
//! These are never surfaced as handler failures: a validation error means
//! the offending message is logged and dropped, but still acknowledged,
//! so it can never become a poison pill stuck at the head of the stream.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("price must be positive")]
    NonPositivePrice,

    #[error("attention score must be in [0, 1]")]
    AttentionScoreOutOfRange,

    #[error("expiry must be in the future")]
    ExpiryNotInFuture,

    #[error("agent identity must not be empty")]
    EmptyAgentIdentity,

    #[error("human identity must not be empty")]
    EmptyHumanIdentity,

    #[error("event on this stream was not the expected discriminant")]
    UnexpectedEventType,
}
