//! Error taxonomy for the matching core (§7).
//!
//! Programmer errors (duplicate ids, mutating the unknown) surface as hard
//! errors; rule rejections are not errors at all (see `rule_engine::
//! Rejection`, returned as data, not as a `Result::Err`).

use uuid::Uuid;

/// Programmer-error class failures from `OrderBook` and `SessionPool`.
/// These indicate a caller bug (duplicate id, wrong status, unknown id)
/// and should never be silently repaired.
#[derive(Debug, thiserror::Error)]
pub enum BookError {
    #[error("bid {0} is already present in the book")]
    DuplicateBid(Uuid),

    #[error("bid {0} cannot be admitted with status {1}")]
    NotPending(Uuid, String),

    #[error("bid {0} not found")]
    UnknownBid(Uuid),
}

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("session {0} not found")]
    UnknownSession(Uuid),
}
