//! Bid — a time-limited price offer for a human's verified attention.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{MicroUnits, TimestampMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BidStatus {
    Pending,
    Matched,
    Expired,
    Cancelled,
}

impl fmt::Display for BidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BidStatus::Pending => write!(f, "pending"),
            BidStatus::Matched => write!(f, "matched"),
            BidStatus::Expired => write!(f, "expired"),
            BidStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A bid submitted by an agent for a session's attention.
///
/// Ownership: once admitted, the `OrderBook` is the sole owner of this
/// record. `status` only ever transitions away from `Pending` as a side
/// effect of leaving the book (matched, expired, or cancelled).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub agent_identity: String,
    pub max_price_per_second: MicroUnits,
    pub required_attention_score: f64,
    pub min_attention_seconds: u64,
    pub created_at: TimestampMs,
    pub expiry: TimestampMs,
    pub status: BidStatus,
}

impl Bid {
    pub fn is_expired(&self, now: TimestampMs) -> bool {
        self.expiry <= now
    }
}
