//! Match — an opened, metered pairing of one bid and one session.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{MicroUnits, TimestampMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Active,
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Active => write!(f, "active"),
            MatchStatus::Completed => write!(f, "completed"),
            MatchStatus::Cancelled => write!(f, "cancelled"),
            MatchStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Why a match stopped accumulating verified time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    DurationMet,
    LowEngagement,
    UserDisconnected,
    BidExpired,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::DurationMet => write!(f, "duration_met"),
            EndReason::LowEngagement => write!(f, "low_engagement"),
            EndReason::UserDisconnected => write!(f, "user_disconnected"),
            EndReason::BidExpired => write!(f, "bid_expired"),
        }
    }
}

/// An opened pairing of a bid and a session. Owned exclusively by the
/// Matcher's active-match table; it leaves that table only via `end_match`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub bid_id: Uuid,
    pub session_id: Uuid,
    pub agent_identity: String,
    pub human_identity: String,
    pub agreed_price_per_second: MicroUnits,
    pub verified_seconds: u64,
    pub accumulated_amount: MicroUnits,
    pub started_at: TimestampMs,
    pub ended_at: Option<TimestampMs>,
    pub end_reason: Option<EndReason>,
    pub status: MatchStatus,
    /// The originating bid's expiry, carried forward since the bid itself
    /// leaves the book on admission. The agent's time-bound commitment
    /// still caps how long the match may run after that.
    pub bid_expiry: TimestampMs,
}

impl Match {
    /// Recompute `accumulated_amount` from `verified_seconds × agreed_price`.
    /// The only place this product is taken — keeps invariant 4 (§3) true
    /// by construction rather than by discipline at every call site.
    pub fn recompute_amount(&mut self) {
        self.accumulated_amount = self.verified_seconds * self.agreed_price_per_second;
    }
}
