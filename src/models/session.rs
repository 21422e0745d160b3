//! Session — a live connection representing a human seller's availability.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{MicroUnits, TimestampMs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Available,
    Busy,
    Disconnected,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Available => write!(f, "available"),
            SessionStatus::Busy => write!(f, "busy"),
            SessionStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// A live seller session. Owned exclusively by the `SessionPool`.
///
/// Invariant: `status == Busy` iff `current_match_id.is_some()`. The pool
/// never hands out a mutable reference; all mutation goes through its own
/// methods so this invariant can't be broken from the outside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub human_identity: String,
    pub price_floor_per_second: MicroUnits,
    pub last_engagement_score: f64,
    pub last_liveness_score: f64,
    pub last_heartbeat: TimestampMs,
    pub connected_at: TimestampMs,
    pub status: SessionStatus,
    pub current_match_id: Option<Uuid>,
}

impl Session {
    pub fn is_stale(&self, now: TimestampMs, heartbeat_timeout_ms: i64) -> bool {
        now - self.last_heartbeat > heartbeat_timeout_ms
    }

    pub fn is_available_for_matching(&self) -> bool {
        self.status == SessionStatus::Available && self.current_match_id.is_none()
    }
}
