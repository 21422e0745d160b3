//! Discriminated event payloads carried on the streams of §6.
//!
//! Wire encoding: `#[serde(tag = "type", content = "data")]` gives exactly
//! the `{"type": ..., "data": {...}}` shape required on the wire; the
//! `timestamp` field travels alongside at the transport layer (see
//! `redis_streams`), not inside this type, since it is a property of the
//! message envelope rather than of any one payload.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Match, MicroUnits, SettlementInstruction, TimestampMs};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    BidCreated(BidCreatedPayload),
    BidCancelled(BidCancelledPayload),
    UserConnected(UserConnectedPayload),
    UserDisconnected(UserDisconnectedPayload),
    EngagementUpdate(EngagementUpdatePayload),
    MatchAssigned(Match),
    MatchEnded(Match),
    SettlementInstruction(SettlementInstruction),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidCreatedPayload {
    pub bid_id: Option<Uuid>,
    pub agent_identity: String,
    pub max_price_per_second: MicroUnits,
    pub required_attention_score: f64,
    pub min_attention_seconds: Option<u64>,
    pub expiry_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidCancelledPayload {
    pub bid_id: Uuid,
    pub agent_identity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConnectedPayload {
    pub session_id: Uuid,
    pub human_identity: String,
    pub price_floor_per_second: MicroUnits,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserDisconnectedPayload {
    pub session_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementUpdatePayload {
    pub session_id: Uuid,
    pub seq: u64,
    pub timestamp: TimestampMs,
    pub attention: f64,
    pub liveness: f64,
    pub is_human: bool,
    pub signature: Option<String>,
}
