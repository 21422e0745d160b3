//! Settlement instruction — the terminal record for an ended match.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{MicroUnits, TimestampMs};

/// Emitted at most once per match id, immediately after `match_ended`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementInstruction {
    pub match_id: Uuid,
    pub verified_seconds: u64,
    pub agreed_price_per_second: MicroUnits,
    pub total_amount: MicroUnits,
    pub escrow_account: String,
    pub payee: String,
    pub nonce: TimestampMs,
    pub timestamp: TimestampMs,
}
