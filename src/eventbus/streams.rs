//! Process-wide stream-name and consumer-group constants (§6).

pub const BIDS_INCOMING: &str = "matching:bids:incoming";
pub const USERS_STATUS: &str = "matching:users:status";
pub const ENGAGEMENT_EVENTS: &str = "matching:engagement:events";

pub const MATCHES_ASSIGNMENTS: &str = "matching:matches:assignments";
pub const MATCHES_UPDATES: &str = "matching:matches:updates";
pub const SETTLEMENTS_INSTRUCTIONS: &str = "matching:settlements:instructions";

pub const CONSUMER_GROUP: &str = "matching-engine-group";

/// Consumer name for this process: a fixed prefix plus a process-identifying
/// suffix (the PID, chosen at startup by the composition root).
pub fn consumer_name(suffix: &str) -> String {
    format!("matching-engine-{suffix}")
}
