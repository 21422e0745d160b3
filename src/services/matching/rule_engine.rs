//! RuleEngine — pure admission/continuation predicates and settlement
//! arithmetic (§4.3). Holds no state but the grace-period memory required
//! by `should_continue`; everything else is a pure function of its inputs.

use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{Match, MatchStatus, MicroUnits, Session, SessionStatus, TimestampMs};

/// A machine-readable reason a pair was not admitted or a match was not
/// continued. Not an error — informational (§7 Taxonomy, (ii)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    SessionAlreadyMatched,
    SessionNotAvailable,
    PriceBelowFloor,
    HeartbeatStale,
    MinAttentionSecondsBelowConfigured,
    BidNotPending,
    BidExpired,
    EngagementBelowRequired,
    MatchNotActive,
    SessionDisconnected,
    LivenessBelowThreshold,
    EngagementBelowThresholdPastGrace,
}

#[derive(Debug, Clone)]
pub struct EnforcerConfig {
    pub min_attention_seconds: u64,
    pub heartbeat_timeout_ms: i64,
    pub min_engagement_score: f64,
    pub min_liveness_score: f64,
    pub low_engagement_grace_period_sec: i64,
}

impl Default for EnforcerConfig {
    fn default() -> Self {
        Self {
            min_attention_seconds: 5,
            heartbeat_timeout_ms: 30_000,
            min_engagement_score: 0.30,
            min_liveness_score: 0.50,
            low_engagement_grace_period_sec: 3,
        }
    }
}

#[derive(Debug, Default)]
pub struct RuleEngine {
    config: EnforcerConfig,
    /// match-id → timestamp of the first observation of low engagement
    /// since the last recovery. Cleared exactly once per match, mirroring
    /// `Matcher::end_match`'s idempotent clear-on-completion behavior.
    grace_started_at: HashMap<Uuid, TimestampMs>,
}

impl RuleEngine {
    pub fn new(config: EnforcerConfig) -> Self {
        Self {
            config,
            grace_started_at: HashMap::new(),
        }
    }

    pub fn config(&self) -> &EnforcerConfig {
        &self.config
    }

    /// Match-admission predicate, excluding engagement (see `meets_engagement`).
    pub fn can_match(
        &self,
        session: &Session,
        bid: &crate::models::Bid,
        now: TimestampMs,
    ) -> Result<(), Rejection> {
        if session.current_match_id.is_some() {
            return Err(Rejection::SessionAlreadyMatched);
        }
        if session.status != SessionStatus::Available {
            return Err(Rejection::SessionNotAvailable);
        }
        if bid.max_price_per_second < session.price_floor_per_second {
            return Err(Rejection::PriceBelowFloor);
        }
        if now - session.last_heartbeat > self.config.heartbeat_timeout_ms {
            return Err(Rejection::HeartbeatStale);
        }
        if bid.min_attention_seconds < self.config.min_attention_seconds {
            return Err(Rejection::MinAttentionSecondsBelowConfigured);
        }
        if bid.status != crate::models::BidStatus::Pending {
            return Err(Rejection::BidNotPending);
        }
        if bid.is_expired(now) {
            return Err(Rejection::BidExpired);
        }
        Ok(())
    }

    pub fn meets_engagement(&self, session: &Session, bid: &crate::models::Bid) -> Result<(), Rejection> {
        if session.last_engagement_score < bid.required_attention_score {
            return Err(Rejection::EngagementBelowRequired);
        }
        Ok(())
    }

    /// Continuation predicate with grace-period memory (§4.3).
    pub fn should_continue(
        &mut self,
        m: &Match,
        session: &Session,
        now: TimestampMs,
    ) -> Result<(), Rejection> {
        if m.status != MatchStatus::Active {
            return Err(Rejection::MatchNotActive);
        }
        if session.status == SessionStatus::Disconnected {
            return Err(Rejection::SessionDisconnected);
        }
        if session.is_stale(now, self.config.heartbeat_timeout_ms) {
            return Err(Rejection::HeartbeatStale);
        }
        if session.last_liveness_score < self.config.min_liveness_score {
            return Err(Rejection::LivenessBelowThreshold);
        }

        if session.last_engagement_score < self.config.min_engagement_score {
            let grace_start = *self
                .grace_started_at
                .entry(m.id)
                .or_insert(now);
            let elapsed_sec = (now - grace_start) / 1000;
            if elapsed_sec > self.config.low_engagement_grace_period_sec {
                return Err(Rejection::EngagementBelowThresholdPastGrace);
            }
        } else {
            self.grace_started_at.remove(&m.id);
        }

        Ok(())
    }

    /// Remove any grace-period memory for `match_id`. Must be called
    /// exactly once per match, at end (`Matcher::end_match`).
    pub fn clear_match_state(&mut self, match_id: Uuid) {
        self.grace_started_at.remove(&match_id);
    }

    pub fn agreed_price(&self, _session: &Session, bid: &crate::models::Bid) -> MicroUnits {
        bid.max_price_per_second
    }

    pub fn settlement_total(&self, m: &Match) -> MicroUnits {
        m.verified_seconds * m.agreed_price_per_second
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bid, BidStatus};

    fn session(price_floor: MicroUnits, engagement: f64, liveness: f64, heartbeat: TimestampMs) -> Session {
        Session {
            id: Uuid::new_v4(),
            human_identity: "human".to_string(),
            price_floor_per_second: price_floor,
            last_engagement_score: engagement,
            last_liveness_score: liveness,
            last_heartbeat: heartbeat,
            connected_at: 0,
            status: SessionStatus::Available,
            current_match_id: None,
        }
    }

    fn bid(max_price: MicroUnits, required_attention: f64, min_attention_seconds: u64) -> Bid {
        Bid {
            id: Uuid::new_v4(),
            agent_identity: "agent".to_string(),
            max_price_per_second: max_price,
            required_attention_score: required_attention,
            min_attention_seconds,
            created_at: 0,
            expiry: 1_000_000,
            status: BidStatus::Pending,
        }
    }

    fn active_match(agreed_price: MicroUnits) -> Match {
        Match {
            id: Uuid::new_v4(),
            bid_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            agent_identity: "agent".to_string(),
            human_identity: "human".to_string(),
            agreed_price_per_second: agreed_price,
            verified_seconds: 0,
            accumulated_amount: 0,
            started_at: 0,
            ended_at: None,
            end_reason: None,
            status: MatchStatus::Active,
            bid_expiry: 1_000_000,
        }
    }

    #[test]
    fn can_match_rejects_price_below_floor() {
        let engine = RuleEngine::new(EnforcerConfig::default());
        let s = session(100, 1.0, 1.0, 0);
        let b = bid(50, 0.0, 10);
        assert_eq!(engine.can_match(&s, &b, 0), Err(Rejection::PriceBelowFloor));
    }

    #[test]
    fn can_match_rejects_stale_heartbeat() {
        let engine = RuleEngine::new(EnforcerConfig::default());
        let s = session(10, 1.0, 1.0, 0);
        let b = bid(100, 0.0, 10);
        assert_eq!(
            engine.can_match(&s, &b, 60_000),
            Err(Rejection::HeartbeatStale)
        );
    }

    #[test]
    fn meets_engagement_requires_score_at_or_above_required() {
        let engine = RuleEngine::new(EnforcerConfig::default());
        let s = session(10, 0.4, 1.0, 0);
        let low_bar = bid(100, 0.4, 10);
        let high_bar = bid(100, 0.5, 10);
        assert!(engine.meets_engagement(&s, &low_bar).is_ok());
        assert_eq!(
            engine.meets_engagement(&s, &high_bar),
            Err(Rejection::EngagementBelowRequired)
        );
    }

    #[test]
    fn grace_period_tolerates_two_calls_then_fails_on_the_third() {
        let mut engine = RuleEngine::new(EnforcerConfig {
            low_engagement_grace_period_sec: 3,
            ..EnforcerConfig::default()
        });
        let m = active_match(100);
        let mut s = session(10, 0.1, 1.0, 0);

        s.last_heartbeat = 0;
        assert!(engine.should_continue(&m, &s, 0).is_ok());
        s.last_heartbeat = 2_000;
        assert!(engine.should_continue(&m, &s, 2_000).is_ok());
        s.last_heartbeat = 4_000;
        assert_eq!(
            engine.should_continue(&m, &s, 4_000),
            Err(Rejection::EngagementBelowThresholdPastGrace)
        );
    }

    #[test]
    fn engagement_recovery_clears_grace_state() {
        let mut engine = RuleEngine::new(EnforcerConfig::default());
        let m = active_match(100);
        let mut s = session(10, 0.1, 1.0, 0);
        assert!(engine.should_continue(&m, &s, 0).is_ok());

        s.last_engagement_score = 0.9;
        s.last_heartbeat = 1_000;
        assert!(engine.should_continue(&m, &s, 1_000).is_ok());
        assert!(!engine.grace_started_at.contains_key(&m.id));
    }

    #[test]
    fn clear_match_state_removes_grace_memory() {
        let mut engine = RuleEngine::new(EnforcerConfig::default());
        let m = active_match(100);
        let s = session(10, 0.1, 1.0, 0);
        let _ = engine.should_continue(&m, &s, 0);
        assert!(engine.grace_started_at.contains_key(&m.id));

        engine.clear_match_state(m.id);
        assert!(!engine.grace_started_at.contains_key(&m.id));
    }

    #[test]
    fn settlement_total_is_verified_seconds_times_agreed_price() {
        let engine = RuleEngine::new(EnforcerConfig::default());
        let mut m = active_match(40);
        m.verified_seconds = 7;
        assert_eq!(engine.settlement_total(&m), 280);
    }
}
