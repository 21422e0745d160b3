//! SessionPool — the set of live, potentially-available human sessions (§4.2).
//!
//! Kept as a plain `HashMap` plus a secondary index from human identity to
//! session id: one connection per human identity is the invariant (§3), so
//! `upsert` evicts any prior session under the same identity rather than
//! letting two live side by side.

use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{MicroUnits, Session, SessionStatus, TimestampMs};

use super::errors::PoolError;

#[derive(Debug, Default)]
pub struct SessionPool {
    sessions: HashMap<Uuid, Session>,
    by_human_identity: HashMap<String, Uuid>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Insert a session, evicting any earlier session for the same human
    /// identity first (§3: one live connection per human identity).
    /// Returns the evicted session, if any.
    pub fn upsert(&mut self, session: Session) -> Option<Session> {
        let evicted = self.remove_by_human_identity(&session.human_identity);
        self.by_human_identity
            .insert(session.human_identity.clone(), session.id);
        self.sessions.insert(session.id, session);
        evicted
    }

    pub fn get_by_id(&self, id: Uuid) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn get_by_human_identity(&self, human_identity: &str) -> Option<&Session> {
        let id = self.by_human_identity.get(human_identity)?;
        self.sessions.get(id)
    }

    pub fn remove_by_id(&mut self, id: Uuid) -> Option<Session> {
        let session = self.sessions.remove(&id)?;
        self.by_human_identity.remove(&session.human_identity);
        Some(session)
    }

    fn remove_by_human_identity(&mut self, human_identity: &str) -> Option<Session> {
        let id = self.by_human_identity.remove(human_identity)?;
        self.sessions.remove(&id)
    }

    pub fn mark_busy(&mut self, id: Uuid, match_id: Uuid) -> Result<(), PoolError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(PoolError::UnknownSession(id))?;
        session.status = SessionStatus::Busy;
        session.current_match_id = Some(match_id);
        Ok(())
    }

    pub fn mark_available(&mut self, id: Uuid) -> Result<(), PoolError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(PoolError::UnknownSession(id))?;
        session.status = SessionStatus::Available;
        session.current_match_id = None;
        Ok(())
    }

    pub fn mark_disconnected(&mut self, id: Uuid) -> Result<(), PoolError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(PoolError::UnknownSession(id))?;
        session.status = SessionStatus::Disconnected;
        Ok(())
    }

    /// Generic patch entry point for the `update(sessionId, patch)` contract
    /// operation (§4.2) — the specific state transitions above cover every
    /// mutation the Matcher actually drives, but a caller may still reach
    /// for this directly rather than adding a single-use setter.
    pub fn update<F: FnOnce(&mut Session)>(&mut self, id: Uuid, patch: F) -> Result<(), PoolError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(PoolError::UnknownSession(id))?;
        patch(session);
        Ok(())
    }

    /// Update the rolling engagement/liveness scores reported by an
    /// engagement-update event, and refresh the heartbeat clock.
    pub fn update_engagement(
        &mut self,
        id: Uuid,
        engagement_score: f64,
        liveness_score: f64,
        now: TimestampMs,
    ) -> Result<(), PoolError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(PoolError::UnknownSession(id))?;
        session.last_engagement_score = engagement_score;
        session.last_liveness_score = liveness_score;
        session.last_heartbeat = now;
        Ok(())
    }

    pub fn available_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|s| s.is_available_for_matching())
            .count()
    }

    /// The cheapest price floor among currently available sessions, if any.
    pub fn min_available_floor(&self) -> Option<MicroUnits> {
        self.sessions
            .values()
            .filter(|s| s.is_available_for_matching())
            .map(|s| s.price_floor_per_second)
            .min()
    }

    /// Available sessions whose price floor a bid of `max_price` can clear,
    /// ordered price-floor-ascending (cheapest first) with `connected_at`
    /// ascending as the tie-break (§4.4 step 3). The Matcher walks this
    /// list applying `RuleEngine::can_match`/`meets_engagement` in order.
    pub fn find_matching_for(&self, max_price: MicroUnits) -> Vec<&Session> {
        let mut candidates: Vec<&Session> = self
            .sessions
            .values()
            .filter(|s| s.is_available_for_matching() && s.price_floor_per_second <= max_price)
            .collect();
        candidates.sort_by_key(|s| (s.price_floor_per_second, s.connected_at, s.id));
        candidates
    }

    /// Hard-remove every session whose heartbeat is older than
    /// `heartbeat_timeout_ms` (§4.2: "pruneStale(now) hard-removes such
    /// sessions"). Returns the removed records so callers (the Matcher)
    /// can still see which match, if any, a removed session was holding.
    pub fn prune_stale(&mut self, now: TimestampMs, heartbeat_timeout_ms: i64) -> Vec<Session> {
        let stale_ids: Vec<Uuid> = self
            .sessions
            .values()
            .filter(|s| s.is_stale(now, heartbeat_timeout_ms))
            .map(|s| s.id)
            .collect();
        stale_ids
            .into_iter()
            .filter_map(|id| self.remove_by_id(id))
            .collect()
    }
}
