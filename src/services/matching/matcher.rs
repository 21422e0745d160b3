//! Matcher — the single-writer actor task (§4.4, §5).
//!
//! Owns `OrderBook`, `SessionPool`, the active-match table, and the
//! `RuleEngine` outright as plain collections, and drains a single
//! `tokio::sync::mpsc` command channel in arrival order. Nothing else
//! ever touches the owned state directly — producers (ingress consumer
//! tasks, interval tickers) only ever send `Command`s.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::eventbus::event::{Event, EngagementUpdatePayload};
use crate::eventbus::streams::{MATCHES_ASSIGNMENTS, MATCHES_UPDATES, SETTLEMENTS_INSTRUCTIONS};
use crate::eventbus::EventBus;
use crate::metrics;
use crate::models::{Bid, BidStatus, EndReason, Match, MatchStatus, Session, TimestampMs};

use super::order_book::OrderBook;
use super::rule_engine::{EnforcerConfig, RuleEngine};
use super::session_pool::SessionPool;

#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub match_interval_ms: u64,
    pub prune_interval_ms: u64,
    pub max_matches_per_iteration: usize,
    pub emit_events: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            match_interval_ms: 10,
            prune_interval_ms: 1_000,
            max_matches_per_iteration: 50,
            emit_events: true,
        }
    }
}

/// Commands accepted by the Matcher actor loop, carrying ingress events,
/// tick events, and sweep events in arrival order (§5).
#[derive(Debug)]
pub enum Command {
    BidCreated(Bid),
    BidCancelled { bid_id: Uuid },
    UserConnected(Session),
    UserDisconnected { session_id: Uuid },
    Engagement(EngagementUpdatePayload),
    Tick { now: TimestampMs },
    Sweep { now: TimestampMs },
}

enum MatchOutcome {
    Matched(Match),
    NoMatch,
}

pub struct Matcher<B: EventBus> {
    book: OrderBook,
    pool: SessionPool,
    rules: RuleEngine,
    active_matches: HashMap<Uuid, Match>,
    event_bus: Arc<B>,
    config: MatcherConfig,
    rx: mpsc::Receiver<Command>,
}

impl<B: EventBus> Matcher<B> {
    pub fn new(
        event_bus: Arc<B>,
        config: MatcherConfig,
        enforcer_config: EnforcerConfig,
        rx: mpsc::Receiver<Command>,
    ) -> Self {
        Self {
            book: OrderBook::new(),
            pool: SessionPool::new(),
            rules: RuleEngine::new(enforcer_config),
            active_matches: HashMap::new(),
            event_bus,
            config,
            rx,
        }
    }

    /// Drain the command channel until it closes (shutdown). Each command
    /// is handled to completion — including any outbound `await`s — before
    /// the next is taken off the channel, which is what gives the single-
    /// writer guarantee without a lock around the owned state.
    pub async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            self.handle(command).await;
        }
        tracing::info!("matcher command channel closed, actor exiting");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::BidCreated(bid) => self.handle_bid_created(bid).await,
            Command::BidCancelled { bid_id } => self.handle_bid_cancelled(bid_id),
            Command::UserConnected(session) => {
                let _ = self.pool.upsert(session);
            }
            Command::UserDisconnected { session_id } => {
                self.handle_user_disconnect(session_id).await
            }
            Command::Engagement(update) => {
                self.process_engagement(
                    update.session_id,
                    update.attention,
                    update.liveness,
                    update.timestamp,
                )
                .await
            }
            Command::Tick { now } => self.handle_tick(now).await,
            Command::Sweep { now } => self.handle_sweep(now).await,
        }
        self.publish_gauges();
    }

    async fn handle_bid_created(&mut self, bid: Bid) {
        let bid_id = bid.id;
        if let Err(e) = self.book.add(bid) {
            tracing::warn!(bid_id = %bid_id, error = %e, "rejected bid admission");
            return;
        }
        metrics::record_bid_submitted();
    }

    fn handle_bid_cancelled(&mut self, bid_id: Uuid) {
        if self.book.update_status(bid_id, BidStatus::Cancelled).is_ok() {
            self.book.remove_by_id(bid_id);
            metrics::record_bid_cancelled();
        }
    }

    async fn handle_user_disconnect(&mut self, session_id: Uuid) {
        let match_id = self
            .pool
            .get_by_id(session_id)
            .and_then(|s| s.current_match_id);
        if let Some(match_id) = match_id {
            self.end_match(match_id, MatchStatus::Cancelled, EndReason::UserDisconnected)
                .await;
        }
        self.pool.remove_by_id(session_id);
    }

    /// processEngagement(sessionId, attention, liveness, durationSeconds) — §4.4.
    async fn process_engagement(
        &mut self,
        session_id: Uuid,
        attention: f64,
        liveness: f64,
        now: TimestampMs,
    ) {
        let duration_seconds = match self.pool.get_by_id(session_id) {
            Some(session) => {
                let elapsed_ms = (now - session.last_heartbeat).max(0);
                (elapsed_ms / 1000) as u64
            }
            None => return,
        };

        if self
            .pool
            .update_engagement(session_id, attention, liveness, now)
            .is_err()
        {
            return;
        }

        let match_id = match self.pool.get_by_id(session_id).and_then(|s| s.current_match_id) {
            Some(id) => id,
            None => return,
        };

        let should_continue = {
            let m = match self.active_matches.get(&match_id) {
                Some(m) if m.status == MatchStatus::Active => m,
                _ => return,
            };
            let session = match self.pool.get_by_id(session_id) {
                Some(s) => s,
                None => return,
            };
            self.rules.should_continue(m, session, now)
        };

        match should_continue {
            Err(_) => {
                self.end_match(match_id, MatchStatus::Failed, EndReason::LowEngagement)
                    .await;
            }
            Ok(()) => {
                if let Some(m) = self.active_matches.get_mut(&match_id) {
                    m.verified_seconds += duration_seconds;
                    m.recompute_amount();
                }
            }
        }
    }

    async fn handle_tick(&mut self, now: TimestampMs) {
        for _ in 0..self.config.max_matches_per_iteration {
            let timer = metrics::Timer::new();
            let outcome = self.try_one_match(now);
            match outcome {
                MatchOutcome::Matched(m) => {
                    metrics::record_match_construction_duration(timer.elapsed_secs());
                    metrics::record_match_created();
                    self.emit(MATCHES_ASSIGNMENTS, Event::MatchAssigned(m)).await;
                }
                MatchOutcome::NoMatch => break,
            }
        }
    }

    /// One match attempt per §4.4: peek top bid, skip if expired, find a
    /// price-eligible candidate that also satisfies the rule engine, admit.
    fn try_one_match(&mut self, now: TimestampMs) -> MatchOutcome {
        let top = match self.book.peek_top() {
            Some(b) => b.clone(),
            None => return MatchOutcome::NoMatch,
        };

        if top.is_expired(now) {
            self.book.remove_by_id(top.id);
            metrics::record_bid_expired();
            return MatchOutcome::NoMatch;
        }

        let candidates = self.pool.find_matching_for(top.max_price_per_second);
        let admitted_session_id = candidates.into_iter().find_map(|session| {
            if self.rules.can_match(session, &top, now).is_ok()
                && self.rules.meets_engagement(session, &top).is_ok()
            {
                Some(session.id)
            } else {
                None
            }
        });

        let session_id = match admitted_session_id {
            Some(id) => id,
            None => return MatchOutcome::NoMatch,
        };

        let _ = self.book.update_status(top.id, BidStatus::Matched);
        self.book.remove_by_id(top.id);
        let session = self.pool.get_by_id(session_id).expect("candidate vanished");
        let agreed_price = self.rules.agreed_price(session, &top);
        let match_id = Uuid::new_v4();

        let m = Match {
            id: match_id,
            bid_id: top.id,
            session_id,
            agent_identity: top.agent_identity.clone(),
            human_identity: session.human_identity.clone(),
            agreed_price_per_second: agreed_price,
            verified_seconds: 0,
            accumulated_amount: 0,
            started_at: now,
            ended_at: None,
            end_reason: None,
            status: MatchStatus::Active,
            bid_expiry: top.expiry,
        };

        let _ = self.pool.mark_busy(session_id, match_id);
        self.active_matches.insert(match_id, m.clone());

        MatchOutcome::Matched(m)
    }

    async fn handle_sweep(&mut self, now: TimestampMs) {
        let expired = self.book.prune_expired(now);
        if expired > 0 {
            tracing::debug!(count = expired, "pruned expired bids");
        }
        if let Some(floor) = self.pool.min_available_floor() {
            let above = self.book.snapshot_above_price(floor).len();
            if above > 0 {
                tracing::debug!(
                    count = above,
                    floor,
                    "bids priced above an available session's floor remain unmatched"
                );
            }
        }
        // `prune_stale` already hard-removed these from the pool (§4.2), so
        // any active match they were holding must be ended here directly —
        // `handle_user_disconnect` would no longer find the session to look
        // its match id up from.
        let removed = self.pool.prune_stale(now, self.rules.config().heartbeat_timeout_ms);
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "pruned stale sessions");
        }
        for session in removed {
            if let Some(match_id) = session.current_match_id {
                self.end_match(match_id, MatchStatus::Cancelled, EndReason::UserDisconnected)
                    .await;
            }
        }

        // The bid that opened a match carried its own expiry (§4.1); that
        // commitment window still bounds the match after admission, even
        // though the bid itself left the book on match creation.
        let lapsed: Vec<Uuid> = self
            .active_matches
            .values()
            .filter(|m| now >= m.bid_expiry)
            .map(|m| m.id)
            .collect();
        for match_id in lapsed {
            self.end_match(match_id, MatchStatus::Completed, EndReason::BidExpired)
                .await;
        }
    }

    /// endMatch(matchId, status, reason) — §4.4. Idempotent per id.
    async fn end_match(&mut self, match_id: Uuid, status: MatchStatus, reason: EndReason) {
        let mut m = match self.active_matches.remove(&match_id) {
            Some(m) => m,
            None => return,
        };

        m.status = status;
        m.end_reason = Some(reason);
        let ended_at = chrono::Utc::now().timestamp_millis();
        m.ended_at = Some(ended_at);
        m.recompute_amount();

        let _ = self.pool.mark_available(m.session_id);
        self.rules.clear_match_state(match_id);

        let completed = matches!(status, MatchStatus::Completed);
        metrics::record_match_ended(&reason.to_string(), completed);

        let settlement = crate::models::SettlementInstruction {
            match_id: m.id,
            verified_seconds: m.verified_seconds,
            agreed_price_per_second: m.agreed_price_per_second,
            total_amount: self.rules.settlement_total(&m),
            escrow_account: m.agent_identity.clone(),
            payee: m.human_identity.clone(),
            nonce: ended_at,
            timestamp: ended_at,
        };

        metrics::record_settlement(settlement.total_amount);
        self.emit(MATCHES_UPDATES, Event::MatchEnded(m)).await;
        self.emit(SETTLEMENTS_INSTRUCTIONS, Event::SettlementInstruction(settlement))
            .await;
    }

    async fn emit(&self, stream: &str, event: Event) {
        if !self.config.emit_events {
            return;
        }
        if let Err(e) = self.event_bus.append(stream, &event).await {
            tracing::error!(stream, error = %e, "failed to emit event");
        } else {
            metrics::record_event_appended(stream);
        }
    }

    fn publish_gauges(&self) {
        metrics::set_active_matches(self.active_matches.len() as i64);
        metrics::set_order_book_size(self.book.size() as i64);
        metrics::set_available_sessions(self.pool.available_count() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventbus::fake::InMemoryEventBus;
    use crate::models::{BidStatus, SessionStatus};

    fn bid(price: u64, now: TimestampMs) -> Bid {
        Bid {
            id: Uuid::new_v4(),
            agent_identity: "agent".to_string(),
            max_price_per_second: price,
            required_attention_score: 0.3,
            min_attention_seconds: 5,
            created_at: now,
            expiry: now + 60_000,
            status: BidStatus::Pending,
        }
    }

    fn session(price_floor: u64, now: TimestampMs) -> Session {
        Session {
            id: Uuid::new_v4(),
            human_identity: "human".to_string(),
            price_floor_per_second: price_floor,
            last_engagement_score: 0.9,
            last_liveness_score: 0.9,
            last_heartbeat: now,
            connected_at: now,
            status: SessionStatus::Available,
            current_match_id: None,
        }
    }

    fn spawn_matcher() -> (mpsc::Sender<Command>, Arc<InMemoryEventBus>, tokio::task::JoinHandle<()>) {
        let bus = Arc::new(InMemoryEventBus::new());
        let (tx, rx) = mpsc::channel(64);
        let matcher = Matcher::new(bus.clone(), MatcherConfig::default(), EnforcerConfig::default(), rx);
        let handle = tokio::spawn(matcher.run());
        (tx, bus, handle)
    }

    #[tokio::test]
    async fn simple_match_emits_assignment_and_settlement_on_completion() {
        let (tx, bus, handle) = spawn_matcher();

        let s = session(50, 0);
        let session_id = s.id;
        tx.send(Command::UserConnected(s)).await.unwrap();
        tx.send(Command::BidCreated(bid(100, 0))).await.unwrap();
        tx.send(Command::Tick { now: 0 }).await.unwrap();

        // Let the actor drain the queued commands before inspecting state.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let appended = bus.appended.lock().unwrap();
        assert!(appended
            .iter()
            .any(|(stream, _)| *stream == MATCHES_ASSIGNMENTS));
        drop(appended);

        drop(tx);
        handle.await.unwrap();
        let _ = session_id;
    }

    #[tokio::test]
    async fn sweep_ends_a_match_whose_bid_expiry_has_lapsed() {
        let (tx, bus, handle) = spawn_matcher();

        tx.send(Command::UserConnected(session(50, 0))).await.unwrap();
        let mut short_lived = bid(100, 0);
        short_lived.expiry = 5_000;
        tx.send(Command::BidCreated(short_lived)).await.unwrap();
        tx.send(Command::Tick { now: 0 }).await.unwrap();
        tx.send(Command::Sweep { now: 10_000 }).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let appended = bus.appended.lock().unwrap();
        let ended = appended.iter().find_map(|(stream, event)| {
            if *stream == MATCHES_UPDATES {
                if let Event::MatchEnded(m) = event {
                    return Some(m.clone());
                }
            }
            None
        });
        let m = ended.expect("match should have ended via sweep");
        assert_eq!(m.status, MatchStatus::Completed);
        assert_eq!(m.end_reason, Some(EndReason::BidExpired));
        drop(appended);

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn disconnect_ends_active_match_as_cancelled() {
        let (tx, bus, handle) = spawn_matcher();

        let s = session(50, 0);
        let session_id = s.id;
        tx.send(Command::UserConnected(s)).await.unwrap();
        tx.send(Command::BidCreated(bid(100, 0))).await.unwrap();
        tx.send(Command::Tick { now: 0 }).await.unwrap();
        tx.send(Command::UserDisconnected { session_id }).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let appended = bus.appended.lock().unwrap();
        assert!(appended.iter().any(|(stream, _)| *stream == MATCHES_UPDATES));
        drop(appended);

        drop(tx);
        handle.await.unwrap();
    }
}
