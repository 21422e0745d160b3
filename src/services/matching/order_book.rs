//! OrderBook — the priced bid queue (§4.1).
//!
//! Ordering is realized as an ordered map keyed by
//! `(Reverse(price), created_at, id)` rather than a binary heap: ascending
//! iteration of `Reverse(price)` gives price-descending, then
//! earliest-first, then id order, so the FIFO tie-break falls directly out
//! of key comparison instead of bespoke heap-restoration logic. A side
//! `HashMap<Uuid, BidKey>` gives O(log n) `remove_by_id` by reconstructing
//! the key and removing it from the map.
//!
//! This type is not thread-safe by design: it is owned outright by the
//! single matcher actor task (§5) and is never shared behind a lock.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::models::{Bid, BidStatus, TimestampMs};

use super::errors::BookError;

type BidKey = (Reverse<u64>, TimestampMs, Uuid);

fn key_for(bid: &Bid) -> BidKey {
    (Reverse(bid.max_price_per_second), bid.created_at, bid.id)
}

#[derive(Debug, Default)]
pub struct OrderBook {
    ordered: BTreeMap<BidKey, Bid>,
    index: HashMap<Uuid, BidKey>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.ordered.len()
    }

    /// Admit a `Pending` bid with an id not already present. Programmer
    /// error otherwise — fail fast (§4.1 Failure modes).
    pub fn add(&mut self, bid: Bid) -> Result<(), BookError> {
        if self.index.contains_key(&bid.id) {
            return Err(BookError::DuplicateBid(bid.id));
        }
        if bid.status != BidStatus::Pending {
            return Err(BookError::NotPending(bid.id, bid.status.to_string()));
        }
        let key = key_for(&bid);
        self.index.insert(bid.id, key);
        self.ordered.insert(key, bid);
        Ok(())
    }

    /// The highest-priority bid without removing it.
    pub fn peek_top(&self) -> Option<&Bid> {
        self.ordered.values().next()
    }

    /// Remove and return the highest-priority bid.
    pub fn pop_top(&mut self) -> Option<Bid> {
        let key = *self.ordered.keys().next()?;
        let bid = self.ordered.remove(&key)?;
        self.index.remove(&bid.id);
        Some(bid)
    }

    pub fn get_by_id(&self, id: Uuid) -> Option<&Bid> {
        let key = self.index.get(&id)?;
        self.ordered.get(key)
    }

    /// Remove a bid by id, wherever it sits in the ordering.
    pub fn remove_by_id(&mut self, id: Uuid) -> Option<Bid> {
        let key = self.index.remove(&id)?;
        self.ordered.remove(&key)
    }

    /// Mutate a bid's status in place without moving it out of the book.
    /// Callers are expected to immediately remove bids that leave the
    /// `Pending` state via `remove_by_id` / `pop_top`.
    pub fn update_status(&mut self, id: Uuid, status: BidStatus) -> Result<(), BookError> {
        let key = *self.index.get(&id).ok_or(BookError::UnknownBid(id))?;
        let bid = self.ordered.get_mut(&key).ok_or(BookError::UnknownBid(id))?;
        bid.status = status;
        Ok(())
    }

    /// Remove every bid with `expiry <= now`. Returns the count removed.
    pub fn prune_expired(&mut self, now: TimestampMs) -> usize {
        let expired: Vec<Uuid> = self
            .ordered
            .values()
            .filter(|b| b.is_expired(now))
            .map(|b| b.id)
            .collect();
        for id in &expired {
            self.remove_by_id(*id);
        }
        expired.len()
    }

    /// All bids with price strictly above `p`, highest first. Used for
    /// diagnostics/snapshots only — not on the hot match path.
    pub fn snapshot_above_price(&self, p: u64) -> Vec<&Bid> {
        self.ordered
            .iter()
            .take_while(|((Reverse(price), _, _), _)| *price > p)
            .map(|(_, bid)| bid)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(price: u64, created_at: TimestampMs) -> Bid {
        Bid {
            id: Uuid::new_v4(),
            agent_identity: "agent".to_string(),
            max_price_per_second: price,
            required_attention_score: 0.3,
            min_attention_seconds: 5,
            created_at,
            expiry: created_at + 60_000,
            status: BidStatus::Pending,
        }
    }

    #[test]
    fn higher_price_pops_first() {
        let mut book = OrderBook::new();
        book.add(bid(50, 0)).unwrap();
        book.add(bid(100, 1)).unwrap();
        book.add(bid(75, 2)).unwrap();

        assert_eq!(book.pop_top().unwrap().max_price_per_second, 100);
        assert_eq!(book.pop_top().unwrap().max_price_per_second, 75);
        assert_eq!(book.pop_top().unwrap().max_price_per_second, 50);
        assert!(book.pop_top().is_none());
    }

    #[test]
    fn equal_price_is_fifo_by_created_at() {
        let mut book = OrderBook::new();
        let early = bid(100, 10);
        let late = bid(100, 20);
        let early_id = early.id;
        let late_id = late.id;

        // Insert the later one first to prove ordering isn't insertion order.
        book.add(late).unwrap();
        book.add(early).unwrap();

        assert_eq!(book.pop_top().unwrap().id, early_id);
        assert_eq!(book.pop_top().unwrap().id, late_id);
    }

    #[test]
    fn add_rejects_duplicate_id_and_non_pending() {
        let mut book = OrderBook::new();
        let mut b = bid(100, 0);
        book.add(b.clone()).unwrap();
        assert!(matches!(book.add(b.clone()), Err(BookError::DuplicateBid(_))));

        b.id = Uuid::new_v4();
        b.status = BidStatus::Cancelled;
        assert!(matches!(book.add(b), Err(BookError::NotPending(_, _))));
    }

    #[test]
    fn remove_by_id_from_non_root_position_preserves_remaining_order() {
        let mut book = OrderBook::new();
        book.add(bid(100, 0)).unwrap();
        let middle = bid(80, 1);
        let middle_id = middle.id;
        book.add(middle).unwrap();
        book.add(bid(60, 2)).unwrap();

        assert!(book.remove_by_id(middle_id).is_some());
        assert_eq!(book.size(), 2);
        assert_eq!(book.pop_top().unwrap().max_price_per_second, 100);
        assert_eq!(book.pop_top().unwrap().max_price_per_second, 60);
    }

    #[test]
    fn update_status_mutates_in_place_without_moving_the_bid() {
        let mut book = OrderBook::new();
        let b = bid(100, 0);
        let id = b.id;
        book.add(b).unwrap();

        book.update_status(id, BidStatus::Matched).unwrap();
        assert_eq!(book.get_by_id(id).unwrap().status, BidStatus::Matched);
        assert_eq!(book.size(), 1);

        assert!(matches!(
            book.update_status(Uuid::new_v4(), BidStatus::Matched),
            Err(BookError::UnknownBid(_))
        ));
    }

    #[test]
    fn snapshot_above_price_returns_highest_first_above_threshold() {
        let mut book = OrderBook::new();
        book.add(bid(50, 0)).unwrap();
        book.add(bid(100, 1)).unwrap();
        book.add(bid(75, 2)).unwrap();

        let above = book.snapshot_above_price(60);
        assert_eq!(above.len(), 2);
        assert_eq!(above[0].max_price_per_second, 100);
        assert_eq!(above[1].max_price_per_second, 75);

        assert!(book.snapshot_above_price(1_000).is_empty());
    }

    #[test]
    fn prune_expired_removes_only_expired_bids() {
        let mut book = OrderBook::new();
        let mut expired = bid(100, 0);
        expired.expiry = 500;
        book.add(expired).unwrap();
        book.add(bid(50, 0)).unwrap();

        let removed = book.prune_expired(1_000);
        assert_eq!(removed, 1);
        assert_eq!(book.size(), 1);
        assert_eq!(book.peek_top().unwrap().max_price_per_second, 50);
    }
}
