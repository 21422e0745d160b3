//! Bids stream handler — `bid_created` / `bid_cancelled` (§4.5).

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::eventbus::event::Event;
use crate::eventbus::streams::{consumer_name, BIDS_INCOMING, CONSUMER_GROUP};
use crate::eventbus::{EventBus, Message};
use crate::models::{Bid, BidStatus, TimestampMs};
use crate::services::matching::Command;

use super::errors::ValidationError;
use super::{consume_loop, Outcome};

const DEFAULT_EXPIRY_SECONDS: u64 = 60;
const DEFAULT_MIN_ATTENTION_SECONDS: u64 = 5;

fn validate_and_build(event: &Event, now: TimestampMs) -> Result<Bid, ValidationError> {
    let Event::BidCreated(payload) = event else {
        return Err(ValidationError::UnexpectedEventType);
    };

    if payload.agent_identity.trim().is_empty() {
        return Err(ValidationError::EmptyAgentIdentity);
    }
    if payload.max_price_per_second == 0 {
        return Err(ValidationError::NonPositivePrice);
    }
    if !(0.0..=1.0).contains(&payload.required_attention_score) {
        return Err(ValidationError::AttentionScoreOutOfRange);
    }

    let expiry_seconds = payload.expiry_seconds.unwrap_or(DEFAULT_EXPIRY_SECONDS);
    let expiry = now + (expiry_seconds as i64) * 1000;
    if expiry <= now {
        return Err(ValidationError::ExpiryNotInFuture);
    }

    Ok(Bid {
        id: payload.bid_id.unwrap_or_else(Uuid::new_v4),
        agent_identity: payload.agent_identity.clone(),
        max_price_per_second: payload.max_price_per_second,
        required_attention_score: payload.required_attention_score,
        min_attention_seconds: payload
            .min_attention_seconds
            .unwrap_or(DEFAULT_MIN_ATTENTION_SECONDS),
        created_at: now,
        expiry,
        status: BidStatus::Pending,
    })
}

pub async fn run<B: EventBus>(event_bus: B, tx: mpsc::Sender<Command>, consumer_suffix: &str) {
    let consumer = consumer_name(consumer_suffix);
    let tx = tx.clone();

    consume_loop(
        &event_bus,
        BIDS_INCOMING,
        CONSUMER_GROUP,
        &consumer,
        5,
        64,
        move |message: &Message| dispatch(message, &tx),
    )
    .await;
}

fn dispatch(message: &Message, tx: &mpsc::Sender<Command>) -> Outcome {
    match &message.event {
        Event::BidCreated(_) => {
            let now = chrono::Utc::now().timestamp_millis();
            match validate_and_build(&message.event, now) {
                Ok(bid) => match tx.try_send(Command::BidCreated(bid)) {
                    Ok(()) => Outcome::Applied,
                    Err(_) => Outcome::Failed,
                },
                Err(e) => {
                    tracing::warn!(id = %message.id, error = %e, "dropping invalid bid_created event");
                    Outcome::Dropped
                }
            }
        }
        Event::BidCancelled(payload) => match tx.try_send(Command::BidCancelled { bid_id: payload.bid_id }) {
            Ok(()) => Outcome::Applied,
            Err(_) => Outcome::Failed,
        },
        _ => Outcome::Dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventbus::event::BidCreatedPayload;

    #[test]
    fn rejects_non_positive_price() {
        let event = Event::BidCreated(BidCreatedPayload {
            bid_id: None,
            agent_identity: "agent".to_string(),
            max_price_per_second: 0,
            required_attention_score: 0.5,
            min_attention_seconds: None,
            expiry_seconds: None,
        });
        assert!(matches!(
            validate_and_build(&event, 0),
            Err(ValidationError::NonPositivePrice)
        ));
    }

    #[test]
    fn rejects_attention_score_out_of_range() {
        let event = Event::BidCreated(BidCreatedPayload {
            bid_id: None,
            agent_identity: "agent".to_string(),
            max_price_per_second: 10,
            required_attention_score: 1.5,
            min_attention_seconds: None,
            expiry_seconds: None,
        });
        assert!(matches!(
            validate_and_build(&event, 0),
            Err(ValidationError::AttentionScoreOutOfRange)
        ));
    }

    #[test]
    fn defaults_min_attention_seconds_and_expiry() {
        let event = Event::BidCreated(BidCreatedPayload {
            bid_id: None,
            agent_identity: "agent".to_string(),
            max_price_per_second: 10,
            required_attention_score: 0.5,
            min_attention_seconds: None,
            expiry_seconds: None,
        });
        let bid = validate_and_build(&event, 1_000).unwrap();
        assert_eq!(bid.min_attention_seconds, DEFAULT_MIN_ATTENTION_SECONDS);
        assert_eq!(bid.expiry, 1_000 + (DEFAULT_EXPIRY_SECONDS as i64) * 1000);
    }
}
