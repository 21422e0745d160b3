//! Engagement stream handler — `engagement_update` (§4.5).

use tokio::sync::mpsc;

use crate::eventbus::event::{EngagementUpdatePayload, Event};
use crate::eventbus::streams::{consumer_name, CONSUMER_GROUP, ENGAGEMENT_EVENTS};
use crate::eventbus::{EventBus, Message};
use crate::services::matching::Command;

use super::errors::ValidationError;
use super::{consume_loop, Outcome};

fn validate(event: &Event) -> Result<&EngagementUpdatePayload, ValidationError> {
    let Event::EngagementUpdate(payload) = event else {
        return Err(ValidationError::UnexpectedEventType);
    };
    if !(0.0..=1.0).contains(&payload.attention) || !(0.0..=1.0).contains(&payload.liveness) {
        return Err(ValidationError::AttentionScoreOutOfRange);
    }
    Ok(payload)
}

pub async fn run<B: EventBus>(event_bus: B, tx: mpsc::Sender<Command>, consumer_suffix: &str) {
    let consumer = consumer_name(consumer_suffix);
    let tx = tx.clone();

    consume_loop(
        &event_bus,
        ENGAGEMENT_EVENTS,
        CONSUMER_GROUP,
        &consumer,
        5,
        64,
        move |message: &Message| dispatch(message, &tx),
    )
    .await;
}

fn dispatch(message: &Message, tx: &mpsc::Sender<Command>) -> Outcome {
    match validate(&message.event) {
        Ok(payload) => match tx.try_send(Command::Engagement(payload.clone())) {
            Ok(()) => Outcome::Applied,
            Err(_) => Outcome::Failed,
        },
        Err(e) => {
            tracing::warn!(id = %message.id, error = %e, "dropping invalid engagement_update event");
            Outcome::Dropped
        }
    }
}
