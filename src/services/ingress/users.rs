//! Users stream handler — `user_connected` / `user_disconnected` (§4.5).

use tokio::sync::mpsc;

use crate::eventbus::event::Event;
use crate::eventbus::streams::{consumer_name, CONSUMER_GROUP, USERS_STATUS};
use crate::eventbus::{EventBus, Message};
use crate::models::{Session, SessionStatus};
use crate::services::matching::Command;

use super::errors::ValidationError;
use super::{consume_loop, Outcome};

fn validate_and_build(event: &Event, now: i64) -> Result<Session, ValidationError> {
    let Event::UserConnected(payload) = event else {
        return Err(ValidationError::UnexpectedEventType);
    };
    if payload.human_identity.trim().is_empty() {
        return Err(ValidationError::EmptyHumanIdentity);
    }

    Ok(Session {
        id: payload.session_id,
        human_identity: payload.human_identity.clone(),
        price_floor_per_second: payload.price_floor_per_second,
        last_engagement_score: 0.0,
        last_liveness_score: 1.0,
        last_heartbeat: now,
        connected_at: now,
        status: SessionStatus::Available,
        current_match_id: None,
    })
}

pub async fn run<B: EventBus>(event_bus: B, tx: mpsc::Sender<Command>, consumer_suffix: &str) {
    let consumer = consumer_name(consumer_suffix);
    let tx = tx.clone();

    consume_loop(
        &event_bus,
        USERS_STATUS,
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
        Event::UserConnected(_) => {
            let now = chrono::Utc::now().timestamp_millis();
            match validate_and_build(&message.event, now) {
                Ok(session) => match tx.try_send(Command::UserConnected(session)) {
                    Ok(()) => Outcome::Applied,
                    Err(_) => Outcome::Failed,
                },
                Err(e) => {
                    tracing::warn!(id = %message.id, error = %e, "dropping invalid user_connected event");
                    Outcome::Dropped
                }
            }
        }
        Event::UserDisconnected(payload) => {
            match tx.try_send(Command::UserDisconnected {
                session_id: payload.session_id,
            }) {
                Ok(()) => Outcome::Applied,
                Err(_) => Outcome::Failed,
            }
        }
        _ => Outcome::Dropped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventbus::event::UserConnectedPayload;
    use uuid::Uuid;

    #[test]
    fn rejects_empty_human_identity() {
        let event = Event::UserConnected(UserConnectedPayload {
            session_id: Uuid::new_v4(),
            human_identity: "  ".to_string(),
            price_floor_per_second: 10,
        });
        assert!(matches!(
            validate_and_build(&event, 0),
            Err(ValidationError::EmptyHumanIdentity)
        ));
    }

    #[test]
    fn builds_available_session_from_payload() {
        let session_id = Uuid::new_v4();
        let event = Event::UserConnected(UserConnectedPayload {
            session_id,
            human_identity: "human-1".to_string(),
            price_floor_per_second: 25,
        });
        let session = validate_and_build(&event, 500).unwrap();
        assert_eq!(session.id, session_id);
        assert_eq!(session.status, SessionStatus::Available);
        assert_eq!(session.connected_at, 500);
    }
}
