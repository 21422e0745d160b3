//! IngressHandlers — event routing from inbound streams into the Matcher
//! actor (§4.5).
//!
//! One task per inbound stream, each running a consumer-group loop:
//! replay this consumer's pending messages first (crash recovery), then
//! block-read new ones. A message is acknowledged only after its handler
//! returns without error (§4.5 Acknowledgement discipline); validation
//! errors are logged and the message dropped-but-acked so a single bad
//! payload can never wedge the stream (§7 Taxonomy (i)).

pub mod bids;
pub mod engagement;
pub mod errors;
pub mod users;

use tracing::{error, info, warn};

use crate::eventbus::{EventBus, Message};

/// What became of one dispatched message (§7 Taxonomy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Applied to the core (or a rule rejection — still a success from the
    /// transport's point of view). Acknowledge.
    Applied,
    /// Malformed payload, logged and discarded. Acknowledge anyway so a
    /// single bad message can never wedge the stream.
    Dropped,
    /// A handler-side failure (e.g. the matcher channel is closed).
    /// Leave unacknowledged for redelivery on the next pending-sweep.
    Failed,
}

/// Replay any pending messages left over from a previous run of this
/// consumer, then block-read new ones forever. `handle` does the
/// stream-specific parse/validate/dispatch.
pub async fn consume_loop<B, F>(
    event_bus: &B,
    stream: &str,
    group: &str,
    consumer: &str,
    block_ms: u64,
    batch_size: usize,
    mut handle: F,
) where
    B: EventBus,
    F: FnMut(&Message) -> Outcome,
{
    if let Err(e) = event_bus.ensure_group(stream, group, "0").await {
        error!(stream, error = %e, "failed to ensure consumer group, aborting ingress task");
        return;
    }

    match event_bus.pending(stream, group, consumer, batch_size).await {
        Ok(pending) if !pending.is_empty() => {
            info!(stream, count = pending.len(), "replaying pending messages");
            for message in &pending {
                dispatch_and_ack(event_bus, stream, group, message, &mut handle).await;
            }
        }
        Ok(_) => {}
        Err(e) => warn!(stream, error = %e, "failed to fetch pending messages"),
    }

    loop {
        match event_bus.read(stream, group, consumer, block_ms, batch_size).await {
            Ok(messages) => {
                for message in &messages {
                    dispatch_and_ack(event_bus, stream, group, message, &mut handle).await;
                }
            }
            Err(e) => {
                warn!(stream, error = %e, "transient event-bus read failure, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
        }
    }
}

async fn dispatch_and_ack<B, F>(event_bus: &B, stream: &str, group: &str, message: &Message, handle: &mut F)
where
    B: EventBus,
    F: FnMut(&Message) -> Outcome,
{
    crate::metrics::record_event_consumed(stream);
    match handle(message) {
        Outcome::Applied => {
            if let Err(e) = event_bus.ack(stream, group, &message.id).await {
                warn!(stream, id = %message.id, error = %e, "failed to acknowledge message");
            }
        }
        Outcome::Dropped => {
            crate::metrics::record_event_dropped(stream);
            if let Err(e) = event_bus.ack(stream, group, &message.id).await {
                warn!(stream, id = %message.id, error = %e, "failed to acknowledge dropped message");
            }
        }
        Outcome::Failed => {
            warn!(stream, id = %message.id, "handler failure, leaving message pending for redelivery");
        }
    }
}
