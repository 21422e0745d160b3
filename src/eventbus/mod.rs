//! Event bus — the core's only view of the outside world (§6).
//!
//! The core depends on three capabilities: append, create-consumer-group-
//! if-missing, and blocking-read-with-ack/pending-range. `EventBus` is a
//! trait so the matching core can be driven in tests against an in-memory
//! fake with no Redis process involved (§8 Test tooling); the real
//! implementation realizes it over Redis Streams.

use std::future::Future;

pub mod event;
pub mod redis_streams;
pub mod streams;

#[cfg(test)]
pub mod fake;

pub use event::Event;

/// One message read off a stream, not yet acknowledged.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: String,
    pub event: Event,
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("event-bus transport error: {0}")]
    Transport(String),

    #[error("event serialization error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Implementations are driven generically (no trait objects): the matcher
/// and ingress tasks are generic over `B: EventBus`, so the real Redis
/// Streams client and the in-memory test fake share call sites without
/// needing `async-trait` boxing anywhere in the corpus's style.
///
/// Each method spells its return type as `impl Future<...> + Send` rather
/// than `async fn`: a generic `B: EventBus` erases the concrete future, and
/// without the explicit bound that opaque future loses the auto-trait
/// leakage a concrete impl gets for free, so holding it across an `.await`
/// inside a `tokio::spawn`ed generic task (the matcher loop, the ingress
/// consumers) fails to compile. Implementations still write plain `async
/// fn` bodies; the bound is checked at the (concrete, non-generic) impl.
pub trait EventBus: Send + Sync {
    /// Append an event to `stream`, returning the bus-assigned id.
    fn append(&self, stream: &str, event: &Event) -> impl Future<Output = Result<String, EventBusError>> + Send;

    /// Create `group` on `stream` starting from `start_id` if it does not
    /// already exist. Idempotent.
    fn ensure_group(
        &self,
        stream: &str,
        group: &str,
        start_id: &str,
    ) -> impl Future<Output = Result<(), EventBusError>> + Send;

    /// Block for up to `block_ms` for at most `count` new messages for
    /// `consumer` in `group` on `stream`. May return an empty vec.
    fn read(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block_ms: u64,
        count: usize,
    ) -> impl Future<Output = Result<Vec<Message>, EventBusError>> + Send;

    /// Acknowledge a processed message, removing it from the pending list.
    fn ack(&self, stream: &str, group: &str, id: &str) -> impl Future<Output = Result<(), EventBusError>> + Send;

    /// Fetch this consumer's currently pending (unacked) messages, for
    /// replay on startup.
    fn pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> impl Future<Output = Result<Vec<Message>, EventBusError>> + Send;
}
