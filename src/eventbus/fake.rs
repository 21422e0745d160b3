//! An in-memory `EventBus` for matcher/ingress tests with no Redis process.

use std::collections::VecDeque;
use std::sync::Mutex;

use super::{Event, EventBus, EventBusError, Message};

#[derive(Debug, Default)]
struct Stream {
    next_id: u64,
    queued: VecDeque<Message>,
    pending: Vec<Message>,
}

/// A single-stream-per-key, ack-aware fake. Good enough to drive the
/// matcher and ingress handlers end-to-end without a live Redis server.
#[derive(Default)]
pub struct InMemoryEventBus {
    streams: Mutex<std::collections::HashMap<String, Stream>>,
    pub appended: Mutex<Vec<(String, Event)>>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventBus for InMemoryEventBus {
    async fn append(&self, stream: &str, event: &Event) -> Result<String, EventBusError> {
        self.appended
            .lock()
            .unwrap()
            .push((stream.to_string(), event.clone()));

        let mut streams = self.streams.lock().unwrap();
        let s = streams.entry(stream.to_string()).or_default();
        s.next_id += 1;
        let id = s.next_id.to_string();
        s.queued.push_back(Message {
            id: id.clone(),
            event: event.clone(),
        });
        Ok(id)
    }

    async fn ensure_group(&self, stream: &str, _group: &str, _start_id: &str) -> Result<(), EventBusError> {
        self.streams
            .lock()
            .unwrap()
            .entry(stream.to_string())
            .or_default();
        Ok(())
    }

    async fn read(
        &self,
        stream: &str,
        _group: &str,
        _consumer: &str,
        _block_ms: u64,
        count: usize,
    ) -> Result<Vec<Message>, EventBusError> {
        let mut streams = self.streams.lock().unwrap();
        let s = streams.entry(stream.to_string()).or_default();
        let mut out = Vec::new();
        while out.len() < count {
            match s.queued.pop_front() {
                Some(m) => {
                    s.pending.push(m.clone());
                    out.push(m);
                }
                None => break,
            }
        }
        Ok(out)
    }

    async fn ack(&self, stream: &str, _group: &str, id: &str) -> Result<(), EventBusError> {
        let mut streams = self.streams.lock().unwrap();
        if let Some(s) = streams.get_mut(stream) {
            s.pending.retain(|m| m.id != id);
        }
        Ok(())
    }

    async fn pending(
        &self,
        stream: &str,
        _group: &str,
        _consumer: &str,
        count: usize,
    ) -> Result<Vec<Message>, EventBusError> {
        let streams = self.streams.lock().unwrap();
        Ok(streams
            .get(stream)
            .map(|s| s.pending.iter().take(count).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventbus::event::BidCancelledPayload;
    use uuid::Uuid;

    #[tokio::test]
    async fn read_delivers_appended_events_and_tracks_pending_until_acked() {
        let bus = InMemoryEventBus::new();
        let event = Event::BidCancelled(BidCancelledPayload {
            bid_id: Uuid::new_v4(),
            agent_identity: "agent".to_string(),
        });
        let id = bus.append("s", &event).await.unwrap();

        let read = bus.read("s", "g", "c", 0, 10).await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(bus.pending("s", "g", "c", 10).await.unwrap().len(), 1);

        bus.ack("s", "g", &id).await.unwrap();
        assert_eq!(bus.pending("s", "g", "c", 10).await.unwrap().len(), 0);
    }
}
