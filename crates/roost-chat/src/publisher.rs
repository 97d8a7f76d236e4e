use std::sync::Mutex;

use roost_types::events::{Channel, ChatEvent};

/// One event plus the channel it routes to. Mutations return lists of
/// these instead of publishing themselves, so the engine stays testable
/// without a live transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub channel: Channel,
    pub event: ChatEvent,
}

impl From<ChatEvent> for Outgoing {
    fn from(event: ChatEvent) -> Self {
        Self {
            channel: event.channel(),
            event,
        }
    }
}

/// Seam to the real-time transport. At-least-once delivery to currently
/// subscribed clients; no durability expected.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, channel: Channel, event: &ChatEvent);
}

/// Drops every event. For contexts with no transport attached.
#[derive(Debug, Default)]
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _channel: Channel, _event: &ChatEvent) {}
}

/// Captures published events in order; test support.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<Outgoing>>,
}

impl RecordingPublisher {
    pub fn take(&self) -> Vec<Outgoing> {
        std::mem::take(&mut self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn snapshot(&self) -> Vec<Outgoing> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl EventPublisher for RecordingPublisher {
    fn publish(&self, channel: Channel, event: &ChatEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Outgoing {
                channel,
                event: event.clone(),
            });
    }
}
