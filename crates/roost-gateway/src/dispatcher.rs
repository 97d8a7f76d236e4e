use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use roost_chat::publisher::EventPublisher;
use roost_types::UserId;
use roost_types::events::{Channel, ChatEvent};

/// An event paired with its routing channel, as delivered to clients.
/// Connection handlers drop envelopes for conversation channels their
/// user is not a participant of.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub channel: Channel,
    pub event: ChatEvent,
}

/// Manages connected clients and delivers events. Targeted events go
/// over a per-user channel; everything else goes over the shared
/// broadcast. Maps use sync locks so the engine can publish without an
/// async context; nothing is held across an await.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    broadcast_tx: broadcast::Sender<Envelope>,

    /// user_id -> (conn_id, sender). A reconnect replaces the entry;
    /// the stale connection's conn_id no longer matches, so its
    /// cleanup touches nothing.
    user_channels: RwLock<HashMap<UserId, (Uuid, mpsc::UnboundedSender<Envelope>)>>,

    online_users: RwLock<HashMap<UserId, String>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(Inner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
                online_users: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inner.broadcast_tx.subscribe()
    }

    pub fn broadcast(&self, channel: Channel, event: ChatEvent) {
        // Send only fails with zero subscribers, which is fine.
        let _ = self.inner.broadcast_tx.send(Envelope { channel, event });
    }

    /// Open the targeted channel for a user. Returns the connection id
    /// that owns the channel plus the receiving end.
    pub fn register(&self, user_id: UserId) -> (Uuid, mpsc::UnboundedReceiver<Envelope>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, (conn_id, tx));
        debug!(user_id, %conn_id, "gateway connection registered");
        (conn_id, rx)
    }

    /// Drop the targeted channel, but only if `conn_id` still owns it.
    pub fn unregister(&self, user_id: UserId, conn_id: Uuid) {
        let mut channels = self
            .inner
            .user_channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if channels.get(&user_id).is_some_and(|(cid, _)| *cid == conn_id) {
            channels.remove(&user_id);
            debug!(user_id, %conn_id, "gateway connection unregistered");
        }
    }

    pub fn send_to_user(&self, user_id: UserId, event: ChatEvent) {
        let channels = self
            .inner
            .user_channels
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(Envelope {
                channel: Channel::User(user_id),
                event,
            });
        }
    }

    /// Mark a user online and announce it on the presence channel.
    pub fn user_online(&self, user_id: UserId, name: String) {
        self.inner
            .online_users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(user_id, name);
        self.broadcast(
            Channel::Presence,
            ChatEvent::Presence {
                user_id,
                online: true,
            },
        );
    }

    /// Mark a user offline, but only if `conn_id` still owns their
    /// channel; a reconnect must not be flickered offline by the old
    /// connection's teardown.
    pub fn user_offline(&self, user_id: UserId, conn_id: Uuid) {
        let is_current = self
            .inner
            .user_channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .is_some_and(|(cid, _)| *cid == conn_id);
        if !is_current {
            return;
        }

        self.inner
            .online_users
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user_id);
        self.unregister(user_id, conn_id);
        self.broadcast(
            Channel::Presence,
            ChatEvent::Presence {
                user_id,
                online: false,
            },
        );
    }

    pub fn online_users(&self) -> Vec<(UserId, String)> {
        self.inner
            .online_users
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventPublisher for Dispatcher {
    fn publish(&self, channel: Channel, event: &ChatEvent) {
        match channel {
            Channel::User(user_id) => self.send_to_user(user_id, event.clone()),
            _ => self.broadcast(channel, event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn targeted_events_reach_only_their_user() {
        let dispatcher = Dispatcher::new();
        let (_, mut alice_rx) = dispatcher.register(1);
        let (_, mut bob_rx) = dispatcher.register(2);

        let event = ChatEvent::DeletedForMe {
            conversation_id: 10,
            message_id: 5,
            user_id: 1,
        };
        dispatcher.publish(Channel::User(1), &event);

        let envelope = alice_rx.recv().await.unwrap();
        assert_eq!(envelope.channel, Channel::User(1));
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn conversation_events_go_over_the_broadcast() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        let event = ChatEvent::Delivered {
            conversation_id: 3,
            user_id: 7,
        };
        dispatcher.publish(Channel::Conversation(3), &event);

        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.channel, Channel::Conversation(3));
    }

    #[tokio::test]
    async fn stale_connections_cannot_knock_a_reconnect_offline() {
        let dispatcher = Dispatcher::new();
        let mut presence_rx = dispatcher.subscribe();

        let (old_conn, _old_rx) = dispatcher.register(1);
        dispatcher.user_online(1, "alice".into());
        let _ = presence_rx.recv().await.unwrap();

        // Reconnect takes over the channel; the old teardown is a no-op.
        let (_new_conn, _new_rx) = dispatcher.register(1);
        dispatcher.user_offline(1, old_conn);

        assert_eq!(dispatcher.online_users().len(), 1);
        assert!(presence_rx.try_recv().is_err());
    }
}
