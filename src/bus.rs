use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

/// What a subscriber gets out of a bounded-wait read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    /// A serialized event published after this subscriber registered.
    Event(String),
    /// Nothing arrived within the heartbeat interval.
    Heartbeat,
}

/// In-process fan-out for lifecycle notifications. No persistence, no
/// replay: subscribers only see events published after they register.
///
/// Publishing never blocks. Each subscriber has its own bounded inbox; a
/// subscriber that stops draining it is evicted instead of stalling the
/// publisher or its peers.
#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<DashMap<Uuid, mpsc::Sender<String>>>,
    inbox_size: usize,
}

impl EventBus {
    pub fn new(inbox_size: usize) -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            inbox_size: inbox_size.max(1),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inbox_size);
        let id = Uuid::new_v4();
        self.subscribers.insert(id, tx);

        Subscription {
            id,
            rx,
            subscribers: self.subscribers.clone(),
        }
    }

    /// Safe to call for an already-removed handle.
    pub fn unsubscribe(&self, id: Uuid) {
        self.subscribers.remove(&id);
    }

    /// Serializes once and delivers a copy to every registered subscriber.
    /// Returns how many inboxes accepted the event.
    pub fn publish(&self, event: &Value) -> usize {
        let data = event.to_string();
        let mut delivered = 0;
        let mut dead: Vec<Uuid> = Vec::new();

        for entry in self.subscribers.iter() {
            match entry.value().try_send(data.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => dead.push(*entry.key()),
            }
        }

        for id in dead {
            tracing::warn!(subscriber = %id, "dropping stalled event subscriber");
            self.subscribers.remove(&id);
        }

        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Reading half of a subscription. Dropping it deregisters the inbox, so
/// every exit path of a consumer releases its slot.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<String>,
    subscribers: Arc<DashMap<Uuid, mpsc::Sender<String>>>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Bounded-wait read: an event if one arrives within `heartbeat`, a
    /// heartbeat marker otherwise, `None` once the inbox is closed (bus
    /// evicted this subscriber).
    pub async fn next(&mut self, heartbeat: Duration) -> Option<BusMessage> {
        match timeout(heartbeat, self.rx.recv()).await {
            Ok(Some(data)) => Some(BusMessage::Event(data)),
            Ok(None) => None,
            Err(_) => Some(BusMessage::Heartbeat),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.remove(&self.id);
    }
}
