//! In-process channel hub, used for tests and same-process embedding.

use super::{ChannelError, ChannelEvent, ChannelState, SyncChannel, session_topic};
use crate::event::ChangeEvent;
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Subscriber {
    id: u64,
    user_id: String,
    tx: Sender<ChannelEvent>,
}

#[derive(Default)]
struct HubInner {
    topics: HashMap<String, Vec<Subscriber>>,
    next_id: u64,
}

/// Topics keyed by session; clones share the same topics.
#[derive(Clone, Default)]
pub struct MemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `user_id` to a session.
    pub fn subscribe(&self, session_id: &str, user_id: &str) -> MemoryChannel {
        self.subscribe_inner(session_id, user_id, false)
    }

    /// Subscribe with a misbehaving transport that also echoes our own
    /// events back to us.
    pub fn subscribe_with_echo(&self, session_id: &str, user_id: &str) -> MemoryChannel {
        self.subscribe_inner(session_id, user_id, true)
    }

    /// Number of live subscribers on a session.
    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.lock()
            .topics
            .get(&session_topic(session_id))
            .map_or(0, Vec::len)
    }

    fn subscribe_inner(&self, session_id: &str, user_id: &str, echo: bool) -> MemoryChannel {
        let topic = session_topic(session_id);
        let (tx, rx) = channel();
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        let subscribers = inner.topics.entry(topic.clone()).or_default();
        for peer in subscribers.iter() {
            let _ = peer.tx.send(ChannelEvent::PeerJoined {
                user_id: user_id.to_string(),
            });
        }
        subscribers.push(Subscriber {
            id,
            user_id: user_id.to_string(),
            tx: tx.clone(),
        });
        let _ = tx.send(ChannelEvent::Connected {
            peer_count: subscribers.len(),
        });
        drop(inner);

        log::debug!("{} subscribed to {}", user_id, topic);
        MemoryChannel {
            hub: self.clone(),
            topic,
            subscriber_id: id,
            rx: Some(rx),
            state: ChannelState::Connected,
            echo,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, topic: &str, from: u64, event: ChannelEvent, echo: bool) {
        let inner = self.lock();
        let Some(subscribers) = inner.topics.get(topic) else {
            return;
        };
        for subscriber in subscribers {
            if subscriber.id != from || echo {
                let _ = subscriber.tx.send(event.clone());
            }
        }
    }

    fn remove(&self, topic: &str, id: u64) {
        let mut inner = self.lock();
        let Some(subscribers) = inner.topics.get_mut(topic) else {
            return;
        };
        let Some(pos) = subscribers.iter().position(|s| s.id == id) else {
            return;
        };
        let leaving = subscribers.remove(pos);
        for peer in subscribers.iter() {
            let _ = peer.tx.send(ChannelEvent::PeerLeft {
                user_id: leaving.user_id.clone(),
            });
        }
        if subscribers.is_empty() {
            inner.topics.remove(topic);
        }
    }
}

/// One subscription on a [`MemoryHub`].
pub struct MemoryChannel {
    hub: MemoryHub,
    topic: String,
    subscriber_id: u64,
    rx: Option<Receiver<ChannelEvent>>,
    state: ChannelState,
    echo: bool,
}

impl SyncChannel for MemoryChannel {
    fn publish(&mut self, event: &ChangeEvent) -> Result<(), ChannelError> {
        if self.state != ChannelState::Connected {
            return Err(ChannelError::NotConnected);
        }
        self.hub.deliver(
            &self.topic,
            self.subscriber_id,
            ChannelEvent::Change(event.clone()),
            self.echo,
        );
        Ok(())
    }

    fn poll(&mut self) -> Vec<ChannelEvent> {
        match &self.rx {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        }
    }

    fn unsubscribe(&mut self) {
        if self.rx.take().is_some() {
            self.hub.remove(&self.topic, self.subscriber_id);
            log::debug!("Unsubscribed from {}", self.topic);
        }
        self.state = ChannelState::Disconnected;
    }

    fn state(&self) -> ChannelState {
        self.state
    }
}

impl Drop for MemoryChannel {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
