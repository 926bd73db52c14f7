use dashmap::DashMap;
use tokio::sync::broadcast;

/// What a display connection can learn about its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    TokenRotated { token: String },
    Closed,
}

/// One broadcast channel per session id.
///
/// Channels come into existence on first subscribe; a publish with no
/// channel (nobody listening) is dropped. Subscribers only ever see
/// publishes after their subscribe point, so a connecting display reads
/// the current token from the store itself before it starts listening.
pub struct TokenBus {
    channels: DashMap<String, broadcast::Sender<SessionEvent>>,
    capacity: usize,
}

impl TokenBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Fire-and-forget fan-out to every subscriber of this session.
    pub fn publish(&self, session_id: &str, event: SessionEvent) {
        if let Some(sender) = self.channels.get(session_id) {
            // All receivers may have dropped; the send error is not actionable.
            let _ = sender.send(event);
        }
    }

    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<SessionEvent> {
        let entry = self
            .channels
            .entry(session_id.to_string())
            .or_insert_with(|| {
                let (tx, _rx) = broadcast::channel(self.capacity);
                tx
            });
        entry.subscribe()
    }

    /// Tear down the channel for a closed session. Live receivers
    /// observe `RecvError::Closed` and end their streams.
    pub fn remove(&self, session_id: &str) {
        self.channels.remove(session_id);
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
