// src/events.rs

use tokio::sync::broadcast;
use tracing::debug;

/// Events published by the broker core. Consumers decide policy; the core
/// only reports what happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// A personal-token-bound generation call failed. A reassignment
    /// coordinator typically reacts by clearing the association and
    /// re-running the assigner.
    PersonalTokenFailed { user_id: String },
}

/// Broadcast-based publish/subscribe bus.
///
/// Publishing is fire-and-forget: zero subscribers is not an error, and a
/// slow subscriber only loses its own backlog.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: AppEvent) {
        let delivered = self.sender.send(event.clone()).unwrap_or(0);
        debug!(event = ?event, subscribers = delivered, "Event published");
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(32)
    }
}
