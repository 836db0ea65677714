use crate::messages::EngineEvent;
use tokio::sync::broadcast;

/// Default channel capacity: enough to absorb a burst across every
/// concurrently-running bot without a slow subscriber applying backpressure
/// to the orchestrators themselves.
const DEFAULT_CAPACITY: usize = 1024;

/// A `tokio::sync::broadcast`-backed publish/subscribe bus for `EngineEvent`s.
/// Cloning an `EventBus` shares the same underlying channel — every
/// orchestrator task holds a clone and publishes directly, without a central
/// relay task.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event. Per `tokio::sync::broadcast` semantics this never
    /// blocks and never fails for lack of subscribers — a bus with no
    /// listeners simply drops the event. Returns the number of subscribers
    /// that received it.
    pub fn publish(&self, event: EngineEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
