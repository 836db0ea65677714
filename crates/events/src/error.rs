use thiserror::Error;

#[derive(Error, Debug)]
pub enum EventsError {
    #[error("Failed to serialize event message: {0}")]
    Serialization(String),

    /// Raised when a publish is attempted on a bus with no subscribers left
    /// and the caller asked to be told. The broadcast channel itself does
    /// not treat this as an error, so callers opt in via `EventBus::publish`.
    #[error("no subscribers are currently listening on the event bus")]
    NoSubscribers,
}