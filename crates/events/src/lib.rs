//! Event payloads and the publish/subscribe bus that carries them between
//! the Bot Orchestrator and any external consumer (logging, the state
//! store's audit trail, future control surfaces).
//!
//! As a Layer 0 crate, it depends only on `core-types` and provides the
//! definitive language for all cross-bot, cross-consumer notifications.

pub mod bus;
pub mod error;
pub mod messages;

pub use bus::EventBus;
pub use error::EventsError;
pub use messages::{
    BotStateChanged, DealClosed, DealOpened, EmergencyStop, EngineEvent, OrderCancelled,
    OrderError, OrderFilled, OrderPlaced, PhaseAdvanced, RegimeChanged, SignalGenerated,
    SignalRejected,
};
