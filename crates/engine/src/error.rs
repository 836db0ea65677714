use thiserror::Error;

/// Errors raised by the Bot Orchestrator and the multi-bot supervisor. Every
/// lower-layer error type has a direct `#[from]` variant; nothing outside
/// this crate needs to inspect an adapter/state-store/strategy/risk error
/// directly, it just propagates through `EngineError`.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Adapter error: {0}")]
    Adapter(#[from] adapter::AdapterError),

    #[error("State store error: {0}")]
    StateStore(#[from] state_store::StateStoreError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Risk management error: {0}")]
    Risk(#[from] risk::RiskError),

    #[error("Core invariant error: {0}")]
    Core(#[from] core_types::CoreError),

    #[error("Bot '{0}' not found in the engine.")]
    BotNotFound(String),

    #[error("Serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}
