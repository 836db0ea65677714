pub mod enums;
pub mod error;
pub mod structs;

pub use enums::{
    BotLifecycle, CloseReason, Direction, GridDistribution, MarketKind, OrderRole, OrderSide,
    OrderStatus, OrderType, Regime, StrategyKind,
};
pub use error::CoreError;
pub use structs::{
    CredentialRef, Cycle, Deal, GridLevel, GridState, Kline, MarketSnapshot, Order, RegimeState,
    Signal, Symbol, TakeProfitTarget,
};
