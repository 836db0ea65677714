use serde::{Deserialize, Serialize};

/// The side of an order or a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

/// The engine's normalized order status. Exchange-native status strings are
/// translated into this set at the adapter boundary and never cross it —
/// this type is the only status representation the core ever inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Open,
    PartiallyFilled,
    Closed,
    Cancelled,
    Rejected,
    Error,
}

impl OrderStatus {
    /// A terminal status never transitions out (see core-types invariants).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Closed | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// The role an order plays within a strategy's local bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderRole {
    BaseOrder,
    SafetyOrder(u32),
    GridBuy(usize),
    GridSell(usize),
    TakeProfit,
    StopLoss,
    TrailingExit,
    PartialClose,
}

/// A Bot's lifecycle. `Error` is reachable from any state and is terminal
/// without human/control intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BotLifecycle {
    Initializing,
    Running,
    Paused,
    Stopped,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    Grid,
    Dca,
    TrendFollower,
    Smc,
    Hybrid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketKind {
    Spot,
    Linear,
}

/// The direction of a Deal/position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn from_order_side(side: OrderSide) -> Self {
        match side {
            OrderSide::Buy => Direction::Long,
            OrderSide::Sell => Direction::Short,
        }
    }
}

/// A symbol's coarse market-state classification, re-derived every 60s by
/// the Market Regime Detector from the hourly indicator bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    TrendingUp,
    TrendingDown,
    Ranging,
    Volatile,
    Unknown,
}

/// Why a Deal or position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    Manual,
    GridCycle,
    EmergencyStop,
}

/// The distribution of grid levels between the lower and upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridDistribution {
    Arithmetic,
    Geometric,
}
