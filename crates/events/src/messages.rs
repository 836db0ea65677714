use chrono::{DateTime, Utc};
use core_types::{BotLifecycle, CloseReason, Order, Regime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A Bot transitioned between lifecycle states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotStateChanged {
    pub bot_name: String,
    pub previous: BotLifecycle,
    pub current: BotLifecycle,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

/// An order was submitted to the adapter (acceptance, not fill).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order: Order,
    pub at: DateTime<Utc>,
}

/// An order filled (fully or partially).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderFilled {
    pub order: Order,
    pub fill_amount: Decimal,
    pub fill_price: Decimal,
    pub at: DateTime<Utc>,
}

/// An order was cancelled, either by the bot or by the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order: Order,
    pub at: DateTime<Utc>,
}

/// An order attempt failed at the adapter boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderError {
    pub bot_name: String,
    pub symbol: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// A strategy produced a Signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalGenerated {
    pub bot_name: String,
    pub signal_id: Uuid,
    pub at: DateTime<Utc>,
}

/// A Signal was rejected, by the risk gate or the staleness gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRejected {
    pub bot_name: String,
    pub signal_id: Uuid,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// A Deal was opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealOpened {
    pub bot_name: String,
    pub deal_id: Uuid,
    pub entry_price: Decimal,
    pub amount: Decimal,
    pub at: DateTime<Utc>,
}

/// A Deal closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealClosed {
    pub bot_name: String,
    pub deal_id: Uuid,
    pub reason: CloseReason,
    pub realized_pnl: Decimal,
    pub at: DateTime<Utc>,
}

/// The Market Regime Detector re-classified a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeChanged {
    pub symbol: String,
    pub previous: Regime,
    pub current: Regime,
    pub confidence: Decimal,
    pub at: DateTime<Utc>,
}

/// The Risk Manager or Capital Manager halted trading for a bot or globally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyStop {
    pub bot_name: Option<String>,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// The Capital Manager advanced a bot from one allocation phase to the next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseAdvanced {
    pub bot_name: String,
    pub previous_phase: u32,
    pub current_phase: u32,
    pub allocated_capital: Decimal,
    pub at: DateTime<Utc>,
}

/// The top-level event envelope published on the bus. Every variant carries
/// its own `at` timestamp; the tag makes downstream consumers (logging,
/// state store, external subscribers) exhaustive-match without guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    BotStateChanged(BotStateChanged),
    OrderPlaced(OrderPlaced),
    OrderFilled(OrderFilled),
    OrderCancelled(OrderCancelled),
    OrderError(OrderError),
    SignalGenerated(SignalGenerated),
    SignalRejected(SignalRejected),
    DealOpened(DealOpened),
    DealClosed(DealClosed),
    RegimeChanged(RegimeChanged),
    EmergencyStop(EmergencyStop),
    PhaseAdvanced(PhaseAdvanced),
}
