use crate::enums::{
    CloseReason, Direction, GridDistribution, MarketKind, OrderRole, OrderSide, OrderStatus,
    OrderType, Regime,
};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tradable instrument: identifier, market kind, and the exchange's
/// price/amount precision for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub market_kind: MarketKind,
    pub price_tick: Decimal,
    pub amount_step: Decimal,
    pub min_notional: Decimal,
}

impl Symbol {
    /// Rounds a price to this market's tick size, per the rounding direction
    /// required for `side` (sells round down, buys round up).
    pub fn round_price(&self, side: OrderSide, price: Decimal) -> Decimal {
        round_to_step(price, self.price_tick, side)
    }

    /// Rounds an amount to this market's step size, using the same
    /// directional rule as `round_price`.
    pub fn round_amount(&self, side: OrderSide, amount: Decimal) -> Decimal {
        round_to_step(amount, self.amount_step, side)
    }

    pub fn meets_min_notional(&self, price: Decimal, amount: Decimal) -> bool {
        price * amount >= self.min_notional
    }
}

fn round_to_step(value: Decimal, step: Decimal, side: OrderSide) -> Decimal {
    if step.is_zero() {
        return value;
    }
    let units = value / step;
    let rounded_units = match side {
        OrderSide::Sell => units.floor(),
        OrderSide::Buy => units.ceil(),
    };
    rounded_units * step
}

/// A single candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub close_time: DateTime<Utc>,
    pub interval: String,
}

/// The last-traded price and any cached OHLCV windows for a symbol.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub last_price: Decimal,
    pub last_update: Option<DateTime<Utc>>,
}

/// The Market Regime Detector's current classification for a symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RegimeState {
    pub regime: Regime,
    pub confidence: Decimal,
    pub computed_at: DateTime<Utc>,
}

impl Default for RegimeState {
    fn default() -> Self {
        Self {
            regime: Regime::Unknown,
            confidence: Decimal::ZERO,
            computed_at: DateTime::<Utc>::MIN_UTC,
        }
    }
}

/// A name used to resolve `(api_key, api_secret, endpoint_kind)` via the
/// external credential store. The core never holds raw secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRef {
    pub name: String,
}

/// A live or simulated order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub local_id: Uuid,
    pub exchange_id: Option<String>,
    pub bot_name: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub amount: Decimal,
    pub filled_amount: Decimal,
    pub status: OrderStatus,
    pub role: OrderRole,
    pub strategy_tag: Option<String>,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub filled_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(
        bot_name: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        order_type: OrderType,
        price: Option<Decimal>,
        amount: Decimal,
        role: OrderRole,
    ) -> Self {
        Self {
            local_id: Uuid::new_v4(),
            exchange_id: None,
            bot_name: bot_name.into(),
            symbol: symbol.into(),
            side,
            order_type,
            price,
            amount,
            filled_amount: Decimal::ZERO,
            status: OrderStatus::Pending,
            role,
            strategy_tag: None,
            created_at: Utc::now(),
            acknowledged_at: None,
            filled_at: None,
            cancelled_at: None,
        }
    }

    /// Applies a fill, enforcing `filled_amount <= amount`.
    pub fn apply_fill(&mut self, filled_amount: Decimal, at: DateTime<Utc>) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::InvariantViolation(format!(
                "order {} is already terminal ({:?}); cannot apply further fills",
                self.local_id, self.status
            )));
        }
        let new_total = self.filled_amount + filled_amount;
        if new_total > self.amount {
            return Err(CoreError::InvariantViolation(format!(
                "order {} filled_amount {} would exceed amount {}",
                self.local_id, new_total, self.amount
            )));
        }
        self.filled_amount = new_total;
        if self.filled_amount == self.amount {
            self.status = OrderStatus::Closed;
            self.filled_at = Some(at);
        } else {
            self.status = OrderStatus::PartiallyFilled;
        }
        Ok(())
    }

    /// Transitions to a new normalized status, refusing to leave a terminal
    /// status once reached.
    pub fn transition(&mut self, new_status: OrderStatus) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::InvariantViolation(format!(
                "order {} is terminal ({:?}); cannot transition to {:?}",
                self.local_id, self.status, new_status
            )));
        }
        if new_status == OrderStatus::Cancelled {
            self.cancelled_at = Some(Utc::now());
        }
        self.status = new_status;
        Ok(())
    }
}

/// An aggregate tying a sequence of same-side Orders to an averaged entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub bot_name: String,
    pub symbol: String,
    pub direction: Direction,
    pub base_amount: Decimal,
    pub quote_spent: Decimal,
    pub average_entry: Decimal,
    pub highest_price_since_entry: Decimal,
    pub trailing_activated: bool,
    pub active: bool,
    pub close_reason: Option<CloseReason>,
    pub realized_pnl: Decimal,
    pub safety_orders_filled: u32,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// A snapshot of the strategy configuration in effect when the Deal was
    /// opened, so later parameter changes don't retroactively alter an
    /// in-flight Deal's exit policy.
    pub config_snapshot: serde_json::Value,
}

impl Deal {
    pub fn open(
        bot_name: impl Into<String>,
        symbol: impl Into<String>,
        direction: Direction,
        entry_price: Decimal,
        entry_amount: Decimal,
        config_snapshot: serde_json::Value,
    ) -> Self {
        let quote_spent = entry_price * entry_amount;
        Self {
            id: Uuid::new_v4(),
            bot_name: bot_name.into(),
            symbol: symbol.into(),
            direction,
            base_amount: entry_amount,
            quote_spent,
            average_entry: entry_price,
            highest_price_since_entry: entry_price,
            trailing_activated: false,
            active: true,
            close_reason: None,
            realized_pnl: Decimal::ZERO,
            safety_orders_filled: 0,
            opened_at: Utc::now(),
            closed_at: None,
            config_snapshot,
        }
    }

    /// Applies a safety-order (or any averaging) fill: updates amounts and
    /// re-derives the average entry, but — per the invariant — never resets
    /// `highest_price_since_entry`.
    pub fn apply_fill(&mut self, fill_price: Decimal, fill_amount: Decimal) -> Result<(), CoreError> {
        if !self.active {
            return Err(CoreError::InvariantViolation(format!(
                "deal {} is not active; cannot apply a fill",
                self.id
            )));
        }
        self.base_amount += fill_amount;
        self.quote_spent += fill_price * fill_amount;
        if !self.base_amount.is_zero() {
            self.average_entry = self.quote_spent / self.base_amount;
        }
        self.safety_orders_filled += 1;
        Ok(())
    }

    /// Updates the high-water mark used for trailing-stop calculations.
    /// Monotonically non-decreasing for `Long`, non-increasing for `Short`.
    pub fn update_highest_price(&mut self, current_price: Decimal) {
        match self.direction {
            Direction::Long => {
                if current_price > self.highest_price_since_entry {
                    self.highest_price_since_entry = current_price;
                }
            }
            Direction::Short => {
                if current_price < self.highest_price_since_entry {
                    self.highest_price_since_entry = current_price;
                }
            }
        }
    }

    pub fn unrealized_pct(&self, current_price: Decimal) -> Decimal {
        if self.average_entry.is_zero() {
            return Decimal::ZERO;
        }
        match self.direction {
            Direction::Long => (current_price - self.average_entry) / self.average_entry,
            Direction::Short => (self.average_entry - current_price) / self.average_entry,
        }
    }

    pub fn close(&mut self, reason: CloseReason, realized_pnl: Decimal, at: DateTime<Utc>) {
        self.active = false;
        self.close_reason = Some(reason);
        self.realized_pnl = realized_pnl;
        self.closed_at = Some(at);
    }
}

/// One level of a grid's ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridLevel {
    pub index: usize,
    pub price: Decimal,
    pub side: OrderSide,
    pub active_order_id: Option<Uuid>,
}

/// A completed buy->sell (or sell->buy) pair at one grid level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cycle {
    pub id: Uuid,
    pub level_index: usize,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub amount: Decimal,
    pub fees: Decimal,
    pub realized_pnl: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

impl Cycle {
    /// realized profit = sell_price * amount - buy_price * amount - fees
    pub fn realized(
        level_index: usize,
        buy_price: Decimal,
        sell_price: Decimal,
        amount: Decimal,
        fees: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        let realized_pnl = sell_price * amount - buy_price * amount - fees;
        Self {
            id: Uuid::new_v4(),
            level_index,
            buy_price,
            sell_price,
            amount,
            fees,
            realized_pnl,
            opened_at,
            closed_at: Utc::now(),
        }
    }
}

/// The full state of a Grid engine instance for one bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridState {
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    pub distribution: GridDistribution,
    pub levels: Vec<GridLevel>,
    pub cycles: Vec<Cycle>,
}

/// A take-profit target with the fraction of the remaining position it
/// closes. Fractions across a Signal's `take_profits` must sum to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TakeProfitTarget {
    pub price: Decimal,
    pub close_fraction: Decimal,
}

/// Produced by a strategy's analysis step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profits: Vec<TakeProfitTarget>,
    pub confidence: Decimal,
    pub risk_reward: Decimal,
    pub generated_at: DateTime<Utc>,
    pub source_strategy: crate::enums::StrategyKind,
    /// How long after `generated_at` this signal remains eligible for
    /// execution at all (independent of the price-staleness gate).
    pub staleness_budget: chrono::Duration,
}

impl Signal {
    /// Zero-risk trades (stop-loss == entry) must be rejected by callers.
    pub fn is_zero_risk(&self) -> bool {
        self.stop_loss_price == self.entry_price
    }

    pub fn take_profit_fractions_sum_to_one(&self) -> bool {
        let sum: Decimal = self.take_profits.iter().map(|tp| tp.close_fraction).sum();
        (sum - dec!(1)).abs() <= dec!(0.0001)
    }

    /// The fractional deviation of `market_price` from this signal's entry
    /// price, used by the orchestrator's staleness gate (default 2%).
    pub fn price_deviation_pct(&self, market_price: Decimal) -> Decimal {
        if market_price.is_zero() {
            return Decimal::MAX;
        }
        ((self.entry_price - market_price) / market_price).abs()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.generated_at > self.staleness_budget
    }
}
