pub mod capital_manager;
pub mod error;
pub mod simple_manager;

pub use capital_manager::CapitalManager;
pub use error::RiskError;
pub use simple_manager::SimpleRiskManager;

use core_types::Signal;
use rust_decimal::Decimal;

/// The result of a portfolio-level risk check, independent of any single
/// trade's sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskDecision {
    Continue,
    Halt(String),
}

/// The Risk Manager gate every Signal passes through before it becomes an
/// order. A strategy proposes; the Risk Manager sizes and may veto.
pub trait RiskManager: Send + Sync {
    /// Sizes a trade for `signal` given current `equity` and the number of
    /// Deals already open across the portfolio. Returns the base-currency
    /// amount to trade, or a `RiskError` if the trade must not be taken.
    fn check_trade(
        &self,
        signal: &Signal,
        equity: Decimal,
        open_deals: u32,
    ) -> Result<Decimal, RiskError>;

    /// Evaluates the portfolio's rolling daily performance against the
    /// configured drawdown ceiling. Called once per orchestrator tick
    /// independent of any particular signal.
    fn evaluate_portfolio(&self) -> RiskDecision;

    /// Records a closed trade's realized P&L against the rolling daily
    /// drawdown tracker.
    fn record_fill(&mut self, realized_pnl: Decimal, equity_after: Decimal);

    /// Resets the rolling daily drawdown window. Called by the orchestrator
    /// at each UTC day boundary.
    fn reset_daily(&mut self);
}
