//! Pure trading logic for the four strategy engines and the shared Market
//! Regime Detector.
//!
//! This is a Layer 1 logic crate: it has no knowledge of databases, HTTP, or
//! execution, and depends only on `core-types` and `configuration`. Every
//! engine implements the `Strategy` trait and is strategy-agnostic from the
//! orchestrator's point of view.

pub mod dca;
pub mod error;
pub mod factory;
pub mod grid;
pub mod regime;
pub mod smc;
pub mod trend;

pub use dca::DcaEngine;
pub use error::StrategyError;
pub use factory::create_strategy;
pub use grid::GridEngine;
pub use regime::MarketRegimeDetector;
pub use smc::SmcEngine;
pub use trend::TrendFollowerEngine;

use core_types::{Deal, GridState, Kline, MarketSnapshot, Order, Signal, StrategyKind};
use uuid::Uuid;

/// What a strategy wants to happen, expressed without reference to the
/// exchange adapter or the state store. The Bot Orchestrator turns an
/// `Intent` into adapter calls and state-store writes.
#[derive(Debug, Clone)]
pub enum Intent {
    /// Place a new order exactly as described.
    PlaceOrder(Order),
    /// Cancel a previously-placed, still-open order.
    CancelOrder(Uuid),
    /// A directional Signal for the risk gate to size and approve.
    Propose(Signal),
    /// Nothing to do this tick.
    Noop,
}

/// The common interface every strategy engine implements.
///
/// `&mut self` because every engine carries internal state across ticks
/// (grid ladders, DCA averaging, trend indicator history, SMC zone cache).
pub trait Strategy: Send + Sync {
    /// Which strategy kind this instance implements. The orchestrator uses
    /// this to apply the regime filter and to route fills in a Hybrid bot.
    fn kind(&self) -> StrategyKind;

    /// Evaluates the strategy against the latest closed Kline and the
    /// current market snapshot, producing zero or more intents.
    fn evaluate(
        &mut self,
        snapshot: &MarketSnapshot,
        history: &[Kline],
    ) -> Result<Vec<Intent>, StrategyError>;

    /// Notifies the strategy that one of its own orders filled, so it can
    /// update internal bookkeeping (grid level occupancy, DCA safety-order
    /// count, Deal high-water mark) independent of the next `evaluate` call.
    ///
    /// Returns any follow-up intents the fill itself triggers — a grid
    /// counter-order re-arming the level that just filled, or the
    /// stop-loss/take-profit legs a base-order fill opens. Most fills
    /// produce none.
    fn on_order_filled(&mut self, order: &Order, fill_price: rust_decimal::Decimal) -> Vec<Intent>;

    /// The Deals this strategy currently tracks (open or just-closed), for
    /// checkpointing and trade-history persistence. Strategies with no
    /// notion of a Deal (Grid) leave this empty.
    fn deals_snapshot(&self) -> Vec<Deal> {
        Vec::new()
    }

    /// The Grid ladder's current state, for checkpointing. `None` for every
    /// strategy but Grid.
    fn grid_state(&self) -> Option<GridState> {
        None
    }
}
