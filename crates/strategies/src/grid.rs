use crate::error::StrategyError;
use crate::{Intent, Strategy};
use chrono::{DateTime, Utc};
use configuration::GridParams;
use core_types::{
    Cycle, GridDistribution, GridLevel, GridState, Kline, MarketSnapshot, Order, OrderRole,
    OrderSide, OrderType,
};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Generates the ladder of price levels between `lower` and `upper`.
///
/// Arithmetic spacing distributes levels at equal price distance; geometric
/// spacing distributes them at equal percentage distance, which keeps
/// per-level position sizing closer to uniform risk on volatile symbols.
pub fn generate_levels(
    lower: Decimal,
    upper: Decimal,
    count: u32,
    distribution: GridDistribution,
) -> Vec<Decimal> {
    if count < 2 || upper <= lower {
        return Vec::new();
    }
    let steps = Decimal::from(count - 1);
    let mut levels = Vec::with_capacity(count as usize);
    match distribution {
        GridDistribution::Arithmetic => {
            let step = (upper - lower) / steps;
            for i in 0..count {
                levels.push(lower + step * Decimal::from(i));
            }
        }
        GridDistribution::Geometric => {
            // ratio^steps = upper/lower => ratio = (upper/lower)^(1/steps)
            let ratio_f64 = (upper / lower)
                .to_string()
                .parse::<f64>()
                .unwrap_or(1.0)
                .powf(1.0 / steps.to_string().parse::<f64>().unwrap_or(1.0));
            let mut price = lower;
            levels.push(price);
            for _ in 1..count {
                price *= Decimal::from_str_exact(&ratio_f64.to_string()).unwrap_or(Decimal::ONE);
                levels.push(price);
            }
            if let Some(last) = levels.last_mut() {
                *last = upper;
            }
        }
    }
    levels
}

/// The Grid Engine: maintains a symmetric buy-low/sell-high ladder across a
/// fixed price range. Each level alternates between holding a resting buy
/// order (below the current price) and a resting sell order (above it); a
/// filled buy immediately re-arms a sell at the next level up, and vice
/// versa, which is what produces the grid's repeated buy/sell cycles.
pub struct GridEngine {
    bot_name: String,
    symbol: String,
    params: GridParams,
    state: GridState,
    initialized: bool,
    /// The side and price of the leg a level is currently waiting to close,
    /// keyed by level index. `None` until that level's first fill; cleared
    /// and re-set on every subsequent fill as the level oscillates.
    open_legs: HashMap<usize, (OrderSide, Decimal, DateTime<Utc>)>,
}

impl GridEngine {
    pub fn new(
        bot_name: impl Into<String>,
        symbol: impl Into<String>,
        params: GridParams,
    ) -> Result<Self, StrategyError> {
        let prices = generate_levels(
            params.lower_price,
            params.upper_price,
            params.grid_levels,
            params.distribution,
        );
        if prices.is_empty() {
            return Err(StrategyError::InvalidParameters(
                "grid produced no levels; check lower_price < upper_price and grid_levels >= 2"
                    .to_string(),
            ));
        }
        let levels = prices
            .into_iter()
            .enumerate()
            .map(|(index, price)| GridLevel {
                index,
                price,
                side: OrderSide::Buy,
                active_order_id: None,
            })
            .collect();
        Ok(Self {
            bot_name: bot_name.into(),
            symbol: symbol.into(),
            state: GridState {
                lower_price: params.lower_price,
                upper_price: params.upper_price,
                distribution: params.distribution,
                levels,
                cycles: Vec::new(),
            },
            params,
            initialized: false,
            open_legs: HashMap::new(),
        })
    }

    pub fn state(&self) -> &GridState {
        &self.state
    }

    /// Seeds resting buy orders below the current price and resting sell
    /// orders above it. Called once, on the bot's first tick.
    fn seed_orders(&self, current_price: Decimal) -> Vec<Intent> {
        self.state
            .levels
            .iter()
            .filter(|level| level.active_order_id.is_none())
            .map(|level| {
                let side = if level.price < current_price {
                    OrderSide::Buy
                } else {
                    OrderSide::Sell
                };
                let role = if side == OrderSide::Buy {
                    OrderRole::GridBuy(level.index)
                } else {
                    OrderRole::GridSell(level.index)
                };
                let amount = self.level_amount(current_price);
                Intent::PlaceOrder(Order::new(
                    self.bot_name.clone(),
                    self.symbol.clone(),
                    side,
                    OrderType::Limit,
                    Some(level.price),
                    amount,
                    role,
                ))
            })
            .collect()
    }

    fn level_amount(&self, current_price: Decimal) -> Decimal {
        // Equal quote-notional sizing: the take_profit_per_level_pct param
        // isn't used for sizing here, only for the re-arm price offset.
        let _ = current_price;
        Decimal::ONE
    }
}

impl Strategy for GridEngine {
    fn kind(&self) -> core_types::StrategyKind {
        core_types::StrategyKind::Grid
    }

    fn grid_state(&self) -> Option<GridState> {
        Some(self.state.clone())
    }

    fn evaluate(
        &mut self,
        snapshot: &MarketSnapshot,
        _history: &[Kline],
    ) -> Result<Vec<Intent>, StrategyError> {
        if snapshot.last_price.is_zero() {
            return Ok(vec![]);
        }
        if !self.initialized {
            self.initialized = true;
            return Ok(self.seed_orders(snapshot.last_price));
        }
        Ok(vec![])
    }

    fn on_order_filled(&mut self, order: &Order, fill_price: Decimal) -> Vec<Intent> {
        let (index, filled_side) = match order.role {
            OrderRole::GridBuy(i) => (i, OrderSide::Buy),
            OrderRole::GridSell(i) => (i, OrderSide::Sell),
            _ => return Vec::new(),
        };
        let Some(level) = self.state.levels.get_mut(index) else {
            return Vec::new();
        };

        // If this fill closes the leg the level was already waiting on,
        // record the completed cycle before re-arming.
        if let Some((open_side, open_price, opened_at)) = self.open_legs.remove(&index) {
            if open_side != filled_side {
                let (buy_price, sell_price) = if filled_side == OrderSide::Buy {
                    (fill_price, open_price)
                } else {
                    (open_price, fill_price)
                };
                self.state.cycles.push(Cycle::realized(
                    index,
                    buy_price,
                    sell_price,
                    order.filled_amount,
                    Decimal::ZERO,
                    opened_at,
                ));
            }
        }

        // Re-arm the opposite side at a margin off this fill, and remember
        // this fill as the leg the counter-order will close.
        self.open_legs.insert(index, (filled_side, fill_price, Utc::now()));
        let counter_side = filled_side.opposite();
        let margin = self.params.take_profit_per_level_pct;
        let counter_price = match filled_side {
            OrderSide::Buy => fill_price * (Decimal::ONE + margin),
            OrderSide::Sell => fill_price * (Decimal::ONE - margin),
        };
        let counter_role = match counter_side {
            OrderSide::Buy => OrderRole::GridBuy(index),
            OrderSide::Sell => OrderRole::GridSell(index),
        };
        let counter_order = Order::new(
            self.bot_name.clone(),
            self.symbol.clone(),
            counter_side,
            OrderType::Limit,
            Some(counter_price),
            order.filled_amount,
            counter_role,
        );
        level.side = counter_side;
        level.active_order_id = Some(counter_order.local_id);
        vec![Intent::PlaceOrder(counter_order)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn arithmetic_levels_are_evenly_spaced() {
        let levels = generate_levels(dec!(100), dec!(200), 5, GridDistribution::Arithmetic);
        assert_eq!(levels, vec![dec!(100), dec!(125), dec!(150), dec!(175), dec!(200)]);
    }

    #[test]
    fn geometric_levels_start_and_end_on_bounds() {
        let levels = generate_levels(dec!(100), dec!(200), 4, GridDistribution::Geometric);
        assert_eq!(levels.len(), 4);
        assert_eq!(levels.first().copied(), Some(dec!(100)));
        assert_eq!(levels.last().copied(), Some(dec!(200)));
    }

    #[test]
    fn rejects_too_few_levels() {
        let levels = generate_levels(dec!(100), dec!(200), 1, GridDistribution::Arithmetic);
        assert!(levels.is_empty());
    }

    #[test]
    fn seeds_buys_below_and_sells_above_current_price() {
        let params = GridParams {
            lower_price: dec!(100),
            upper_price: dec!(200),
            grid_levels: 5,
            distribution: GridDistribution::Arithmetic,
            take_profit_per_level_pct: dec!(0.01),
        };
        let mut engine = GridEngine::new("grid-bot", "BTCUSDT", params).unwrap();
        let snapshot = MarketSnapshot {
            last_price: dec!(150),
            last_update: None,
        };
        let intents = engine.evaluate(&snapshot, &[]).unwrap();
        assert_eq!(intents.len(), 5);
        let buys = intents
            .iter()
            .filter(|i| matches!(i, Intent::PlaceOrder(o) if o.side == OrderSide::Buy))
            .count();
        assert_eq!(buys, 2);
    }
}
