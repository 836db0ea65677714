use crate::error::StrategyError;
use crate::{Intent, Strategy};
use chrono::Utc;
use configuration::DcaParams;
use core_types::{CloseReason, Deal, Direction, Kline, MarketSnapshot, Order, OrderRole, OrderSide, OrderType};
use rust_decimal::Decimal;

/// Computes the trigger price for the next safety order: `step_scale`
/// compounds the deviation so each successive safety order sits further
/// from the last than the one before it.
pub fn next_safety_order_price(
    base_price: Decimal,
    base_deviation_pct: Decimal,
    step_scale: Decimal,
    safety_orders_placed: u32,
) -> Decimal {
    let mut deviation = base_deviation_pct;
    let mut multiplier = Decimal::ONE;
    for _ in 0..safety_orders_placed {
        multiplier *= step_scale;
    }
    deviation *= multiplier;
    base_price * (Decimal::ONE - deviation)
}

/// Computes the size of the next safety order: `volume_scale` compounds so
/// each successive safety order is larger than the last, pulling the
/// average entry down faster as price falls further.
pub fn next_safety_order_size(base_size: Decimal, volume_scale: Decimal, safety_orders_placed: u32) -> Decimal {
    let mut size = base_size;
    for _ in 0..safety_orders_placed {
        size *= volume_scale;
    }
    size
}

/// The DCA Engine: opens a base position, then averages down with scaled
/// safety orders as price moves against it, exiting the whole Deal at a
/// single take-profit percentage off the average entry (optionally
/// trailing once that target is first reached).
pub struct DcaEngine {
    bot_name: String,
    symbol: String,
    params: DcaParams,
    deal: Option<Deal>,
}

impl DcaEngine {
    pub fn new(bot_name: impl Into<String>, symbol: impl Into<String>, params: DcaParams) -> Self {
        Self {
            bot_name: bot_name.into(),
            symbol: symbol.into(),
            params,
            deal: None,
        }
    }

    pub fn active_deal(&self) -> Option<&Deal> {
        self.deal.as_ref().filter(|d| d.active)
    }

    fn take_profit_price(params: &DcaParams, deal: &Deal) -> Decimal {
        deal.average_entry * (Decimal::ONE + params.take_profit_pct)
    }

    fn trailing_stop_price(params: &DcaParams, deal: &Deal) -> Decimal {
        deal.highest_price_since_entry * (Decimal::ONE - params.trailing_deviation_pct)
    }

    fn realized_pnl(deal: &Deal, exit_price: Decimal) -> Decimal {
        match deal.direction {
            Direction::Long => (exit_price - deal.average_entry) * deal.base_amount,
            Direction::Short => (deal.average_entry - exit_price) * deal.base_amount,
        }
    }
}

impl Strategy for DcaEngine {
    fn kind(&self) -> core_types::StrategyKind {
        core_types::StrategyKind::Dca
    }

    fn deals_snapshot(&self) -> Vec<Deal> {
        self.deal.iter().cloned().collect()
    }

    fn evaluate(
        &mut self,
        snapshot: &MarketSnapshot,
        _history: &[Kline],
    ) -> Result<Vec<Intent>, StrategyError> {
        let price = snapshot.last_price;
        if price.is_zero() {
            return Ok(vec![]);
        }

        let Some(deal) = self.deal.as_mut().filter(|d| d.active) else {
            // No open Deal: place the base order.
            let amount = self.params.base_order_size / price;
            return Ok(vec![Intent::PlaceOrder(Order::new(
                self.bot_name.clone(),
                self.symbol.clone(),
                OrderSide::Buy,
                OrderType::Market,
                None,
                amount,
                OrderRole::BaseOrder,
            ))]);
        };

        deal.update_highest_price(price);

        let tp_price = Self::take_profit_price(&self.params, deal);
        if price >= tp_price {
            if self.params.trailing_enabled && !deal.trailing_activated {
                deal.trailing_activated = true;
            }
        }
        if deal.trailing_activated {
            let trail_price = Self::trailing_stop_price(&self.params, deal);
            if price <= trail_price {
                let amount = deal.base_amount;
                let pnl = Self::realized_pnl(deal, price);
                deal.close(CloseReason::TrailingStop, pnl, Utc::now());
                return Ok(vec![Intent::PlaceOrder(Order::new(
                    self.bot_name.clone(),
                    self.symbol.clone(),
                    OrderSide::Sell,
                    OrderType::Market,
                    None,
                    amount,
                    OrderRole::TrailingExit,
                ))]);
            }
            return Ok(vec![]);
        }
        if !self.params.trailing_enabled && price >= tp_price {
            let amount = deal.base_amount;
            let pnl = Self::realized_pnl(deal, price);
            deal.close(CloseReason::TakeProfit, pnl, Utc::now());
            return Ok(vec![Intent::PlaceOrder(Order::new(
                self.bot_name.clone(),
                self.symbol.clone(),
                OrderSide::Sell,
                OrderType::Market,
                None,
                amount,
                OrderRole::TakeProfit,
            ))]);
        }

        if deal.unrealized_pct(price) <= -self.params.stop_loss_pct {
            let amount = deal.base_amount;
            let pnl = Self::realized_pnl(deal, price);
            deal.close(CloseReason::StopLoss, pnl, Utc::now());
            return Ok(vec![Intent::PlaceOrder(Order::new(
                self.bot_name.clone(),
                self.symbol.clone(),
                OrderSide::Sell,
                OrderType::Market,
                None,
                amount,
                OrderRole::StopLoss,
            ))]);
        }

        if deal.safety_orders_filled >= self.params.max_safety_orders {
            return Ok(vec![]);
        }
        let trigger = next_safety_order_price(
            deal.average_entry,
            self.params.price_deviation_pct,
            self.params.safety_order_step_scale,
            deal.safety_orders_filled,
        );
        if price <= trigger {
            let size = next_safety_order_size(
                self.params.safety_order_size,
                self.params.safety_order_volume_scale,
                deal.safety_orders_filled,
            );
            let amount = size / price;
            return Ok(vec![Intent::PlaceOrder(Order::new(
                self.bot_name.clone(),
                self.symbol.clone(),
                OrderSide::Buy,
                OrderType::Market,
                None,
                amount,
                OrderRole::SafetyOrder(deal.safety_orders_filled + 1),
            ))]);
        }
        Ok(vec![])
    }

    fn on_order_filled(&mut self, order: &Order, fill_price: Decimal) -> Vec<Intent> {
        match order.role {
            OrderRole::BaseOrder => {
                self.deal = Some(Deal::open(
                    self.bot_name.clone(),
                    self.symbol.clone(),
                    Direction::Long,
                    fill_price,
                    order.filled_amount,
                    serde_json::to_value(&self.params.take_profit_pct).unwrap_or_default(),
                ));
            }
            OrderRole::SafetyOrder(_) => {
                if let Some(deal) = self.deal.as_mut() {
                    let _ = deal.apply_fill(fill_price, order.filled_amount);
                }
            }
            _ => {}
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn safety_order_price_steps_further_each_time() {
        let first = next_safety_order_price(dec!(100), dec!(0.02), dec!(1.5), 0);
        let second = next_safety_order_price(dec!(100), dec!(0.02), dec!(1.5), 1);
        assert_eq!(first, dec!(98.00));
        assert!(second < first);
    }

    #[test]
    fn safety_order_size_scales_up_each_time() {
        let first = next_safety_order_size(dec!(10), dec!(1.5), 0);
        let second = next_safety_order_size(dec!(10), dec!(1.5), 1);
        assert_eq!(first, dec!(10));
        assert_eq!(second, dec!(15.0));
    }

    fn params() -> DcaParams {
        DcaParams {
            base_order_size: dec!(100),
            safety_order_size: dec!(50),
            max_safety_orders: 3,
            price_deviation_pct: dec!(0.02),
            safety_order_volume_scale: dec!(1.5),
            safety_order_step_scale: dec!(1.5),
            take_profit_pct: dec!(0.01),
            trailing_enabled: false,
            trailing_deviation_pct: Decimal::ZERO,
            stop_loss_pct: dec!(0.15),
        }
    }

    #[test]
    fn places_base_order_when_no_deal_open() {
        let mut engine = DcaEngine::new("dca-bot", "ETHUSDT", params());
        let snapshot = MarketSnapshot {
            last_price: dec!(2000),
            last_update: None,
        };
        let intents = engine.evaluate(&snapshot, &[]).unwrap();
        assert_eq!(intents.len(), 1);
        assert!(matches!(&intents[0], Intent::PlaceOrder(o) if o.role == OrderRole::BaseOrder));
    }

    #[test]
    fn closes_deal_at_take_profit_without_trailing() {
        let mut engine = DcaEngine::new("dca-bot", "ETHUSDT", params());
        let base_order = Order::new(
            "dca-bot",
            "ETHUSDT",
            OrderSide::Buy,
            OrderType::Market,
            None,
            dec!(0.05),
            OrderRole::BaseOrder,
        );
        let mut filled = base_order;
        filled.apply_fill(dec!(0.05), Utc::now()).unwrap();
        engine.on_order_filled(&filled, dec!(2000));
        let snapshot = MarketSnapshot {
            last_price: dec!(2021),
            last_update: None,
        };
        let intents = engine.evaluate(&snapshot, &[]).unwrap();
        assert_eq!(intents.len(), 1);
        assert!(matches!(&intents[0], Intent::PlaceOrder(o) if o.role == OrderRole::TakeProfit));
    }
}
