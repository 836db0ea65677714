use crate::error::RiskError;
use crate::{RiskDecision, RiskManager};
use configuration::RiskManagement;
use core_types::Signal;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Mutex;

/// A fixed-fractional position sizer: risks `risk_per_trade_pct` of equity
/// per trade, scaled by the Signal's own confidence, with the stop-loss
/// distance determining the implied position size. Also tracks the
/// portfolio's rolling daily realized P&L against `max_daily_drawdown_pct`.
pub struct SimpleRiskManager {
    params: RiskManagement,
    daily_realized_pnl_pct: Mutex<Decimal>,
    halted: Mutex<Option<String>>,
}

impl SimpleRiskManager {
    pub fn new(params: RiskManagement) -> Result<Self, RiskError> {
        params
            .validate()
            .map_err(|e| RiskError::InvalidParameters(e.to_string()))?;
        Ok(Self {
            params,
            daily_realized_pnl_pct: Mutex::new(Decimal::ZERO),
            halted: Mutex::new(None),
        })
    }
}

impl RiskManager for SimpleRiskManager {
    fn check_trade(
        &self,
        signal: &Signal,
        equity: Decimal,
        open_deals: u32,
    ) -> Result<Decimal, RiskError> {
        if let Some(reason) = self.halted.lock().unwrap().clone() {
            return Err(RiskError::Halted(reason));
        }
        if equity <= Decimal::ZERO {
            return Err(RiskError::InsufficientEquity(equity));
        }
        if signal.entry_price <= Decimal::ZERO {
            return Err(RiskError::InvalidEntryPrice(signal.entry_price));
        }
        if signal.is_zero_risk() {
            return Err(RiskError::Rejected(
                "signal stop-loss equals entry price; zero risk distance".to_string(),
            ));
        }
        if open_deals >= self.params.max_concurrent_deals {
            return Err(RiskError::Rejected(format!(
                "max_concurrent_deals ({}) reached",
                self.params.max_concurrent_deals
            )));
        }

        let stop_distance = (signal.entry_price - signal.stop_loss_price).abs();
        let risk_capital = equity * self.params.risk_per_trade_pct * signal.confidence;
        let position_value = risk_capital * signal.entry_price / stop_distance;

        let max_position_value = equity * self.params.max_portfolio_exposure_pct;
        let position_value = position_value.min(max_position_value);

        let amount = position_value / signal.entry_price;
        if amount <= Decimal::ZERO {
            return Err(RiskError::Calculation(
                "computed position amount is zero or negative".to_string(),
            ));
        }
        Ok(amount)
    }

    fn evaluate_portfolio(&self) -> RiskDecision {
        let daily_realized_pnl_pct = *self.daily_realized_pnl_pct.lock().unwrap();
        if daily_realized_pnl_pct <= -self.params.max_daily_drawdown_pct {
            let reason = format!(
                "daily drawdown {} exceeds limit {}",
                daily_realized_pnl_pct, self.params.max_daily_drawdown_pct
            );
            *self.halted.lock().unwrap() = Some(reason.clone());
            return RiskDecision::Halt(reason);
        }
        RiskDecision::Continue
    }

    fn record_fill(&mut self, realized_pnl: Decimal, equity_after: Decimal) {
        if equity_after.is_zero() {
            return;
        }
        let mut daily = self.daily_realized_pnl_pct.lock().unwrap();
        *daily += realized_pnl / equity_after;
    }

    fn reset_daily(&mut self) {
        *self.daily_realized_pnl_pct.lock().unwrap() = Decimal::ZERO;
        *self.halted.lock().unwrap() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use core_types::{Direction, StrategyKind, TakeProfitTarget};

    fn params() -> RiskManagement {
        RiskManagement {
            risk_per_trade_pct: dec!(0.01),
            max_daily_drawdown_pct: dec!(0.05),
            max_portfolio_exposure_pct: dec!(0.5),
            max_concurrent_deals: 3,
        }
    }

    fn signal(entry: Decimal, stop: Decimal) -> Signal {
        Signal {
            id: uuid::Uuid::new_v4(),
            direction: Direction::Long,
            entry_price: entry,
            stop_loss_price: stop,
            take_profits: vec![TakeProfitTarget {
                price: entry * dec!(1.1),
                close_fraction: dec!(1),
            }],
            confidence: dec!(1),
            risk_reward: dec!(2),
            generated_at: chrono::Utc::now(),
            source_strategy: StrategyKind::TrendFollower,
            staleness_budget: Duration::minutes(5),
        }
    }

    #[test]
    fn sizes_trade_by_risk_fraction() {
        let mgr = SimpleRiskManager::new(params()).unwrap();
        let sig = signal(dec!(100), dec!(95));
        let amount = mgr.check_trade(&sig, dec!(10_000), 0).unwrap();
        // risk_capital = 10_000 * 0.01 = 100; stop_distance = 5
        // position_value = 100 * 100 / 5 = 2000; amount = 2000 / 100 = 20
        assert_eq!(amount, dec!(20));
    }

    #[test]
    fn rejects_zero_risk_signal() {
        let mgr = SimpleRiskManager::new(params()).unwrap();
        let sig = signal(dec!(100), dec!(100));
        assert!(mgr.check_trade(&sig, dec!(10_000), 0).is_err());
    }

    #[test]
    fn rejects_when_concurrent_deal_cap_reached() {
        let mgr = SimpleRiskManager::new(params()).unwrap();
        let sig = signal(dec!(100), dec!(95));
        assert!(mgr.check_trade(&sig, dec!(10_000), 3).is_err());
    }

    #[test]
    fn halts_on_daily_drawdown_breach() {
        let mut mgr = SimpleRiskManager::new(params()).unwrap();
        mgr.record_fill(dec!(-600), dec!(10_000));
        let decision = mgr.evaluate_portfolio();
        assert_eq!(decision, RiskDecision::Halt("daily drawdown -0.06 exceeds limit 0.05".to_string()));
    }
}
