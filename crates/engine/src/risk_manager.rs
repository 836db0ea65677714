use crate::error::EngineError;
use configuration::RiskManagement;
use core_types::Signal;
use risk::{CapitalManager, RiskDecision, RiskError, RiskManager, SimpleRiskManager};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Wraps the single portfolio-wide `SimpleRiskManager` together with a
/// per-bot `CapitalManager`, since neither piece alone is enough to gate a
/// bot's trade: the Risk Manager sizes and applies the daily drawdown halt,
/// the Capital Manager caps how much of that sizing a given bot is currently
/// trusted with. Shared across every bot task via `Arc`.
pub struct RiskCoordinator {
    risk_manager: Arc<Mutex<SimpleRiskManager>>,
    capital: Arc<Mutex<HashMap<String, CapitalManager>>>,
}

impl RiskCoordinator {
    pub fn new(params: RiskManagement) -> Result<Self, EngineError> {
        let risk_manager = SimpleRiskManager::new(params)?;
        Ok(Self {
            risk_manager: Arc::new(Mutex::new(risk_manager)),
            capital: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Registers a bot's total tradeable capital, starting it at Capital
    /// Manager phase 1. Idempotent per bot name is not guaranteed — callers
    /// should only register a bot once, at startup.
    pub async fn register_bot(&self, bot_name: &str, total_capital: Decimal) {
        self.capital
            .lock()
            .await
            .insert(bot_name.to_string(), CapitalManager::start_phase_1(total_capital));
    }

    /// Sizes a trade against the Risk Manager's fixed-fractional rule, then
    /// caps it to the bot's currently allocated capital. A halted Capital
    /// Manager rejects every trade regardless of what the Risk Manager
    /// would otherwise allow.
    pub async fn check_trade(
        &self,
        bot_name: &str,
        signal: &Signal,
        equity: Decimal,
        open_deals: u32,
    ) -> Result<Decimal, EngineError> {
        let capital_map = self.capital.lock().await;
        let capital_manager = capital_map
            .get(bot_name)
            .ok_or_else(|| EngineError::BotNotFound(bot_name.to_string()))?;
        if capital_manager.is_halted() {
            return Err(EngineError::Risk(RiskError::Halted(format!(
                "bot {bot_name} capital manager is halted"
            ))));
        }
        let allocated = capital_manager.allocated_capital();
        drop(capital_map);

        let sized_equity = equity.min(allocated);
        let amount = self
            .risk_manager
            .lock()
            .await
            .check_trade(signal, sized_equity, open_deals)?;
        Ok(amount)
    }

    pub async fn evaluate_portfolio(&self) -> RiskDecision {
        self.risk_manager.lock().await.evaluate_portfolio()
    }

    pub async fn record_fill(&self, realized_pnl: Decimal, equity_after: Decimal) {
        self.risk_manager.lock().await.record_fill(realized_pnl, equity_after);
    }

    pub async fn record_trade(&self, bot_name: &str) {
        if let Some(cm) = self.capital.lock().await.get_mut(bot_name) {
            cm.record_trade();
        }
    }

    /// Records an adapter/execution error against a bot's Capital Manager.
    /// Three within a phase halts that bot outright, independent of the
    /// portfolio-wide Risk Manager.
    pub async fn record_error(&self, bot_name: &str) {
        if let Some(cm) = self.capital.lock().await.get_mut(bot_name) {
            cm.record_error();
        }
    }

    /// Advances a bot's Capital Manager phase if it has earned it. Returns
    /// the new phase when an advance happened, so the caller can emit a
    /// `PhaseAdvanced` event.
    pub async fn maybe_advance_phase(&self, bot_name: &str) -> Option<u32> {
        let mut capital_map = self.capital.lock().await;
        let cm = capital_map.get_mut(bot_name)?;
        if cm.evaluate_scaling() {
            cm.advance_phase();
            Some(cm.phase())
        } else {
            None
        }
    }

    pub async fn capital_phase(&self, bot_name: &str) -> Option<u32> {
        self.capital.lock().await.get(bot_name).map(|cm| cm.phase())
    }

    pub async fn allocated_capital(&self, bot_name: &str) -> Option<Decimal> {
        self.capital.lock().await.get(bot_name).map(|cm| cm.allocated_capital())
    }

    pub async fn is_halted(&self, bot_name: &str) -> bool {
        self.capital
            .lock()
            .await
            .get(bot_name)
            .map(|cm| cm.is_halted())
            .unwrap_or(false)
    }

    /// Resets the portfolio-wide daily drawdown window. Capital Manager
    /// phases are untouched — they track cumulative performance, not a
    /// daily window.
    pub async fn reset_daily(&self) {
        self.risk_manager.lock().await.reset_daily();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use core_types::{Direction, StrategyKind, TakeProfitTarget};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

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
            id: Uuid::new_v4(),
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

    #[tokio::test]
    async fn rejects_trade_for_unregistered_bot() {
        let coordinator = RiskCoordinator::new(params()).unwrap();
        let result = coordinator.check_trade("ghost", &signal(dec!(100), dec!(95)), dec!(10_000), 0).await;
        assert!(matches!(result, Err(EngineError::BotNotFound(_))));
    }

    #[tokio::test]
    async fn caps_sizing_to_phase_1_allocation() {
        let coordinator = RiskCoordinator::new(params()).unwrap();
        coordinator.register_bot("bot-a", dec!(10_000)).await;
        // Phase 1 allocates 10% of 10_000 = 1_000, so equity passed to the
        // Risk Manager is capped at 1_000 even though full equity is larger.
        let amount = coordinator
            .check_trade("bot-a", &signal(dec!(100), dec!(95)), dec!(10_000), 0)
            .await
            .unwrap();
        // risk_capital = 1_000 * 0.01 = 10; stop_distance = 5
        // position_value = 10 * 100 / 5 = 200; amount = 200 / 100 = 2
        assert_eq!(amount, dec!(2));
    }

    #[tokio::test]
    async fn halted_capital_manager_rejects_every_trade() {
        let coordinator = RiskCoordinator::new(params()).unwrap();
        coordinator.register_bot("bot-a", dec!(10_000)).await;
        coordinator.record_error("bot-a").await;
        coordinator.record_error("bot-a").await;
        coordinator.record_error("bot-a").await;
        assert!(coordinator.is_halted("bot-a").await);
        let result = coordinator.check_trade("bot-a", &signal(dec!(100), dec!(95)), dec!(10_000), 0).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn advances_phase_after_twenty_clean_trades() {
        let coordinator = RiskCoordinator::new(params()).unwrap();
        coordinator.register_bot("bot-a", dec!(10_000)).await;
        for _ in 0..20 {
            coordinator.record_trade("bot-a").await;
        }
        let advanced = coordinator.maybe_advance_phase("bot-a").await;
        assert_eq!(advanced, Some(2));
        assert_eq!(coordinator.capital_phase("bot-a").await, Some(2));
    }
}
