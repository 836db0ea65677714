use crate::error::EngineError;
use configuration::BotConfig;
use core_types::{Deal, GridState, Order, Regime, StrategyKind};
use rust_decimal::Decimal;
use strategies::{create_strategy, DcaEngine, GridEngine, Intent, SmcEngine, Strategy};

/// Runs one or more `Strategy` engines for a single bot.
///
/// Every `StrategyKind` but `Hybrid` maps to exactly one engine and is
/// carried as `Single`. `Hybrid` runs a Grid engine and a DCA engine side by
/// side against the same symbol, merging their intents round-robin each
/// tick; the Risk Manager remains the only gate on capital contention
/// between them, same as it is for any two independent bots.
pub enum StrategyRunner {
    Single(Box<dyn Strategy>),
    Hybrid {
        grid: Option<GridEngine>,
        dca: Option<DcaEngine>,
    },
}

impl StrategyRunner {
    /// Evaluates every constituent engine and tags each resulting intent
    /// with the `StrategyKind` that produced it, so the orchestrator can
    /// route fills back to the right sub-engine.
    pub fn evaluate(
        &mut self,
        snapshot: &core_types::MarketSnapshot,
        history: &[core_types::Kline],
    ) -> Result<Vec<(StrategyKind, Intent)>, strategies::StrategyError> {
        match self {
            StrategyRunner::Single(strategy) => {
                let kind = strategy.kind();
                Ok(strategy
                    .evaluate(snapshot, history)?
                    .into_iter()
                    .map(|intent| (kind, intent))
                    .collect())
            }
            StrategyRunner::Hybrid { grid, dca } => {
                let mut merged = Vec::new();
                let grid_intents = match grid.as_mut() {
                    Some(g) => g.evaluate(snapshot, history)?,
                    None => Vec::new(),
                };
                let dca_intents = match dca.as_mut() {
                    Some(d) => d.evaluate(snapshot, history)?,
                    None => Vec::new(),
                };
                let mut grid_iter = grid_intents.into_iter();
                let mut dca_iter = dca_intents.into_iter();
                loop {
                    let mut any = false;
                    if let Some(intent) = grid_iter.next() {
                        merged.push((StrategyKind::Grid, intent));
                        any = true;
                    }
                    if let Some(intent) = dca_iter.next() {
                        merged.push((StrategyKind::Dca, intent));
                        any = true;
                    }
                    if !any {
                        break;
                    }
                }
                Ok(merged)
            }
        }
    }

    /// Routes a fill back to the sub-engine that owns it. `kind` is read
    /// from the `order_owner` side-table the orchestrator keeps at
    /// placement time; for a `Single` runner it's always that engine's own
    /// kind and is ignored.
    pub fn on_order_filled(&mut self, kind: StrategyKind, order: &Order, fill_price: Decimal) -> Vec<Intent> {
        match self {
            StrategyRunner::Single(strategy) => strategy.on_order_filled(order, fill_price),
            StrategyRunner::Hybrid { grid, dca } => match kind {
                StrategyKind::Grid => grid
                    .as_mut()
                    .map(|g| g.on_order_filled(order, fill_price))
                    .unwrap_or_default(),
                StrategyKind::Dca => dca
                    .as_mut()
                    .map(|d| d.on_order_filled(order, fill_price))
                    .unwrap_or_default(),
                _ => Vec::new(),
            },
        }
    }

    pub fn deals_snapshot(&self) -> Vec<Deal> {
        match self {
            StrategyRunner::Single(strategy) => strategy.deals_snapshot(),
            StrategyRunner::Hybrid { dca, .. } => {
                dca.as_ref().map(|d| d.deals_snapshot()).unwrap_or_default()
            }
        }
    }

    pub fn grid_state(&self) -> Option<GridState> {
        match self {
            StrategyRunner::Single(strategy) => strategy.grid_state(),
            StrategyRunner::Hybrid { grid, .. } => grid.as_ref().map(|g| g.state().clone()),
        }
    }
}

/// Builds the `StrategyRunner` for a bot from its configuration.
///
/// `strategies::create_strategy` already covers Grid, Dca, and
/// TrendFollower; this factory adds the two cases that need coordination
/// the pure strategy crate doesn't have: Hybrid (two engines) and Smc
/// (wired here rather than in `create_strategy` only because it keeps every
/// non-single-engine case in one place).
pub fn create_strategy_runner(bot: &BotConfig) -> Result<StrategyRunner, EngineError> {
    match bot.strategy {
        StrategyKind::Hybrid => {
            let grid = bot
                .grid
                .clone()
                .map(|params| GridEngine::new(bot.name.clone(), bot.symbol.clone(), params))
                .transpose()
                .map_err(EngineError::from)?;
            let dca = bot
                .dca
                .clone()
                .map(|params| DcaEngine::new(bot.name.clone(), bot.symbol.clone(), params));
            if grid.is_none() && dca.is_none() {
                return Err(EngineError::Configuration(format!(
                    "bot {}: hybrid strategy requires at least a grid or dca block",
                    bot.name
                )));
            }
            Ok(StrategyRunner::Hybrid { grid, dca })
        }
        StrategyKind::Smc => {
            let params = bot.smc.clone().ok_or_else(|| {
                EngineError::Configuration(format!("bot {}: smc strategy requires a [smc] block", bot.name))
            })?;
            Ok(StrategyRunner::Single(Box::new(SmcEngine::new(
                bot.name.clone(),
                bot.symbol.clone(),
                params,
            ))))
        }
        _ => Ok(StrategyRunner::Single(create_strategy(bot)?)),
    }
}

/// Whether `kind` is allowed to trade while `regime` holds. Grid ladders
/// bleed out in a strong directional move; DCA's averaging-down assumption
/// breaks down in a market that's simply crashing with no mean to revert
/// to; the Trend-Follower needs an actual trend to follow; SMC trades
/// structure breaks that occur in any regime, so it isn't filtered; Hybrid
/// defers to its own sub-engines (each intent is tagged with its source
/// kind and filtered individually by the orchestrator).
pub fn strategy_allowed_in_regime(kind: StrategyKind, regime: Regime) -> bool {
    match kind {
        StrategyKind::Grid => !matches!(regime, Regime::TrendingUp | Regime::TrendingDown),
        StrategyKind::Dca => !matches!(regime, Regime::Volatile | Regime::TrendingDown),
        StrategyKind::TrendFollower => matches!(regime, Regime::TrendingUp | Regime::TrendingDown),
        StrategyKind::Smc => true,
        StrategyKind::Hybrid => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_disallowed_in_trending_regimes() {
        assert!(!strategy_allowed_in_regime(StrategyKind::Grid, Regime::TrendingUp));
        assert!(strategy_allowed_in_regime(StrategyKind::Grid, Regime::Ranging));
    }

    #[test]
    fn trend_follower_requires_a_trend() {
        assert!(!strategy_allowed_in_regime(StrategyKind::TrendFollower, Regime::Ranging));
        assert!(strategy_allowed_in_regime(StrategyKind::TrendFollower, Regime::TrendingDown));
    }

    #[test]
    fn smc_is_never_filtered() {
        for regime in [
            Regime::TrendingUp,
            Regime::TrendingDown,
            Regime::Ranging,
            Regime::Volatile,
            Regime::Unknown,
        ] {
            assert!(strategy_allowed_in_regime(StrategyKind::Smc, regime));
        }
    }
}
