use crate::error::StrategyError;
use crate::{DcaEngine, GridEngine, Strategy, TrendFollowerEngine};
use configuration::BotConfig;

/// Builds the strategy engine for a bot from its configuration.
///
/// `StrategyKind::Hybrid` and `StrategyKind::Smc` are handled by the engine
/// crate directly (a hybrid runs more than one `Strategy` side by side; SMC
/// needs the shared `MarketRegimeDetector` wiring), so this factory only
/// covers the single-engine strategies with no extra coordination.
pub fn create_strategy(bot: &BotConfig) -> Result<Box<dyn Strategy>, StrategyError> {
    match bot.strategy {
        core_types::StrategyKind::Grid => {
            let params = bot
                .grid
                .clone()
                .ok_or(StrategyError::MissingParameters(bot.strategy))?;
            Ok(Box::new(GridEngine::new(
                bot.name.clone(),
                bot.symbol.clone(),
                params,
            )?))
        }
        core_types::StrategyKind::Dca => {
            let params = bot
                .dca
                .clone()
                .ok_or(StrategyError::MissingParameters(bot.strategy))?;
            Ok(Box::new(DcaEngine::new(bot.name.clone(), bot.symbol.clone(), params)))
        }
        core_types::StrategyKind::TrendFollower => {
            let params = bot
                .trend
                .clone()
                .ok_or(StrategyError::MissingParameters(bot.strategy))?;
            Ok(Box::new(TrendFollowerEngine::new(
                bot.name.clone(),
                bot.symbol.clone(),
                params,
            )?))
        }
        other => Err(StrategyError::MissingParameters(other)),
    }
}
