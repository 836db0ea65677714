use crate::error::ConfigError;
use core_types::{GridDistribution, MarketKind, StrategyKind};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// The root configuration structure: one or more bots, a shared exchange
/// connection, a shared risk envelope, and logging.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub risk_management: RiskManagement,
    pub logging: LoggingConfig,
    pub bots: Vec<BotConfig>,
}

impl Config {
    /// Validates every section. Called once at startup so a malformed
    /// `bots.toml` fails loudly before any bot task is spawned.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.risk_management.validate()?;
        if self.bots.is_empty() {
            return Err(ConfigError::validation("at least one bot must be configured"));
        }
        let mut seen_names = std::collections::HashSet::new();
        for bot in &self.bots {
            bot.validate()?;
            if !seen_names.insert(bot.name.clone()) {
                return Err(ConfigError::validation(format!(
                    "duplicate bot name: {}",
                    bot.name
                )));
            }
        }
        Ok(())
    }
}

/// Connection parameters for the exchange adapter. Credentials are resolved
/// by name through an external credential store — this struct never holds
/// a raw key or secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    pub exchange_id: String,
    pub credentials_name: String,
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default = "default_true")]
    pub respect_rate_limit: bool,
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_recv_window_ms() -> u64 {
    5_000
}

/// Portfolio-wide risk limits enforced by the Risk Manager (independent of
/// any one strategy's own stop-loss placement).
#[derive(Debug, Clone, Deserialize)]
pub struct RiskManagement {
    /// Fraction of account equity risked on a single trade, e.g. 0.01 for 1%.
    pub risk_per_trade_pct: Decimal,
    /// Fraction of equity that may be drawn down in a rolling day before
    /// the Risk Manager halts new entries.
    pub max_daily_drawdown_pct: Decimal,
    /// Fraction of equity that may be open across all bots simultaneously.
    pub max_portfolio_exposure_pct: Decimal,
    /// Maximum number of concurrently open Deals across all bots.
    pub max_concurrent_deals: u32,
}

impl RiskManagement {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_fraction("risk_per_trade_pct", self.risk_per_trade_pct)?;
        validate_fraction("max_daily_drawdown_pct", self.max_daily_drawdown_pct)?;
        validate_fraction("max_portfolio_exposure_pct", self.max_portfolio_exposure_pct)?;
        if self.max_concurrent_deals == 0 {
            return Err(ConfigError::validation(
                "max_concurrent_deals must be at least 1",
            ));
        }
        Ok(())
    }
}

fn validate_fraction(field: &str, value: Decimal) -> Result<(), ConfigError> {
    if value <= Decimal::ZERO || value >= dec!(1) {
        return Err(ConfigError::validation(format!(
            "{field} must be in (0, 1), got {value}"
        )));
    }
    Ok(())
}

/// Structured logging configuration, modeled on the teacher's config-driven
/// tracing setup.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive string, e.g. `"info"` or `"aegis=debug,warn"`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file_logging: bool,
    #[serde(default = "default_log_directory")]
    pub log_directory: String,
    #[serde(default = "default_log_filename")]
    pub log_filename: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_log_filename() -> String {
    "aegis".to_string()
}

/// One bot: a symbol, a strategy assignment, and the parameters for whichever
/// strategy kinds it runs. Only the block matching `strategy` is required to
/// be populated; the others are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub name: String,
    pub symbol: String,
    pub market: MarketKind,
    pub strategy: StrategyKind,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default = "default_leverage")]
    pub leverage: Decimal,
    #[serde(default = "default_capital_allocation_pct")]
    pub capital_allocation_pct: Decimal,
    pub grid: Option<GridParams>,
    pub dca: Option<DcaParams>,
    pub trend: Option<TrendParams>,
    pub smc: Option<SmcParams>,
}

fn default_leverage() -> Decimal {
    dec!(1)
}

fn default_capital_allocation_pct() -> Decimal {
    dec!(0.1)
}

impl BotConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::validation("bot name must not be empty"));
        }
        if self.leverage < dec!(1) {
            return Err(ConfigError::validation(format!(
                "bot {}: leverage must be >= 1",
                self.name
            )));
        }
        validate_fraction("capital_allocation_pct", self.capital_allocation_pct).map_err(|_| {
            ConfigError::validation(format!(
                "bot {}: capital_allocation_pct must be in (0, 1)",
                self.name
            ))
        })?;
        match self.strategy {
            StrategyKind::Grid => self.require(&self.grid, "grid")?.validate(&self.name)?,
            StrategyKind::Dca => self.require(&self.dca, "dca")?.validate(&self.name)?,
            StrategyKind::TrendFollower => {
                self.require(&self.trend, "trend")?.validate(&self.name)?
            }
            StrategyKind::Smc => self.require(&self.smc, "smc")?.validate(&self.name)?,
            StrategyKind::Hybrid => {
                if self.grid.is_none() && self.dca.is_none() {
                    return Err(ConfigError::validation(format!(
                        "bot {}: a hybrid strategy needs at least a grid or dca block",
                        self.name
                    )));
                }
                if let Some(g) = &self.grid {
                    g.validate(&self.name)?;
                }
                if let Some(d) = &self.dca {
                    d.validate(&self.name)?;
                }
            }
        }
        Ok(())
    }

    fn require<'a, T>(&self, field: &'a Option<T>, name: &str) -> Result<&'a T, ConfigError> {
        field.as_ref().ok_or_else(|| {
            ConfigError::validation(format!(
                "bot {}: strategy {:?} requires a [{}] block",
                self.name, self.strategy, name
            ))
        })
    }
}

/// Parameters for the Grid Engine.
#[derive(Debug, Clone, Deserialize)]
pub struct GridParams {
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    pub grid_levels: u32,
    pub distribution: GridDistribution,
    pub take_profit_per_level_pct: Decimal,
}

impl GridParams {
    pub fn validate(&self, bot_name: &str) -> Result<(), ConfigError> {
        if self.lower_price <= Decimal::ZERO || self.upper_price <= self.lower_price {
            return Err(ConfigError::validation(format!(
                "bot {bot_name}: grid.upper_price must be greater than grid.lower_price, both positive"
            )));
        }
        if !(2..=100).contains(&self.grid_levels) {
            return Err(ConfigError::validation(format!(
                "bot {bot_name}: grid.grid_levels must be in [2, 100], got {}",
                self.grid_levels
            )));
        }
        validate_fraction("grid.take_profit_per_level_pct", self.take_profit_per_level_pct)
            .map_err(|e| prefix_bot(bot_name, e))
    }
}

/// Parameters for the DCA Engine.
#[derive(Debug, Clone, Deserialize)]
pub struct DcaParams {
    pub base_order_size: Decimal,
    pub safety_order_size: Decimal,
    pub max_safety_orders: u32,
    pub price_deviation_pct: Decimal,
    pub safety_order_volume_scale: Decimal,
    pub safety_order_step_scale: Decimal,
    pub take_profit_pct: Decimal,
    #[serde(default)]
    pub trailing_enabled: bool,
    #[serde(default)]
    pub trailing_deviation_pct: Decimal,
    /// Closes the Deal when unrealized loss against the average entry
    /// reaches this fraction, independent of the take-profit/trailing path.
    pub stop_loss_pct: Decimal,
}

impl DcaParams {
    pub fn validate(&self, bot_name: &str) -> Result<(), ConfigError> {
        if self.base_order_size <= Decimal::ZERO || self.safety_order_size <= Decimal::ZERO {
            return Err(ConfigError::validation(format!(
                "bot {bot_name}: dca order sizes must be positive"
            )));
        }
        if self.max_safety_orders == 0 {
            return Err(ConfigError::validation(format!(
                "bot {bot_name}: dca.max_safety_orders must be at least 1"
            )));
        }
        validate_fraction("dca.price_deviation_pct", self.price_deviation_pct)
            .map_err(|e| prefix_bot(bot_name, e))?;
        validate_fraction("dca.take_profit_pct", self.take_profit_pct)
            .map_err(|e| prefix_bot(bot_name, e))?;
        validate_fraction("dca.stop_loss_pct", self.stop_loss_pct)
            .map_err(|e| prefix_bot(bot_name, e))?;
        if self.trailing_enabled {
            validate_fraction("dca.trailing_deviation_pct", self.trailing_deviation_pct)
                .map_err(|e| prefix_bot(bot_name, e))?;
        }
        Ok(())
    }
}

/// Parameters for the Trend-Follower Engine.
#[derive(Debug, Clone, Deserialize)]
pub struct TrendParams {
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub atr_period: usize,
    pub atr_multiplier: Decimal,
    pub rsi_period: usize,
    pub rsi_filter_threshold: Decimal,
    /// Fast/slow EMA divergence, as a fraction of the slow EMA, below which
    /// the trend is classified sideways rather than weak.
    pub weak_divergence_pct: Decimal,
    /// Divergence above which the trend is classified strong rather than
    /// weak. Must be greater than `weak_divergence_pct`.
    pub strong_divergence_pct: Decimal,
    /// Vetoes new entries when ATR, as a fraction of price, exceeds this —
    /// the move is judged too volatile to size a stop against reliably.
    pub max_atr_filter_pct: Decimal,
    /// Consecutive losing exits after which new entries are sized at half.
    pub loss_streak_threshold: u32,
}

impl TrendParams {
    pub fn validate(&self, bot_name: &str) -> Result<(), ConfigError> {
        if self.ema_fast_period == 0 || self.ema_slow_period == 0 {
            return Err(ConfigError::validation(format!(
                "bot {bot_name}: trend EMA periods must be positive"
            )));
        }
        if self.ema_fast_period >= self.ema_slow_period {
            return Err(ConfigError::validation(format!(
                "bot {bot_name}: trend.ema_fast_period must be less than ema_slow_period"
            )));
        }
        if self.atr_multiplier <= Decimal::ZERO {
            return Err(ConfigError::validation(format!(
                "bot {bot_name}: trend.atr_multiplier must be positive"
            )));
        }
        validate_fraction("trend.weak_divergence_pct", self.weak_divergence_pct)
            .map_err(|e| prefix_bot(bot_name, e))?;
        validate_fraction("trend.strong_divergence_pct", self.strong_divergence_pct)
            .map_err(|e| prefix_bot(bot_name, e))?;
        if self.weak_divergence_pct >= self.strong_divergence_pct {
            return Err(ConfigError::validation(format!(
                "bot {bot_name}: trend.weak_divergence_pct must be less than strong_divergence_pct"
            )));
        }
        validate_fraction("trend.max_atr_filter_pct", self.max_atr_filter_pct)
            .map_err(|e| prefix_bot(bot_name, e))?;
        if self.loss_streak_threshold == 0 {
            return Err(ConfigError::validation(format!(
                "bot {bot_name}: trend.loss_streak_threshold must be at least 1"
            )));
        }
        Ok(())
    }
}

/// Parameters for the Smart Money Concepts Engine.
#[derive(Debug, Clone, Deserialize)]
pub struct SmcParams {
    pub swing_lookback: usize,
    pub fair_value_gap_min_pct: Decimal,
    pub liquidity_sweep_lookback: usize,
    pub risk_reward_min: Decimal,
    pub zone_refresh_secs: u64,
}

impl SmcParams {
    pub fn validate(&self, bot_name: &str) -> Result<(), ConfigError> {
        if self.swing_lookback < 2 {
            return Err(ConfigError::validation(format!(
                "bot {bot_name}: smc.swing_lookback must be at least 2"
            )));
        }
        if self.risk_reward_min <= Decimal::ZERO {
            return Err(ConfigError::validation(format!(
                "bot {bot_name}: smc.risk_reward_min must be positive"
            )));
        }
        if self.zone_refresh_secs == 0 {
            return Err(ConfigError::validation(format!(
                "bot {bot_name}: smc.zone_refresh_secs must be positive"
            )));
        }
        Ok(())
    }
}

fn prefix_bot(bot_name: &str, err: ConfigError) -> ConfigError {
    match err {
        ConfigError::ValidationError(msg) => {
            ConfigError::ValidationError(format!("bot {bot_name}: {msg}"))
        }
        other => other,
    }
}
