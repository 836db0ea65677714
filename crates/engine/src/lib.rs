use crate::bot::{run_bot, BotCommand, BotRuntime};
use crate::error::EngineError;
use adapter::{ByBitAdapter, ExchangeAdapter, SimulatedAdapter};
use configuration::Config;
use events::EventBus;
use risk_manager::RiskCoordinator;
use rust_decimal_macros::dec;
use state_store::StateStoreRepository;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

pub mod bot;
pub mod error;
pub mod reconciler;
pub mod risk_manager;
pub mod util;

/// A single spawned bot's control handle: the channel the supervisor uses to
/// reach it, the `watch` sender that fans cancellation out to it, and the
/// task itself so the supervisor can await a clean shutdown.
struct BotHandle {
    commands: mpsc::Sender<BotCommand>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<Result<(), EngineError>>,
}

/// The multi-bot supervisor. Owns the exchange adapter, state store, shared
/// Event Bus, and Risk Coordinator, and spawns one `run_bot` task per
/// configured bot. Every bot task shares these components via `Arc`; only a
/// bot's own strategy state, local order cache, and lifecycle are private to
/// its task.
pub struct Engine {
    config: Config,
    store: Arc<StateStoreRepository>,
    events: EventBus,
    risk: Arc<RiskCoordinator>,
    bots: HashMap<String, BotHandle>,
}

impl Engine {
    pub fn new(config: Config, store: StateStoreRepository) -> Result<Self, EngineError> {
        let risk = RiskCoordinator::new(config.risk_management.clone())?;
        Ok(Self {
            config,
            store: Arc::new(store),
            events: EventBus::new(),
            risk: Arc::new(risk),
            bots: HashMap::new(),
        })
    }

    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    fn build_adapter(&self, dry_run: bool) -> Result<Arc<dyn ExchangeAdapter>, EngineError> {
        if dry_run {
            let mut balances = HashMap::new();
            balances.insert("USDT".to_string(), (dec!(10_000), dec!(10_000)));
            return Ok(Arc::new(SimulatedAdapter::new(balances)));
        }
        let api_key = std::env::var("BYBIT_API_KEY")
            .map_err(|_| EngineError::Configuration("BYBIT_API_KEY is not set".to_string()))?;
        let api_secret = std::env::var("BYBIT_API_SECRET")
            .map_err(|_| EngineError::Configuration("BYBIT_API_SECRET is not set".to_string()))?;
        Ok(Arc::new(ByBitAdapter::new(
            self.config.exchange.sandbox,
            api_key,
            api_secret,
            self.config.exchange.recv_window_ms,
        )))
    }

    /// Spawns one task per configured bot and returns once every bot has
    /// completed its startup reconciliation. Each bot gets its own adapter
    /// instance (a `SimulatedAdapter` holds its own in-memory balances and
    /// resting orders, so dry-run bots must not share one).
    pub async fn spawn_bots(&mut self) -> Result<(), EngineError> {
        for bot_config in self.config.bots.clone() {
            if !bot_config.auto_start {
                tracing::info!(bot = %bot_config.name, "skipping bot: auto_start is false");
                continue;
            }
            let adapter = self.build_adapter(bot_config.dry_run)?;
            let runtime = BotRuntime::new(
                bot_config.clone(),
                adapter,
                self.store.clone(),
                self.events.clone(),
                self.risk.clone(),
            )?;
            let (command_tx, command_rx) = mpsc::channel(16);
            let (cancel_tx, cancel_rx) = watch::channel(false);
            let bot_name = bot_config.name.clone();
            let task = tokio::spawn(run_bot(runtime, command_rx, cancel_rx));
            self.bots.insert(
                bot_name,
                BotHandle {
                    commands: command_tx,
                    cancel: cancel_tx,
                    task,
                },
            );
        }
        Ok(())
    }

    pub async fn pause_bot(&self, bot_name: &str) -> Result<(), EngineError> {
        self.send_command(bot_name, BotCommand::Pause).await
    }

    pub async fn resume_bot(&self, bot_name: &str) -> Result<(), EngineError> {
        self.send_command(bot_name, BotCommand::Resume).await
    }

    pub async fn emergency_stop_bot(&self, bot_name: &str, reason: String) -> Result<(), EngineError> {
        self.send_command(bot_name, BotCommand::EmergencyStop(reason)).await
    }

    async fn send_command(&self, bot_name: &str, command: BotCommand) -> Result<(), EngineError> {
        let handle = self
            .bots
            .get(bot_name)
            .ok_or_else(|| EngineError::BotNotFound(bot_name.to_string()))?;
        handle
            .commands
            .send(command)
            .await
            .map_err(|_| EngineError::BotNotFound(bot_name.to_string()))
    }

    /// Blocks until Ctrl-C (or another external shutdown trigger) arrives,
    /// then fans cancellation out to every bot and waits for each to
    /// checkpoint and exit cleanly.
    pub async fn run_until_shutdown(mut self) -> Result<(), EngineError> {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| EngineError::Configuration(format!("failed to listen for shutdown signal: {e}")))?;
        tracing::info!("shutdown signal received, stopping all bots");
        self.shutdown().await
    }

    pub async fn shutdown(&mut self) -> Result<(), EngineError> {
        for (name, handle) in self.bots.drain() {
            let _ = handle.cancel.send(true);
            match handle.task.await {
                Ok(Ok(())) => tracing::info!(bot = %name, "bot shut down cleanly"),
                Ok(Err(err)) => tracing::error!(bot = %name, %err, "bot exited with an error"),
                Err(join_err) => tracing::error!(bot = %name, %join_err, "bot task panicked"),
            }
        }
        Ok(())
    }
}
