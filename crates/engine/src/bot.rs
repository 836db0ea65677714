use crate::error::EngineError;
use crate::reconciler::{reconcile_open_orders, ReconciledOrder};
use crate::risk_manager::RiskCoordinator;
use crate::util::{create_strategy_runner, strategy_allowed_in_regime, StrategyRunner};
use adapter::{ExchangeAdapter, PlaceOrderRequest};
use chrono::{DateTime, Utc};
use configuration::BotConfig;
use core_types::{
    BotLifecycle, MarketSnapshot, Order, OrderRole, OrderSide, OrderStatus, OrderType, RegimeState,
    StrategyKind,
};
use events::{
    BotStateChanged, DealClosed, DealOpened, EmergencyStop, EngineEvent, EventBus, OrderCancelled,
    OrderError, OrderFilled, OrderPlaced, PhaseAdvanced, RegimeChanged, SignalGenerated,
    SignalRejected,
};
use state_store::{BotSnapshot, StateStoreRepository};
use std::collections::HashMap;
use std::sync::Arc;
use strategies::{Intent, MarketRegimeDetector};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

/// Price must be refreshed at least this often for the tick loop to trust it.
const PRICE_REFRESH_MAX_AGE: chrono::Duration = chrono::Duration::seconds(5);
/// The Market Regime Detector is re-run at most this often; zone/indicator
/// recomputation is too expensive to do on every tick.
const REGIME_REFRESH_MAX_AGE: chrono::Duration = chrono::Duration::seconds(60);
/// How often the bot's full state is durably checkpointed.
const CHECKPOINT_MAX_AGE: chrono::Duration = chrono::Duration::seconds(30);
/// A Signal more than this far from the current market price is considered
/// stale and rejected before it reaches the risk gate.
const PRICE_STALENESS_PCT: rust_decimal::Decimal = rust_decimal_macros::dec!(0.02);
/// How many closed candles the regime detector and trend-following engines
/// are fed on each refresh.
const HISTORY_CANDLES: u32 = 200;
const HISTORY_TIMEFRAME: &str = "1h";

/// Commands the multi-bot supervisor or an external control surface can send
/// to a single running bot task.
#[derive(Debug, Clone)]
pub enum BotCommand {
    Pause,
    Resume,
    EmergencyStop(String),
}

/// Everything one Bot Orchestrator instance owns. Exactly one `run_bot` task
/// owns a given `BotRuntime` for its whole lifetime — no field here is
/// shared outside of the `Arc`s it already holds (adapter, store, risk).
pub struct BotRuntime {
    bot_name: String,
    symbol: String,
    config: BotConfig,
    adapter: Arc<dyn ExchangeAdapter>,
    store: Arc<StateStoreRepository>,
    events: EventBus,
    risk: Arc<RiskCoordinator>,
    runner: StrategyRunner,
    regime_detector: MarketRegimeDetector,
    lifecycle: BotLifecycle,
    snapshot: MarketSnapshot,
    regime_state: RegimeState,
    history: Vec<core_types::Kline>,
    local_orders: HashMap<Uuid, Order>,
    order_owner: HashMap<Uuid, StrategyKind>,
    reported_closed_deals: std::collections::HashSet<Uuid>,
    reported_opened_deals: std::collections::HashSet<Uuid>,
    equity: rust_decimal::Decimal,
    last_price_refresh: DateTime<Utc>,
    last_regime_refresh: DateTime<Utc>,
    last_checkpoint: DateTime<Utc>,
}

impl BotRuntime {
    pub fn new(
        config: BotConfig,
        adapter: Arc<dyn ExchangeAdapter>,
        store: Arc<StateStoreRepository>,
        events: EventBus,
        risk: Arc<RiskCoordinator>,
    ) -> Result<Self, EngineError> {
        let runner = create_strategy_runner(&config)?;
        let regime_detector = MarketRegimeDetector::new(14, 20);
        Ok(Self {
            bot_name: config.name.clone(),
            symbol: config.symbol.clone(),
            config,
            adapter,
            store,
            events,
            risk,
            runner,
            regime_detector,
            lifecycle: BotLifecycle::Initializing,
            snapshot: MarketSnapshot::default(),
            regime_state: RegimeState::default(),
            history: Vec::new(),
            local_orders: HashMap::new(),
            order_owner: HashMap::new(),
            reported_closed_deals: std::collections::HashSet::new(),
            reported_opened_deals: std::collections::HashSet::new(),
            equity: rust_decimal::Decimal::ZERO,
            last_price_refresh: DateTime::<Utc>::MIN_UTC,
            last_regime_refresh: DateTime::<Utc>::MIN_UTC,
            last_checkpoint: DateTime::<Utc>::MIN_UTC,
        })
    }

    fn set_lifecycle(&mut self, new_state: BotLifecycle, reason: Option<String>) {
        if self.lifecycle == new_state {
            return;
        }
        let previous = self.lifecycle;
        self.lifecycle = new_state;
        self.events.publish(EngineEvent::BotStateChanged(BotStateChanged {
            bot_name: self.bot_name.clone(),
            previous,
            current: new_state,
            reason,
            at: Utc::now(),
        }));
    }

    /// Determines which sub-engine a restored order belongs to, from its
    /// role alone (the only strategy-identifying field an `Order` carries).
    fn infer_owner(&self, role: &OrderRole) -> StrategyKind {
        match role {
            OrderRole::GridBuy(_) | OrderRole::GridSell(_) => StrategyKind::Grid,
            _ if self.config.strategy == StrategyKind::Hybrid => StrategyKind::Dca,
            _ => self.config.strategy,
        }
    }

    /// Restores whatever a prior checkpoint left behind, then reconciles it
    /// against the exchange before the tick loop places anything new.
    ///
    /// Restoring a strategy engine's own internal bookkeeping (an in-flight
    /// DCA Deal, a Grid ladder's level occupancy) from the snapshot isn't
    /// supported — `Strategy` has no setter for it — so on restart every
    /// engine starts cold and only learns about still-open orders through
    /// this reconciliation pass. Capital Manager phase resumes fresh at
    /// phase 1 for the same reason.
    pub async fn start(&mut self) -> Result<(), EngineError> {
        if let Some(snapshot) = self.store.load_snapshot(&self.bot_name).await? {
            for order in snapshot.open_orders {
                let kind = self.infer_owner(&order.role);
                self.order_owner.insert(order.local_id, kind);
                self.local_orders.insert(order.local_id, order);
            }
            self.regime_state = snapshot.regime;
            tracing::info!(bot = %self.bot_name, orders = self.local_orders.len(), "restored prior snapshot");
        }

        let balances = self.adapter.fetch_balance().await?;
        let (_, quote_total) = balances.get("USDT").copied().unwrap_or_default();
        self.equity = quote_total;
        let total_capital = self.equity * self.config.capital_allocation_pct;
        self.risk.register_bot(&self.bot_name, total_capital).await;

        self.refresh_price().await?;
        self.refresh_history_and_regime().await?;
        self.reconcile(true).await?;

        let target = if self.config.auto_start {
            BotLifecycle::Running
        } else {
            BotLifecycle::Initializing
        };
        self.set_lifecycle(target, Some("startup complete".to_string()));
        Ok(())
    }

    async fn refresh_price(&mut self) -> Result<(), EngineError> {
        let price = self.adapter.fetch_price(&self.symbol).await?;
        self.snapshot.last_price = price;
        self.snapshot.last_update = Some(Utc::now());
        self.last_price_refresh = Utc::now();
        Ok(())
    }

    async fn refresh_history_and_regime(&mut self) -> Result<(), EngineError> {
        self.history = self
            .adapter
            .fetch_ohlcv(&self.symbol, HISTORY_TIMEFRAME, HISTORY_CANDLES)
            .await?;
        let previous = self.regime_state.regime;
        self.regime_state = self.regime_detector.classify(&self.history);
        self.last_regime_refresh = Utc::now();
        if previous != self.regime_state.regime {
            self.events.publish(EngineEvent::RegimeChanged(RegimeChanged {
                symbol: self.symbol.clone(),
                previous,
                current: self.regime_state.regime,
                confidence: self.regime_state.confidence,
                at: Utc::now(),
            }));
        }
        Ok(())
    }

    /// Reconciles every locally-tracked live order against the exchange's
    /// authoritative open-order set, applying fills/cancellations back into
    /// strategy state. Runs at startup and on every tick, always before any
    /// new order is placed.
    async fn reconcile(&mut self, is_startup: bool) -> Result<(), EngineError> {
        let outcomes = reconcile_open_orders(&self.adapter, &self.symbol, &self.local_orders).await?;
        for (local_id, outcome) in outcomes {
            match outcome {
                ReconciledOrder::Unchanged => {}
                ReconciledOrder::Filled(exchange_order) => {
                    let (kind, follow_ups) = self.apply_fill(local_id, exchange_order).await?;
                    for intent in follow_ups {
                        self.execute_intent(kind, intent).await?;
                    }
                }
                ReconciledOrder::Cancelled(exchange_order) => {
                    if let Some(local) = self.local_orders.get_mut(&local_id) {
                        let _ = local.transition(OrderStatus::Cancelled);
                    }
                    self.events.publish(EngineEvent::OrderCancelled(OrderCancelled {
                        order: exchange_order,
                        at: Utc::now(),
                    }));
                }
                ReconciledOrder::Errored(exchange_order) => {
                    tracing::warn!(bot = %self.bot_name, order = %local_id, "order could not be reconciled, marking as errored");
                    if let Some(local) = self.local_orders.get_mut(&local_id) {
                        local.status = OrderStatus::Error;
                    }
                    self.risk.record_error(&self.bot_name).await;
                    self.events.publish(EngineEvent::OrderError(OrderError {
                        bot_name: self.bot_name.clone(),
                        symbol: exchange_order.symbol.clone(),
                        message: "order could not be reconciled against exchange state".to_string(),
                        at: Utc::now(),
                    }));
                }
            }
        }
        if is_startup {
            tracing::info!(bot = %self.bot_name, "startup reconciliation complete");
        }
        Ok(())
    }

    async fn apply_fill(
        &mut self,
        local_id: Uuid,
        exchange_order: Order,
    ) -> Result<(StrategyKind, Vec<Intent>), EngineError> {
        let kind = self
            .order_owner
            .get(&local_id)
            .copied()
            .unwrap_or(self.config.strategy);
        let fill_price = exchange_order.price.unwrap_or(self.snapshot.last_price);
        let follow_ups = self.runner.on_order_filled(kind, &exchange_order, fill_price);
        self.risk.record_trade(&self.bot_name).await;
        if let Some(local) = self.local_orders.get_mut(&local_id) {
            *local = exchange_order.clone();
        }
        self.events.publish(EngineEvent::OrderFilled(OrderFilled {
            order: exchange_order,
            fill_amount: self.local_orders.get(&local_id).map(|o| o.filled_amount).unwrap_or_default(),
            fill_price,
            at: Utc::now(),
        }));
        if let Some(advanced_phase) = self.risk.maybe_advance_phase(&self.bot_name).await {
            let allocated = self.risk.allocated_capital(&self.bot_name).await.unwrap_or_default();
            self.events.publish(EngineEvent::PhaseAdvanced(PhaseAdvanced {
                bot_name: self.bot_name.clone(),
                previous_phase: advanced_phase - 1,
                current_phase: advanced_phase,
                allocated_capital: allocated,
                at: Utc::now(),
            }));
        }
        Ok((kind, follow_ups))
    }

    async fn execute_intent(&mut self, kind: StrategyKind, intent: Intent) -> Result<(), EngineError> {
        match intent {
            Intent::Noop => Ok(()),
            Intent::PlaceOrder(mut order) => {
                if !strategy_allowed_in_regime(kind, self.regime_state.regime) {
                    tracing::debug!(bot = %self.bot_name, ?kind, regime = ?self.regime_state.regime, "order suppressed by regime filter");
                    return Ok(());
                }
                let request = PlaceOrderRequest {
                    symbol: order.symbol.clone(),
                    side: order.side,
                    order_type: order.order_type,
                    amount: order.amount,
                    price: order.price,
                    post_only: false,
                    time_in_force: None,
                };
                match self.adapter.place_order(request).await {
                    Ok(placed) => {
                        order.exchange_id = placed.exchange_id;
                        order.status = placed.status;
                        order.filled_amount = placed.filled_amount;
                        order.acknowledged_at = placed.acknowledged_at;
                        order.filled_at = placed.filled_at;
                        if placed.price.is_some() {
                            order.price = placed.price;
                        }
                        self.order_owner.insert(order.local_id, kind);
                        self.local_orders.insert(order.local_id, order.clone());
                        self.events.publish(EngineEvent::OrderPlaced(OrderPlaced {
                            order: order.clone(),
                            at: Utc::now(),
                        }));
                        if order.status == OrderStatus::Closed || order.status == OrderStatus::PartiallyFilled {
                            let (kind, follow_ups) = self.apply_fill(order.local_id, order).await?;
                            for intent in follow_ups {
                                Box::pin(self.execute_intent(kind, intent)).await?;
                            }
                        }
                        Ok(())
                    }
                    Err(err) => {
                        self.risk.record_error(&self.bot_name).await;
                        self.events.publish(EngineEvent::OrderError(OrderError {
                            bot_name: self.bot_name.clone(),
                            symbol: order.symbol.clone(),
                            message: err.to_string(),
                            at: Utc::now(),
                        }));
                        Ok(())
                    }
                }
            }
            Intent::CancelOrder(local_id) => {
                let Some(order) = self.local_orders.get(&local_id).cloned() else {
                    return Ok(());
                };
                let Some(exchange_id) = order.exchange_id.as_deref() else {
                    return Ok(());
                };
                match self.adapter.cancel_order(&order.symbol, exchange_id).await? {
                    adapter::CancelOutcome::Cancelled => {
                        if let Some(local) = self.local_orders.get_mut(&local_id) {
                            let _ = local.transition(OrderStatus::Cancelled);
                        }
                        self.events.publish(EngineEvent::OrderCancelled(OrderCancelled {
                            order,
                            at: Utc::now(),
                        }));
                    }
                    adapter::CancelOutcome::Unknown => {
                        // Likely already settled; the next reconciliation pass will catch it.
                    }
                }
                Ok(())
            }
            Intent::Propose(signal) => {
                self.events.publish(EngineEvent::SignalGenerated(SignalGenerated {
                    bot_name: self.bot_name.clone(),
                    signal_id: signal.id,
                    at: Utc::now(),
                }));
                if signal.is_expired(Utc::now()) {
                    return self.reject_signal(signal.id, "signal expired before execution").await;
                }
                if signal.price_deviation_pct(self.snapshot.last_price) > PRICE_STALENESS_PCT {
                    return self.reject_signal(signal.id, "market price has moved beyond the staleness budget").await;
                }
                if !strategy_allowed_in_regime(kind, self.regime_state.regime) {
                    return self.reject_signal(signal.id, "current market regime disallows this strategy").await;
                }
                let open_deals = self.runner.deals_snapshot().iter().filter(|d| d.active).count() as u32;
                let amount = match self.risk.check_trade(&self.bot_name, &signal, self.equity, open_deals).await {
                    Ok(amount) => amount,
                    Err(err) => return self.reject_signal(signal.id, &err.to_string()).await,
                };
                let side = match signal.direction {
                    core_types::Direction::Long => OrderSide::Buy,
                    core_types::Direction::Short => OrderSide::Sell,
                };
                let mut order = Order::new(
                    self.bot_name.clone(),
                    self.symbol.clone(),
                    side,
                    OrderType::Market,
                    None,
                    amount,
                    OrderRole::BaseOrder,
                );
                order.strategy_tag = Some(signal.id.to_string());
                Box::pin(self.execute_intent(kind, Intent::PlaceOrder(order))).await

            }
        }
    }

    async fn reject_signal(&self, signal_id: Uuid, reason: &str) -> Result<(), EngineError> {
        self.events.publish(EngineEvent::SignalRejected(SignalRejected {
            bot_name: self.bot_name.clone(),
            signal_id,
            reason: reason.to_string(),
            at: Utc::now(),
        }));
        Ok(())
    }

    /// Runs one full tick: refresh gates, evaluate active strategies,
    /// execute resulting intents, reconcile, and checkpoint — in that order,
    /// as the orchestrator's tick-loop contract requires.
    pub async fn tick(&mut self) -> Result<(), EngineError> {
        let now = Utc::now();
        if now - self.last_price_refresh > PRICE_REFRESH_MAX_AGE {
            self.refresh_price().await?;
        }
        if now - self.last_regime_refresh > REGIME_REFRESH_MAX_AGE {
            self.refresh_history_and_regime().await?;
        }

        if self.lifecycle == BotLifecycle::Running {
            if now - self.last_price_refresh > PRICE_REFRESH_MAX_AGE {
                tracing::warn!(bot = %self.bot_name, "skipping evaluation: price data stale");
            } else {
                let intents = self.runner.evaluate(&self.snapshot, &self.history)?;
                for (kind, intent) in intents {
                    self.execute_intent(kind, intent).await?;
                }
            }
        }

        self.reconcile(false).await?;

        if self.lifecycle == BotLifecycle::Running {
            let active_deals = self.runner.deals_snapshot();
            for deal in active_deals.iter().filter(|d| d.active) {
                if self.reported_opened_deals.insert(deal.id) {
                    self.events.publish(EngineEvent::DealOpened(DealOpened {
                        bot_name: self.bot_name.clone(),
                        deal_id: deal.id,
                        entry_price: deal.average_entry,
                        amount: deal.base_amount,
                        at: Utc::now(),
                    }));
                }
            }
            for deal in active_deals.iter().filter(|d| !d.active) {
                if let Some(reason) = deal.close_reason {
                    if self.reported_closed_deals.insert(deal.id) {
                        self.risk.record_fill(deal.realized_pnl, self.equity).await;
                        self.events.publish(EngineEvent::DealClosed(DealClosed {
                            bot_name: self.bot_name.clone(),
                            deal_id: deal.id,
                            reason,
                            realized_pnl: deal.realized_pnl,
                            at: Utc::now(),
                        }));
                    }
                }
            }
            if let risk::RiskDecision::Halt(reason) = self.risk.evaluate_portfolio().await {
                self.emergency_stop(reason).await?;
            }
        }

        if Utc::now() - self.last_checkpoint > CHECKPOINT_MAX_AGE {
            self.checkpoint().await?;
        }
        Ok(())
    }

    async fn checkpoint(&mut self) -> Result<(), EngineError> {
        let phase = self.risk.capital_phase(&self.bot_name).await.unwrap_or(1);
        let allocated = self.risk.allocated_capital(&self.bot_name).await.unwrap_or_default();
        let snapshot = BotSnapshot {
            bot_name: self.bot_name.clone(),
            symbol: self.symbol.clone(),
            strategy: self.config.strategy,
            lifecycle: self.lifecycle,
            regime: self.regime_state,
            active_deals: self.runner.deals_snapshot(),
            open_orders: self.local_orders.values().filter(|o| !o.status.is_terminal()).cloned().collect(),
            grid_state: self.runner.grid_state(),
            daily_realized_pnl_pct: rust_decimal::Decimal::ZERO,
            consecutive_losses: 0,
            capital_phase: phase,
            allocated_capital: allocated,
            last_error: None,
            checkpointed_at: Utc::now(),
        };
        self.store.save_snapshot(&snapshot).await?;
        for deal in snapshot.active_deals.iter().filter(|d| !d.active) {
            self.store.append_trade(&self.bot_name, deal).await?;
        }
        self.last_checkpoint = Utc::now();
        Ok(())
    }

    pub async fn emergency_stop(&mut self, reason: String) -> Result<(), EngineError> {
        tracing::error!(bot = %self.bot_name, %reason, "emergency stop triggered");
        let _ = self.adapter.cancel_all(&self.symbol).await;
        self.set_lifecycle(BotLifecycle::Error, Some(reason.clone()));
        self.events.publish(EngineEvent::EmergencyStop(EmergencyStop {
            bot_name: Some(self.bot_name.clone()),
            reason,
            at: Utc::now(),
        }));
        self.checkpoint().await
    }
}

/// The per-bot async task: runs `BotRuntime::start`, then ticks on a fixed
/// interval until cooperative cancellation fires or an unrecoverable error
/// surfaces. Control commands (pause/resume/emergency stop) are applied
/// between ticks, never interrupting one mid-flight.
pub async fn run_bot(
    mut runtime: BotRuntime,
    mut commands: mpsc::Receiver<BotCommand>,
    mut cancel: watch::Receiver<bool>,
) -> Result<(), EngineError> {
    runtime.start().await?;
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if runtime.lifecycle == BotLifecycle::Error {
                    break;
                }
                if let Err(err) = runtime.tick().await {
                    tracing::error!(bot = %runtime.bot_name, %err, "tick failed");
                    runtime.risk.record_error(&runtime.bot_name).await;
                }
            }
            Some(command) = commands.recv() => {
                match command {
                    BotCommand::Pause => runtime.set_lifecycle(BotLifecycle::Paused, Some("paused by operator".to_string())),
                    BotCommand::Resume => runtime.set_lifecycle(BotLifecycle::Running, Some("resumed by operator".to_string())),
                    BotCommand::EmergencyStop(reason) => {
                        runtime.emergency_stop(reason).await?;
                        break;
                    }
                }
            }
            _ = cancel.changed() => {
                if *cancel.borrow() {
                    tracing::info!(bot = %runtime.bot_name, "shutdown signal received");
                    runtime.set_lifecycle(BotLifecycle::Stopped, Some("engine shutdown".to_string()));
                    runtime.checkpoint().await?;
                    break;
                }
            }
        }
    }
    Ok(())
}
