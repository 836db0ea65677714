use crate::error::StateStoreError;
use chrono::{DateTime, Utc};
use core_types::{BotLifecycle, Deal, GridState, Order, RegimeState, StrategyKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

/// The full state of one bot as of its last checkpoint: everything the
/// orchestrator needs to resume after a restart without re-deriving it from
/// exchange state alone. Serialized into the `bot_snapshots.payload` JSONB
/// column; the columns alongside it exist purely so an operator can query
/// lifecycle/regime without deserializing the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSnapshot {
    pub bot_name: String,
    pub symbol: String,
    pub strategy: StrategyKind,
    pub lifecycle: BotLifecycle,
    pub regime: RegimeState,
    pub active_deals: Vec<Deal>,
    pub open_orders: Vec<Order>,
    pub grid_state: Option<GridState>,
    pub daily_realized_pnl_pct: Decimal,
    pub consecutive_losses: u32,
    pub capital_phase: u32,
    pub allocated_capital: Decimal,
    pub last_error: Option<String>,
    pub checkpointed_at: DateTime<Utc>,
}

/// The `StateStoreRepository` provides a high-level, application-specific
/// interface to the database. It encapsulates all SQL queries and data
/// access logic; nothing outside this crate builds a query string.
#[derive(Debug, Clone)]
pub struct StateStoreRepository {
    pool: PgPool,
}

impl StateStoreRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Upserts a bot's snapshot. Each bot has exactly one row, addressed by
    /// `bot_name`; a checkpoint always replaces the prior snapshot in full.
    pub async fn save_snapshot(&self, snapshot: &BotSnapshot) -> Result<(), StateStoreError> {
        let payload = serde_json::to_value(snapshot)?;
        sqlx::query(
            r#"
            INSERT INTO bot_snapshots (bot_name, symbol, lifecycle, regime, checkpointed_at, payload)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (bot_name) DO UPDATE SET
                symbol = EXCLUDED.symbol,
                lifecycle = EXCLUDED.lifecycle,
                regime = EXCLUDED.regime,
                checkpointed_at = EXCLUDED.checkpointed_at,
                payload = EXCLUDED.payload
            "#,
        )
        .bind(&snapshot.bot_name)
        .bind(&snapshot.symbol)
        .bind(serde_json::to_value(&snapshot.lifecycle)?)
        .bind(serde_json::to_value(&snapshot.regime.regime)?)
        .bind(snapshot.checkpointed_at)
        .bind(&payload)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Loads the most recent snapshot for `bot_name`, if one exists yet.
    pub async fn load_snapshot(&self, bot_name: &str) -> Result<Option<BotSnapshot>, StateStoreError> {
        let row = sqlx::query("SELECT payload FROM bot_snapshots WHERE bot_name = $1")
            .bind(bot_name)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let payload: serde_json::Value = row.get("payload");
                Ok(Some(serde_json::from_value(payload)?))
            }
            None => Ok(None),
        }
    }

    /// Every bot name with a persisted snapshot, for startup reconciliation
    /// of bots that were running before a restart.
    pub async fn list_bot_names(&self) -> Result<Vec<String>, StateStoreError> {
        let rows = sqlx::query("SELECT bot_name FROM bot_snapshots")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("bot_name")).collect())
    }

    /// Appends the current state of an order to its append-only history.
    /// Never updates a prior row: `latest_order` always reads the most
    /// recently appended record for `(bot_name, local_order_id)`.
    pub async fn append_order(&self, bot_name: &str, order: &Order) -> Result<(), StateStoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                bot_name, local_order_id, exchange_id, symbol, side, order_type,
                price, amount, filled_amount, status, role, recorded_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(bot_name)
        .bind(order.local_id)
        .bind(&order.exchange_id)
        .bind(&order.symbol)
        .bind(serde_json::to_value(&order.side)?)
        .bind(serde_json::to_value(&order.order_type)?)
        .bind(order.price)
        .bind(order.amount)
        .bind(order.filled_amount)
        .bind(serde_json::to_value(&order.status)?)
        .bind(serde_json::to_value(&order.role)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recently appended record for a single order.
    pub async fn latest_order(
        &self,
        bot_name: &str,
        local_order_id: Uuid,
    ) -> Result<Option<Order>, StateStoreError> {
        let row = sqlx::query(
            r#"
            SELECT local_order_id, exchange_id, symbol, side, order_type, price,
                   amount, filled_amount, status, role
            FROM orders
            WHERE bot_name = $1 AND local_order_id = $2
            ORDER BY recorded_at DESC
            LIMIT 1
            "#,
        )
        .bind(bot_name)
        .bind(local_order_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else { return Ok(None) };
        let side: serde_json::Value = row.get("side");
        let order_type: serde_json::Value = row.get("order_type");
        let status: serde_json::Value = row.get("status");
        let role: serde_json::Value = row.get("role");
        Ok(Some(Order {
            local_id: row.get("local_order_id"),
            exchange_id: row.get("exchange_id"),
            bot_name: bot_name.to_string(),
            symbol: row.get("symbol"),
            side: serde_json::from_value(side)?,
            order_type: serde_json::from_value(order_type)?,
            price: row.get("price"),
            amount: row.get("amount"),
            filled_amount: row.get("filled_amount"),
            status: serde_json::from_value(status)?,
            role: serde_json::from_value(role)?,
            strategy_tag: None,
            created_at: Utc::now(),
            acknowledged_at: None,
            filled_at: None,
            cancelled_at: None,
        }))
    }

    /// Appends a closed Deal to the append-only trade history.
    pub async fn append_trade(&self, bot_name: &str, deal: &Deal) -> Result<(), StateStoreError> {
        sqlx::query(
            r#"
            INSERT INTO trades (
                trade_id, bot_name, symbol, direction, base_amount, quote_spent,
                average_entry, realized_pnl, close_reason, opened_at, closed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(deal.id)
        .bind(bot_name)
        .bind(&deal.symbol)
        .bind(serde_json::to_value(&deal.direction)?)
        .bind(deal.base_amount)
        .bind(deal.quote_spent)
        .bind(deal.average_entry)
        .bind(deal.realized_pnl)
        .bind(deal.close_reason.map(|r| serde_json::to_value(r)).transpose()?)
        .bind(deal.opened_at)
        .bind(deal.closed_at.unwrap_or_else(Utc::now))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Closed-trade history for a bot, oldest first.
    pub async fn list_trades(&self, bot_name: &str) -> Result<Vec<ClosedTrade>, StateStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT trade_id, symbol, direction, base_amount, average_entry,
                   realized_pnl, close_reason, opened_at, closed_at
            FROM trades
            WHERE bot_name = $1
            ORDER BY closed_at ASC
            "#,
        )
        .bind(bot_name)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let direction: core_types::Direction = serde_json::from_value(row.get("direction"))?;
                let close_reason: Option<core_types::CloseReason> =
                    row.get::<Option<serde_json::Value>, _>("close_reason")
                        .map(serde_json::from_value)
                        .transpose()?;
                Ok(ClosedTrade {
                    trade_id: row.get("trade_id"),
                    symbol: row.get("symbol"),
                    direction: format!("{direction:?}"),
                    base_amount: row.get("base_amount"),
                    average_entry: row.get("average_entry"),
                    realized_pnl: row.get("realized_pnl"),
                    close_reason: close_reason.map(|r| format!("{r:?}")),
                    opened_at: row.get("opened_at"),
                    closed_at: row.get("closed_at"),
                })
            })
            .collect()
    }
}

/// A read projection of a closed trade, independent of `core_types::Deal`
/// so history queries don't need the full in-flight Deal shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub trade_id: Uuid,
    pub symbol: String,
    pub direction: String,
    pub base_amount: Decimal,
    pub average_entry: Decimal,
    pub realized_pnl: Decimal,
    pub close_reason: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}
