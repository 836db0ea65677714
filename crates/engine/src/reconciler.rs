use crate::error::EngineError;
use adapter::ExchangeAdapter;
use core_types::{Order, OrderStatus};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// The outcome of reconciling a single locally-tracked order against the
/// exchange's authoritative state.
#[derive(Debug, Clone)]
pub enum ReconciledOrder {
    /// Still live on the exchange and still tracked locally; nothing to do.
    Unchanged,
    /// Closed (fully filled) on the exchange but the orchestrator's local
    /// copy hadn't caught up yet.
    Filled(Order),
    /// Cancelled on the exchange without the orchestrator's involvement
    /// (e.g. operator action on the exchange UI, or a post-only reject).
    Cancelled(Order),
    /// The exchange could not account for the order at all, or its status
    /// couldn't be classified into Filled/Cancelled; surfaced so the caller
    /// can mark it `OrderStatus::Error` rather than keep trusting it.
    Errored(Order),
}

/// Reconciles every locally-tracked live order for `symbol` against the
/// exchange's authoritative open-order set.
///
/// Per the orchestrator's tick-loop contract, this runs both at bot startup
/// and on every tick, before any new order is placed: first the
/// authoritative set (`fetch_open_orders`) is pulled, then every order this
/// process believes is still live but is missing from that set is looked up
/// individually (`fetch_order`) to learn its terminal status. An order the
/// exchange still lists as open is left untouched — `local_orders` itself is
/// not mutated here, only read; the caller applies the returned outcomes.
pub async fn reconcile_open_orders(
    adapter: &Arc<dyn ExchangeAdapter>,
    symbol: &str,
    local_orders: &HashMap<Uuid, Order>,
) -> Result<Vec<(Uuid, ReconciledOrder)>, EngineError> {
    let authoritative = adapter.fetch_open_orders(symbol).await?;
    let live_exchange_ids: std::collections::HashSet<&str> = authoritative
        .iter()
        .filter_map(|o| o.exchange_id.as_deref())
        .collect();

    let mut outcomes = Vec::with_capacity(local_orders.len());
    for (local_id, order) in local_orders.iter() {
        if order.status.is_terminal() {
            continue;
        }
        let Some(exchange_id) = order.exchange_id.as_deref() else {
            // Never acknowledged by the exchange; nothing to reconcile yet.
            outcomes.push((*local_id, ReconciledOrder::Unchanged));
            continue;
        };
        if live_exchange_ids.contains(exchange_id) {
            outcomes.push((*local_id, ReconciledOrder::Unchanged));
            continue;
        }

        tracing::info!(
            symbol,
            order_id = %local_id,
            exchange_id,
            "order missing from exchange's open set, fetching terminal status"
        );
        match adapter.fetch_order(symbol, exchange_id).await {
            Ok(fetched) => {
                let outcome = match fetched.status {
                    OrderStatus::Closed => ReconciledOrder::Filled(fetched),
                    OrderStatus::Cancelled => ReconciledOrder::Cancelled(fetched),
                    _ => ReconciledOrder::Errored(fetched),
                };
                outcomes.push((*local_id, outcome));
            }
            Err(err) => {
                tracing::warn!(symbol, exchange_id, error = %err, "failed to fetch terminal order status");
                let mut errored = order.clone();
                let _ = errored.transition(OrderStatus::Error);
                outcomes.push((*local_id, ReconciledOrder::Errored(errored)));
            }
        }
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapter::{PlaceOrderRequest, SimulatedAdapter};
    use core_types::{OrderRole, OrderSide, OrderType};
    use rust_decimal_macros::dec;
    use std::collections::HashMap as Map;

    fn balances() -> Map<String, (rust_decimal::Decimal, rust_decimal::Decimal)> {
        let mut m = Map::new();
        m.insert("USDT".to_string(), (dec!(10000), dec!(10000)));
        m
    }

    #[tokio::test]
    async fn unchanged_when_order_still_open_on_exchange() {
        let sim = SimulatedAdapter::new(balances());
        sim.set_price("BTCUSDT", dec!(100));
        let placed = sim
            .place_order(PlaceOrderRequest {
                symbol: "BTCUSDT".to_string(),
                side: OrderSide::Buy,
                order_type: OrderType::Limit,
                amount: dec!(1),
                price: Some(dec!(50)),
                post_only: false,
                time_in_force: None,
            })
            .await
            .unwrap();
        let adapter: Arc<dyn ExchangeAdapter> = Arc::new(sim);
        let mut locals = HashMap::new();
        locals.insert(placed.local_id, placed);

        let outcomes = reconcile_open_orders(&adapter, "BTCUSDT", &locals).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].1, ReconciledOrder::Unchanged));
    }

    #[tokio::test]
    async fn filled_when_market_order_settles_instantly() {
        let sim = SimulatedAdapter::new(balances());
        sim.set_price("BTCUSDT", dec!(100));
        let placed = sim
            .place_order(PlaceOrderRequest {
                symbol: "BTCUSDT".to_string(),
                side: OrderSide::Buy,
                order_type: OrderType::Market,
                amount: dec!(1),
                price: None,
                post_only: false,
                time_in_force: None,
            })
            .await
            .unwrap();
        let adapter: Arc<dyn ExchangeAdapter> = Arc::new(sim);
        let mut locals = HashMap::new();
        let mut local_copy = Order::new(
            "bot",
            "BTCUSDT",
            OrderSide::Buy,
            OrderType::Market,
            None,
            dec!(1),
            OrderRole::BaseOrder,
        );
        local_copy.exchange_id = placed.exchange_id.clone();
        local_copy.status = OrderStatus::Open;
        locals.insert(local_copy.local_id, local_copy);

        let outcomes = reconcile_open_orders(&adapter, "BTCUSDT", &locals).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0].1, ReconciledOrder::Filled(_)));
    }
}
