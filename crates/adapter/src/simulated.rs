use crate::{AdapterError, CancelOutcome, ExchangeAdapter, PlaceOrderRequest};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{Kline, Order, OrderStatus, OrderType};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;

/// A paper-trading `ExchangeAdapter`: fills market orders instantly at the
/// last price set via [`SimulatedAdapter::set_price`] and rests limit
/// orders open until the caller moves the price across them. Used for
/// `dry_run` bots so the rest of the engine — risk gate, strategy
/// reconciliation, event publishing — runs unmodified against a fake
/// exchange.
pub struct SimulatedAdapter {
    prices: Mutex<HashMap<String, Decimal>>,
    history: Mutex<HashMap<String, Vec<Kline>>>,
    balances: Mutex<HashMap<String, (Decimal, Decimal)>>,
    orders: Mutex<HashMap<String, Order>>,
    next_id: Mutex<u64>,
}

impl SimulatedAdapter {
    pub fn new(initial_balances: HashMap<String, (Decimal, Decimal)>) -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
            balances: Mutex::new(initial_balances),
            orders: Mutex::new(HashMap::new()),
            next_id: Mutex::new(1),
        }
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().expect("poisoned").insert(symbol.to_string(), price);
        self.match_resting_orders(symbol, price);
    }

    pub fn set_history(&self, symbol: &str, klines: Vec<Kline>) {
        self.history.lock().expect("poisoned").insert(symbol.to_string(), klines);
    }

    fn next_exchange_id(&self) -> String {
        let mut guard = self.next_id.lock().expect("poisoned");
        let id = *guard;
        *guard += 1;
        format!("sim-{id}")
    }

    /// A resting limit order fills the instant the simulated price trades
    /// through its limit — mirroring a real order book without modeling
    /// partial fills or slippage.
    fn match_resting_orders(&self, symbol: &str, price: Decimal) {
        let mut orders = self.orders.lock().expect("poisoned");
        for order in orders.values_mut() {
            if order.symbol != symbol || order.status.is_terminal() {
                continue;
            }
            let Some(limit_price) = order.price else { continue };
            let crossed = match order.side {
                core_types::OrderSide::Buy => price <= limit_price,
                core_types::OrderSide::Sell => price >= limit_price,
            };
            if crossed {
                let fill_amount = order.amount - order.filled_amount;
                if let Err(err) = order.apply_fill(fill_amount, Utc::now()) {
                    tracing::error!(order = %order.local_id, %err, "simulated fill violated order invariants");
                }
            }
        }
    }
}

#[async_trait]
impl ExchangeAdapter for SimulatedAdapter {
    async fn fetch_price(&self, symbol: &str) -> Result<Decimal, AdapterError> {
        self.prices
            .lock()
            .expect("poisoned")
            .get(symbol)
            .copied()
            .ok_or_else(|| AdapterError::Unknown(format!("no simulated price for {symbol}")))
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        _timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, AdapterError> {
        let history = self.history.lock().expect("poisoned");
        let candles = history.get(symbol).cloned().unwrap_or_default();
        let start = candles.len().saturating_sub(limit as usize);
        Ok(candles[start..].to_vec())
    }

    async fn fetch_balance(&self) -> Result<HashMap<String, (Decimal, Decimal)>, AdapterError> {
        Ok(self.balances.lock().expect("poisoned").clone())
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<Order>, AdapterError> {
        Ok(self
            .orders
            .lock()
            .expect("poisoned")
            .values()
            .filter(|o| o.symbol == symbol && !o.status.is_terminal())
            .cloned()
            .collect())
    }

    async fn fetch_order(&self, _symbol: &str, exchange_id: &str) -> Result<Order, AdapterError> {
        self.orders
            .lock()
            .expect("poisoned")
            .get(exchange_id)
            .cloned()
            .ok_or_else(|| AdapterError::Unknown(format!("order {exchange_id} not found")))
    }

    async fn place_order(&self, request: PlaceOrderRequest) -> Result<Order, AdapterError> {
        if request.amount <= Decimal::ZERO {
            return Err(AdapterError::InvalidOrder("amount must be positive".into()));
        }
        let exchange_id = self.next_exchange_id();
        let mut order = Order::new(
            String::new(),
            request.symbol.clone(),
            request.side,
            request.order_type,
            request.price,
            request.amount,
            core_types::OrderRole::BaseOrder,
        );
        order.exchange_id = Some(exchange_id.clone());
        order.status = OrderStatus::Open;
        order.acknowledged_at = Some(Utc::now());

        if request.order_type == OrderType::Market {
            let price = self.fetch_price(&request.symbol).await?;
            order.price = Some(price);
            order
                .apply_fill(request.amount, Utc::now())
                .map_err(|e| AdapterError::Unknown(e.to_string()))?;
        }

        self.orders
            .lock()
            .expect("poisoned")
            .insert(exchange_id, order.clone());

        if order.status == OrderStatus::Open {
            if let Some(price) = self.prices.lock().expect("poisoned").get(&request.symbol).copied() {
                self.match_resting_orders(&request.symbol, price);
                if let Some(updated) = self
                    .orders
                    .lock()
                    .expect("poisoned")
                    .get(order.exchange_id.as_ref().expect("set above"))
                    .cloned()
                {
                    order = updated;
                }
            }
        }
        Ok(order)
    }

    async fn cancel_order(
        &self,
        _symbol: &str,
        exchange_id: &str,
    ) -> Result<CancelOutcome, AdapterError> {
        let mut orders = self.orders.lock().expect("poisoned");
        match orders.get_mut(exchange_id) {
            Some(order) if !order.status.is_terminal() => {
                order
                    .transition(OrderStatus::Cancelled)
                    .map_err(|e| AdapterError::Unknown(e.to_string()))?;
                Ok(CancelOutcome::Cancelled)
            }
            _ => Ok(CancelOutcome::Unknown),
        }
    }

    async fn cancel_all(&self, symbol: &str) -> Result<u32, AdapterError> {
        let mut orders = self.orders.lock().expect("poisoned");
        let mut cancelled = 0;
        for order in orders.values_mut() {
            if order.symbol == symbol && !order.status.is_terminal() && order.transition(OrderStatus::Cancelled).is_ok() {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{OrderSide};
    use rust_decimal_macros::dec;

    fn adapter() -> SimulatedAdapter {
        let mut balances = HashMap::new();
        balances.insert("USDT".to_string(), (dec!(10000), dec!(10000)));
        SimulatedAdapter::new(balances)
    }

    #[tokio::test]
    async fn market_order_fills_instantly_at_set_price() {
        let adapter = adapter();
        adapter.set_price("BTCUSDT", dec!(50000));
        let order = adapter
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
        assert_eq!(order.status, OrderStatus::Closed);
        assert_eq!(order.filled_amount, dec!(1));
    }

    #[tokio::test]
    async fn limit_order_rests_until_price_crosses() {
        let adapter = adapter();
        adapter.set_price("BTCUSDT", dec!(50000));
        let order = adapter
            .place_order(PlaceOrderRequest {
                symbol: "BTCUSDT".to_string(),
                side: OrderSide::Buy,
                order_type: OrderType::Limit,
                amount: dec!(1),
                price: Some(dec!(49000)),
                post_only: false,
                time_in_force: None,
            })
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Open);

        adapter.set_price("BTCUSDT", dec!(48500));
        let updated = adapter
            .fetch_order("BTCUSDT", order.exchange_id.as_ref().unwrap())
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Closed);
    }

    #[tokio::test]
    async fn cancel_of_already_filled_order_reports_unknown() {
        let adapter = adapter();
        adapter.set_price("BTCUSDT", dec!(50000));
        let order = adapter
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
        let outcome = adapter
            .cancel_order("BTCUSDT", order.exchange_id.as_ref().unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, CancelOutcome::Unknown);
    }
}
