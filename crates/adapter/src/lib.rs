use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use core_types::{Kline, Order, OrderRole, OrderSide, OrderStatus, OrderType};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromStr;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

mod auth;
pub mod error;
pub mod responses;
pub mod simulated;

pub use error::AdapterError;
pub use simulated::SimulatedAdapter;

/// Outcome of a cancel request: the exchange may have already settled the
/// order before the cancel arrived, which is not an error condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    Unknown,
}

/// Parameters for a new order, mirroring the adapter contract's
/// `place_order(symbol, side, type, amount, price?, post_only?, time_in_force?)`.
#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: Decimal,
    pub price: Option<Decimal>,
    pub post_only: bool,
    pub time_in_force: Option<String>,
}

/// The contract the core consumes to talk to an exchange, live or
/// simulated. Every implementation is responsible for normalizing
/// exchange-native status strings into `core_types::OrderStatus` and for
/// mapping its own failures into the closed `AdapterError` taxonomy — the
/// core never inspects a raw status string or vendor error code.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Last traded price for `symbol`.
    async fn fetch_price(&self, symbol: &str) -> Result<Decimal, AdapterError>;

    /// The most recent `limit` candles for `symbol` at `timeframe`, sorted
    /// ascending by open time.
    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, AdapterError>;

    /// Free and total balance per asset.
    async fn fetch_balance(&self) -> Result<HashMap<String, (Decimal, Decimal)>, AdapterError>;

    /// The authoritative set of currently-live orders for `symbol`.
    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<Order>, AdapterError>;

    /// A single order lookup, including terminal status.
    async fn fetch_order(&self, symbol: &str, exchange_id: &str) -> Result<Order, AdapterError>;

    /// Places a new order, returning it with an exchange id on success.
    async fn place_order(&self, request: PlaceOrderRequest) -> Result<Order, AdapterError>;

    /// Cancels a single order.
    async fn cancel_order(
        &self,
        symbol: &str,
        exchange_id: &str,
    ) -> Result<CancelOutcome, AdapterError>;

    /// Cancels every open order for `symbol`, returning the count cancelled.
    async fn cancel_all(&self, symbol: &str) -> Result<u32, AdapterError>;
}

/// Retries `operation` with exponential backoff (base 1s, cap 30s) up to
/// `MAX_ATTEMPTS` times, but only for errors the adapter contract marks
/// transient (`Network`, `RateLimited`). `Auth`, `Insufficient`, and
/// `InvalidOrder` surface immediately on the first attempt.
pub(crate) async fn with_retry<F, Fut, T>(mut operation: F) -> Result<T, AdapterError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AdapterError>>,
{
    const MAX_ATTEMPTS: u32 = 3;
    const BASE_DELAY_MS: u64 = 1_000;
    const CAP_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err @ (AdapterError::Network(_) | AdapterError::RateLimited(_))) => {
                if attempt >= MAX_ATTEMPTS {
                    return Err(err);
                }
                let delay_ms = (BASE_DELAY_MS * 2u64.pow(attempt - 1)).min(CAP_DELAY_MS);
                tracing::warn!(attempt, delay_ms, error = %err, "transient adapter error, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            }
            Err(non_transient) => return Err(non_transient),
        }
    }
}

/// A live `ExchangeAdapter` implementation speaking ByBit's V5 REST API.
#[derive(Clone)]
pub struct ByBitAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
}

impl ByBitAdapter {
    pub fn new(sandbox: bool, api_key: String, api_secret: String, recv_window_ms: u64) -> Self {
        let base_url = if sandbox {
            "https://api-testnet.bybit.com".to_string()
        } else {
            "https://api.bybit.com".to_string()
        };
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            api_secret,
            recv_window_ms,
        }
    }

    fn now_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is after the unix epoch")
            .as_millis() as i64
    }

    fn signed_headers(&self, payload: &str) -> reqwest::header::HeaderMap {
        let timestamp = Self::now_ms();
        let signature = auth::sign_request(
            &self.api_secret,
            timestamp,
            &self.api_key,
            self.recv_window_ms,
            payload,
        );
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert("X-BAPI-API-KEY", self.api_key.parse().expect("api key is ascii"));
        headers.insert("X-BAPI-TIMESTAMP", timestamp.to_string().parse().unwrap());
        headers.insert(
            "X-BAPI-RECV-WINDOW",
            self.recv_window_ms.to_string().parse().unwrap(),
        );
        headers.insert("X-BAPI-SIGN", signature.parse().expect("hex signature is ascii"));
        headers
    }

    async fn get_signed<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
    ) -> Result<T, AdapterError> {
        let url = format!("{}{}?{}", self.base_url, path, query);
        let headers = self.signed_headers(query);
        let response = self.client.get(&url).headers(headers).send().await?;
        self.parse_envelope(response).await
    }

    async fn post_signed<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &str,
    ) -> Result<T, AdapterError> {
        let url = format!("{}{}", self.base_url, path);
        let headers = self.signed_headers(body);
        let response = self
            .client
            .post(&url)
            .headers(headers)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await?;
        self.parse_envelope(response).await
    }

    async fn parse_envelope<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AdapterError> {
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(AdapterError::RateLimited(format!("http {status}")));
        }
        if status.is_server_error() {
            return Err(AdapterError::Unknown(format!("http {status}")));
        }
        let text = response.text().await?;
        let envelope: responses::BybitEnvelope<T> = serde_json::from_str(&text)
            .map_err(|e| AdapterError::Unknown(format!("malformed response: {e}: {text}")))?;
        classify_ret_code(envelope.ret_code, &envelope.ret_msg)?;
        Ok(envelope.result)
    }
}

/// ByBit's documented ranges: 10001-10006 are auth/signature failures,
/// 110001-110099 are order/balance rejections, 10018 is rate limiting.
fn classify_ret_code(ret_code: i32, ret_msg: &str) -> Result<(), AdapterError> {
    match ret_code {
        0 => Ok(()),
        10003 | 10004 | 10005 | 10006 => Err(AdapterError::Auth(ret_msg.to_string())),
        10018 | 10016 => Err(AdapterError::RateLimited(ret_msg.to_string())),
        110007 | 110012 | 110045 => Err(AdapterError::Insufficient(ret_msg.to_string())),
        110001 | 110017 | 110020 | 110043 => Err(AdapterError::InvalidOrder(ret_msg.to_string())),
        _ => Err(AdapterError::Unknown(format!("{ret_code}: {ret_msg}"))),
    }
}

fn decimal_from_str(raw: &str, field: &str) -> Result<Decimal, AdapterError> {
    Decimal::from_str(raw).map_err(|e| AdapterError::Unknown(format!("invalid {field} '{raw}': {e}")))
}

fn order_from_raw(symbol: &str, raw: responses::RawOrder) -> Order {
    let mut order = Order::new(
        String::new(),
        symbol.to_string(),
        raw.side,
        OrderType::Limit,
        Some(raw.price),
        raw.qty,
        OrderRole::BaseOrder,
    );
    order.exchange_id = Some(raw.order_id);
    order.filled_amount = raw.cum_exec_qty;
    order.status = responses::normalize_status(&raw.order_status);
    if order.status.is_terminal() && order.filled_amount > Decimal::ZERO {
        order.filled_at = Some(Utc::now());
    }
    order
}

#[async_trait]
impl ExchangeAdapter for ByBitAdapter {
    async fn fetch_price(&self, symbol: &str) -> Result<Decimal, AdapterError> {
        with_retry(|| async {
            let query = format!("category=linear&symbol={symbol}");
            let result: responses::RawTickerList =
                self.get_signed("/v5/market/tickers", &query).await?;
            result
                .list
                .first()
                .map(|t| t.last_price)
                .ok_or_else(|| AdapterError::Unknown(format!("no ticker for {symbol}")))
        })
        .await
    }

    async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: u32,
    ) -> Result<Vec<Kline>, AdapterError> {
        with_retry(|| async {
            let query = format!(
                "category=linear&symbol={symbol}&interval={timeframe}&limit={limit}"
            );
            let result: responses::RawKlineList =
                self.get_signed("/v5/market/kline", &query).await?;
            let mut klines = result
                .list
                .into_iter()
                .map(|row| {
                    let open_ms: i64 = row[0]
                        .parse()
                        .map_err(|_| AdapterError::Unknown("invalid kline timestamp".into()))?;
                    Ok(Kline {
                        open_time: Utc
                            .timestamp_millis_opt(open_ms)
                            .single()
                            .ok_or_else(|| AdapterError::Unknown("invalid kline timestamp".into()))?,
                        open: decimal_from_str(&row[1], "open")?,
                        high: decimal_from_str(&row[2], "high")?,
                        low: decimal_from_str(&row[3], "low")?,
                        close: decimal_from_str(&row[4], "close")?,
                        volume: decimal_from_str(&row[5], "volume")?,
                        close_time: Utc
                            .timestamp_millis_opt(open_ms)
                            .single()
                            .ok_or_else(|| AdapterError::Unknown("invalid kline timestamp".into()))?,
                        interval: timeframe.to_string(),
                    })
                })
                .collect::<Result<Vec<Kline>, AdapterError>>()?;
            klines.sort_by_key(|k| k.open_time);
            Ok(klines)
        })
        .await
    }

    async fn fetch_balance(&self) -> Result<HashMap<String, (Decimal, Decimal)>, AdapterError> {
        with_retry(|| async {
            let result: responses::RawWalletBalance = self
                .get_signed("/v5/account/wallet-balance", "accountType=UNIFIED")
                .await?;
            let mut balances = HashMap::new();
            for account in result.list {
                for coin in account.coin {
                    balances.insert(coin.coin, (coin.available_to_withdraw, coin.wallet_balance));
                }
            }
            Ok(balances)
        })
        .await
    }

    async fn fetch_open_orders(&self, symbol: &str) -> Result<Vec<Order>, AdapterError> {
        with_retry(|| async {
            let query = format!("category=linear&symbol={symbol}");
            let result: responses::RawOrderList =
                self.get_signed("/v5/order/realtime", &query).await?;
            Ok(result
                .list
                .into_iter()
                .map(|raw| order_from_raw(symbol, raw))
                .collect())
        })
        .await
    }

    async fn fetch_order(&self, symbol: &str, exchange_id: &str) -> Result<Order, AdapterError> {
        with_retry(|| async {
            let query = format!("category=linear&symbol={symbol}&orderId={exchange_id}");
            let result: responses::RawOrderList =
                self.get_signed("/v5/order/history", &query).await?;
            result
                .list
                .into_iter()
                .next()
                .map(|raw| order_from_raw(symbol, raw))
                .ok_or_else(|| AdapterError::Unknown(format!("order {exchange_id} not found")))
        })
        .await
    }

    async fn place_order(&self, request: PlaceOrderRequest) -> Result<Order, AdapterError> {
        if request.amount <= Decimal::ZERO {
            return Err(AdapterError::InvalidOrder("amount must be positive".into()));
        }
        with_retry(|| async {
            let mut body = serde_json::json!({
                "category": "linear",
                "symbol": request.symbol,
                "side": side_str(request.side),
                "orderType": order_type_str(request.order_type),
                "qty": request.amount.to_string(),
            });
            if let Some(price) = request.price {
                body["price"] = serde_json::Value::String(price.to_string());
            }
            if request.post_only {
                body["timeInForce"] = serde_json::Value::String("PostOnly".to_string());
            } else if let Some(tif) = &request.time_in_force {
                body["timeInForce"] = serde_json::Value::String(tif.clone());
            }
            let payload = serde_json::to_string(&body)
                .map_err(|e| AdapterError::Unknown(format!("failed to encode order body: {e}")))?;
            let result: serde_json::Value = self.post_signed("/v5/order/create", &payload).await?;
            let exchange_id = result
                .get("orderId")
                .and_then(|v| v.as_str())
                .ok_or_else(|| AdapterError::Unknown("order response missing orderId".into()))?;

            let mut order = Order::new(
                String::new(),
                request.symbol.clone(),
                request.side,
                request.order_type,
                request.price,
                request.amount,
                OrderRole::BaseOrder,
            );
            order.exchange_id = Some(exchange_id.to_string());
            order.status = OrderStatus::Open;
            order.acknowledged_at = Some(Utc::now());
            Ok(order)
        })
        .await
    }

    async fn cancel_order(
        &self,
        symbol: &str,
        exchange_id: &str,
    ) -> Result<CancelOutcome, AdapterError> {
        let body = serde_json::json!({
            "category": "linear",
            "symbol": symbol,
            "orderId": exchange_id,
        })
        .to_string();
        match self
            .post_signed::<serde_json::Value>("/v5/order/cancel", &body)
            .await
        {
            Ok(_) => Ok(CancelOutcome::Cancelled),
            // ByBit returns 110001 ("order not exists") when the order already
            // settled before the cancel arrived; that's not an adapter failure.
            Err(AdapterError::InvalidOrder(_)) => Ok(CancelOutcome::Unknown),
            Err(other) => Err(other),
        }
    }

    async fn cancel_all(&self, symbol: &str) -> Result<u32, AdapterError> {
        let body = serde_json::json!({
            "category": "linear",
            "symbol": symbol,
        })
        .to_string();
        let result: serde_json::Value = self.post_signed("/v5/order/cancel-all", &body).await?;
        Ok(result
            .get("list")
            .and_then(|v| v.as_array())
            .map(|list| list.len() as u32)
            .unwrap_or(0))
    }
}

fn side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "Buy",
        OrderSide::Sell => "Sell",
    }
}

fn order_type_str(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Market => "Market",
        OrderType::Limit => "Limit",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_auth_ret_codes() {
        assert!(matches!(
            classify_ret_code(10004, "invalid sign"),
            Err(AdapterError::Auth(_))
        ));
    }

    #[test]
    fn classifies_insufficient_balance_ret_codes() {
        assert!(matches!(
            classify_ret_code(110007, "insufficient balance"),
            Err(AdapterError::Insufficient(_))
        ));
    }

    #[test]
    fn classifies_success_ret_code() {
        assert!(classify_ret_code(0, "OK").is_ok());
    }
}
