use core_types::{OrderSide, OrderStatus};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Maps an exchange-native order status string into the closed
/// `core_types::OrderStatus` sum type. This is the single point where a raw
/// exchange string is allowed to exist; everything downstream of this
/// function only ever sees the normalized enum.
pub fn normalize_status(raw: &str) -> OrderStatus {
    match raw.to_ascii_lowercase().as_str() {
        "filled" | "deal" | "triggered" => OrderStatus::Closed,
        "new" | "accepted" | "untriggered" | "created" => OrderStatus::Open,
        "partiallyfilled" | "partially_filled" => OrderStatus::PartiallyFilled,
        "cancelled" | "cancel" | "canceled" | "partiallyfilledcanceled" => OrderStatus::Cancelled,
        "rejected" => OrderStatus::Rejected,
        _ => OrderStatus::Error,
    }
}

/// The envelope every ByBit V5 REST response is wrapped in.
#[derive(Debug, Clone, Deserialize)]
pub struct BybitEnvelope<T> {
    #[serde(rename = "retCode")]
    pub ret_code: i32,
    #[serde(rename = "retMsg")]
    pub ret_msg: String,
    pub result: T,
}

/// A single order record from ByBit's `v5/order/*` endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_status: String,
    pub price: Decimal,
    pub qty: Decimal,
    pub cum_exec_qty: Decimal,
    pub avg_price: Decimal,
}

/// `v5/order/*` list endpoints wrap their orders in a `list` field.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOrderList {
    pub list: Vec<RawOrder>,
}

/// A single kline row from `v5/market/kline`: `[start, open, high, low,
/// close, volume, turnover]`, all as strings, newest first.
#[derive(Debug, Clone, Deserialize)]
pub struct RawKlineList {
    pub list: Vec<[String; 7]>,
}

/// A single coin balance from `v5/account/wallet-balance`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCoinBalance {
    pub coin: String,
    pub wallet_balance: Decimal,
    pub available_to_withdraw: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawWalletAccount {
    pub coin: Vec<RawCoinBalance>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawWalletBalance {
    pub list: Vec<RawWalletAccount>,
}

/// A single ticker record from `v5/market/tickers`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTicker {
    pub symbol: String,
    pub last_price: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawTickerList {
    pub list: Vec<RawTicker>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_fill_variants_to_closed() {
        assert_eq!(normalize_status("Filled"), OrderStatus::Closed);
        assert_eq!(normalize_status("deal"), OrderStatus::Closed);
        assert_eq!(normalize_status("Triggered"), OrderStatus::Closed);
    }

    #[test]
    fn normalizes_open_variants() {
        assert_eq!(normalize_status("New"), OrderStatus::Open);
        assert_eq!(normalize_status("Untriggered"), OrderStatus::Open);
    }

    #[test]
    fn normalizes_unknown_strings_to_error() {
        assert_eq!(normalize_status("SomeFutureStatus"), OrderStatus::Error);
    }
}
