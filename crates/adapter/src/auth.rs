use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs a request the way ByBit's V5 API requires: HMAC-SHA256 over the
/// concatenation `timestamp + api_key + recv_window + payload`, where
/// `payload` is the query string for a GET or the JSON body for a POST.
///
/// # Arguments
///
/// * `secret` - The account's API secret.
/// * `timestamp_ms` - Request timestamp in milliseconds since epoch.
/// * `api_key` - The account's API key.
/// * `recv_window_ms` - The receive window, tolerating clock drift.
/// * `payload` - The query string (GET) or JSON body (POST) being signed.
///
/// # Returns
///
/// A hexadecimal string representation of the signature.
pub fn sign_request(
    secret: &str,
    timestamp_ms: i64,
    api_key: &str,
    recv_window_ms: u64,
    payload: &str,
) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    let prehash = format!("{timestamp_ms}{api_key}{recv_window_ms}{payload}");
    mac.update(prehash.as_bytes());
    let result = mac.finalize();
    hex::encode(result.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_for_same_input() {
        let a = sign_request("secret", 1_700_000_000_000, "key", 10_000, "symbol=BTCUSDT");
        let b = sign_request("secret", 1_700_000_000_000, "key", 10_000, "symbol=BTCUSDT");
        assert_eq!(a, b);
    }

    #[test]
    fn signature_changes_with_payload() {
        let a = sign_request("secret", 1_700_000_000_000, "key", 10_000, "symbol=BTCUSDT");
        let b = sign_request("secret", 1_700_000_000_000, "key", 10_000, "symbol=ETHUSDT");
        assert_ne!(a, b);
    }
}
