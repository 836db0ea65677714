use thiserror::Error;

/// The closed failure taxonomy every exchange adapter implementation must
/// map its raw errors into. The core only ever matches on these variants —
/// it never inspects an exchange-native error code or status string.
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("insufficient balance: {0}")]
    Insufficient(String),

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unknown adapter error: {0}")]
    Unknown(String),
}
