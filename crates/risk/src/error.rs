use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Risk parameters from configuration are invalid: {0}")]
    InvalidParameters(String),

    #[error("Insufficient portfolio equity ({0}) to execute trade based on risk rules.")]
    InsufficientEquity(Decimal),

    #[error("The provided entry price ({0}) is zero or negative.")]
    InvalidEntryPrice(Decimal),

    #[error("A calculation error occurred: {0}")]
    Calculation(String),

    /// A trade was rejected by a portfolio-level gate, not a sizing error.
    #[error("Trade rejected: {0}")]
    Rejected(String),

    /// Trading has been halted by the Risk Manager or Capital Manager and no
    /// further trades are accepted until `reset_daily`/explicit resume.
    #[error("Trading is halted: {0}")]
    Halted(String),
}
