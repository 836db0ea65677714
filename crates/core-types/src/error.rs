use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Calculation error: {0}")]
    Calculation(String),

    /// Raised when a mutation would violate one of the universal invariants
    /// (e.g. `filled_amount > amount`, a terminal order transitioning out,
    /// `highest_price_since_entry` moving backwards). These are internal
    /// invariant violations: callers should treat them as a bug, not a
    /// retryable condition.
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
}
