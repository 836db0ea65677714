use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Strategy received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("An error occurred during indicator calculation: {0}")]
    IndicatorError(String),

    #[error("Not enough market data to evaluate: need at least {0} bars, have {1}")]
    InsufficientData(usize, usize),

    #[error("Strategy kind '{0:?}' has no configured parameters")]
    MissingParameters(core_types::StrategyKind),
}
