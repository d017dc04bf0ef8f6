use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error("Strategy received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("An error occurred during indicator calculation: {0}")]
    IndicatorError(String),

    #[error("Not enough price history: need {needed} bars, got {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("Non-finite value in {0}")]
    NonFinite(String),
}

impl From<core_types::CoreError> for StrategyError {
    fn from(error: core_types::CoreError) -> Self {
        StrategyError::InvalidParameters(error.to_string())
    }
}
