use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BacktestError {
    #[error("Strategy execution error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Historical data for the requested window is incomplete: need {needed} bars, got {available}")]
    DataUnavailable { needed: usize, available: usize },
}
