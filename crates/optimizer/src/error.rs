use indicatif::style::TemplateError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("Configuration error: {0}")]
    Config(#[from] configuration::error::ConfigError),

    #[error("Backtest execution failed within optimizer: {0}")]
    Backtest(#[from] backtester::error::BacktestError),

    #[error("Not enough history to optimize: need at least {needed} bars, got {available}")]
    InsufficientHistory { needed: usize, available: usize },

    #[error("Progress bar template error: {0}")]
    ProgressBarTemplate(String),
}

impl From<TemplateError> for OptimizerError {
    fn from(error: TemplateError) -> Self {
        OptimizerError::ProgressBarTemplate(error.to_string())
    }
}
