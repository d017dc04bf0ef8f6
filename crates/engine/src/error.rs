use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] configuration::error::ConfigError),

    #[error("API client error: {0}")]
    ApiClient(#[from] api_client::error::ApiError),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Optimizer error: {0}")]
    Optimizer(#[from] optimizer::error::OptimizerError),

    #[error("The exchange returned no bars for {0}")]
    EmptyHistory(String),
}
