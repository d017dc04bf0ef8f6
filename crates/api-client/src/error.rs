use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Binance rejected the request ({0}): {1}")]
    BinanceError(i64, String),

    #[error("Failed to deserialize the API response: {0}")]
    Deserialization(String),

    #[error("Invalid data format from API: {0}")]
    InvalidData(String),

    #[error("Invalid API credentials: {0}")]
    InvalidCredentials(String),

    #[error("Order rejected before submission: {0}")]
    InvalidOrder(String),
}
