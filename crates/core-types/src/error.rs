use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid input for {0}: {1}")]
    InvalidInput(String, String),

    #[error("Invalid parameter set: {0}")]
    InvalidParameters(String),

    #[error("Price series is not strictly ordered at index {0}")]
    Unordered(usize),
}
