use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("The progress store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("The progress store returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Failed to deserialize the store response: {0}")]
    Deserialization(String),

    #[error("Invalid data format from the store: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transport(_) => true,
            StoreError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
