use api_client::StoreError;
use core_types::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// No record where one was expected. Callers fall back to defaults or the curriculum start.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The store or curriculum source could not be reached. Local state is kept.
    #[error("The progress store is temporarily unavailable: {0}")]
    TransientIo(StoreError),

    #[error("Inconsistent progression state: {0}")]
    InconsistentState(String),

    #[error("The progress store rejected the request: {0}")]
    Store(StoreError),

    #[error("Invalid domain data: {0}")]
    Core(#[from] CoreError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            e if e.is_transient() => EngineError::TransientIo(e),
            StoreError::NotFound(what) => EngineError::NotFound(what),
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::TransientIo(_))
    }
}
