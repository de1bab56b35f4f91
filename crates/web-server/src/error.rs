use api_client::Envelope;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use database::DbError;
use engine::error::EngineError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),
    #[error("Progression error: {0}")]
    Engine(#[from] EngineError),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<core_types::CoreError> for AppError {
    fn from(e: core_types::CoreError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl AppError {
    fn status_and_message(self) -> (StatusCode, String) {
        match self {
            AppError::Database(DbError::NotFound) => (StatusCode::NOT_FOUND, "No progress found for this learner".to_string()),
            AppError::Database(DbError::AlreadyExists(who)) => {
                (StatusCode::CONFLICT, format!("Learning progress already exists for {}", who))
            }
            AppError::Database(db_err) => {
                tracing::error!(error = ?db_err, "Database error.");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal database error occurred".to_string(),
                )
            }
            AppError::Engine(EngineError::NotFound(what)) => (StatusCode::NOT_FOUND, format!("Not found: {}", what)),
            AppError::Engine(EngineError::InconsistentState(message)) => {
                tracing::warn!(%message, "Inconsistent progression state.");
                (StatusCode::NOT_FOUND, message)
            }
            AppError::Engine(EngineError::Core(e)) => (StatusCode::BAD_REQUEST, e.to_string()),
            AppError::Engine(EngineError::TransientIo(e)) => {
                tracing::warn!(error = %e, "Progress store unavailable.");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "The progress store is temporarily unavailable".to_string(),
                )
            }
            AppError::Engine(EngineError::Store(e)) => {
                tracing::error!(error = %e, "Progress store rejected a request.");
                (StatusCode::BAD_GATEWAY, "The progress store rejected the request".to_string())
            }
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message),
        }
    }
}

/// Converts our custom `AppError` into the store's error envelope.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(Envelope::<()>::error(message))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_outage_is_service_unavailable() {
        let err = AppError::Engine(EngineError::TransientIo(api_client::StoreError::Api {
            status: 503,
            message: "down".to_string(),
        }));
        assert_eq!(err.status_and_message().0, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn duplicate_learner_is_a_conflict() {
        let err = AppError::Database(DbError::AlreadyExists("x".to_string()));
        assert_eq!(err.status_and_message().0, StatusCode::CONFLICT);
    }
}
