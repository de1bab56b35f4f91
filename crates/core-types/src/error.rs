use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid curriculum: {0}")]
    InvalidCurriculum(String),

    #[error("Invalid gate payload for lesson {0}: {1}")]
    InvalidGatePayload(i64, String),

    #[error("Invalid completed lessons list: {0}")]
    InvalidCompletedLessons(String),

    #[error("Unknown content type: {0}")]
    UnknownContentType(String),
}
