use async_trait::async_trait;
use configuration::ProgressStoreConfig;
use core_types::{LearnerId, Lesson, LessonId, ProgressRecord};
use reqwest::StatusCode;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::BTreeSet;

pub mod error;
pub mod requests;
pub mod responses;

// --- Public API ---
pub use error::StoreError;
pub use requests::{LearnerRequest, LessonRequest, SetCompletedRequest, SetProgressRequest};
pub use responses::{Envelope, ProgressData};

/// The boundary contract with the remote store that owns learners' progress.
///
/// This trait is what the progression engine talks to, allowing the underlying
/// implementation (HTTP, database, or an in-memory fake) to be swapped out.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Returns the stored record, or `None` when the learner has none yet.
    async fn get_progress(&self, learner: LearnerId) -> Result<Option<ProgressRecord>, StoreError>;

    /// Partial update. `None` for `completed` leaves the stored set unchanged.
    async fn set_progress(
        &self,
        learner: LearnerId,
        level: u32,
        lesson: u32,
        completed: Option<&BTreeSet<LessonId>>,
    ) -> Result<ProgressRecord, StoreError>;

    /// Establishes `(0, 1, ∅)` for a learner without a record.
    async fn create_default_progress(&self, learner: LearnerId) -> Result<ProgressRecord, StoreError>;
}

/// The boundary contract with whatever serves the static curriculum.
#[async_trait]
pub trait CurriculumSource: Send + Sync {
    /// The lessons of `level` ordered by page number. Empty when the level does not exist.
    async fn get_lessons_for_level(&self, level: u32) -> Result<Vec<Lesson>, StoreError>;

    async fn get_lesson(&self, level: u32, page_number: u32) -> Result<Option<Lesson>, StoreError>;
}

/// A `ProgressStore` and `CurriculumSource` backed by the store's REST API.
#[derive(Clone)]
pub struct HttpProgressClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProgressClient {
    pub fn new(config: &ProgressStoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a request and unwraps the `{status, data}` envelope.
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T, StoreError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let envelope: Envelope<T> = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) if status.is_success() => {
                tracing::debug!("Raw store response: {}", text);
                return Err(StoreError::Deserialization(format!("{}. Original text: {}", e, text)));
            }
            // Error bodies that are not an envelope still carry the status.
            Err(_) => Envelope {
                status: "error".to_string(),
                data: None,
                message: Some(text),
            },
        };

        if !status.is_success() || !envelope.is_success() {
            tracing::debug!(%status, message = ?envelope.message, "Store request failed.");
        }
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound(envelope.message.unwrap_or_default()));
        }
        if !status.is_success() || !envelope.is_success() {
            return Err(StoreError::Api {
                status: status.as_u16(),
                message: envelope.message.unwrap_or_else(|| "unknown store error".to_string()),
            });
        }

        envelope
            .data
            .ok_or_else(|| StoreError::Deserialization("success envelope without data".to_string()))
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, StoreError> {
        self.send(self.client.post(self.url(path)).json(body)).await
    }
}

#[async_trait]
impl ProgressStore for HttpProgressClient {
    async fn get_progress(&self, learner: LearnerId) -> Result<Option<ProgressRecord>, StoreError> {
        let result: Result<ProgressData, StoreError> = self
            .post("/api/get_user_learning_progress", &LearnerRequest { uid: learner })
            .await;
        match result {
            Ok(data) => Ok(Some(data.into_record()?)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set_progress(
        &self,
        learner: LearnerId,
        level: u32,
        lesson: u32,
        completed: Option<&BTreeSet<LessonId>>,
    ) -> Result<ProgressRecord, StoreError> {
        let body = SetProgressRequest {
            uid: learner,
            level_progress: i64::from(level),
            lesson_progress: i64::from(lesson),
            completed_lessons: completed.map(|ids| Value::Array(ids.iter().map(|id| Value::from(id.0)).collect())),
        };
        let data: ProgressData = self.post("/api/set_user_learning_progress", &body).await?;
        data.into_record()
    }

    async fn create_default_progress(&self, learner: LearnerId) -> Result<ProgressRecord, StoreError> {
        let data: ProgressData = self
            .post("/api/add_learning_user", &LearnerRequest { uid: learner })
            .await?;
        data.into_record()
    }
}

#[async_trait]
impl CurriculumSource for HttpProgressClient {
    async fn get_lessons_for_level(&self, level: u32) -> Result<Vec<Lesson>, StoreError> {
        let mut lessons: Vec<Lesson> = self
            .send(self.client.get(self.url(&format!("/api/lessons/{}", level))))
            .await?;
        lessons.sort_by_key(|l| l.page_number);
        Ok(lessons)
    }

    async fn get_lesson(&self, level: u32, page_number: u32) -> Result<Option<Lesson>, StoreError> {
        let body = LessonRequest {
            level: i64::from(level),
            lesson: i64::from(page_number),
        };
        match self.post::<_, Lesson>("/api/get_lesson", &body).await {
            Ok(lesson) => Ok(Some(lesson)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
