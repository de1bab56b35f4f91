use axum::{
    Router,
    routing::{get, post},
};
use configuration::Config;
use database::DbRepository;
use engine::{ProgressService, ServiceOptions, SyncRetrier};
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowOrigin, Any, CorsLayer, ExposeHeaders},
    trace::TraceLayer,
};

pub mod error;
pub mod handlers;
pub mod store;

pub use store::DbProgressStore;

/// The shared application state that all handlers can access.
#[derive(Clone)]
pub struct AppState {
    pub db_repo: DbRepository,
    pub service: Arc<ProgressService>,
}

/// All routes, with CORS and per-request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(Any)
        .allow_headers(AllowHeaders::any())
        .expose_headers(ExposeHeaders::any());

    Router::new()
        .route("/api/health", get(|| async { "OK" }))
        // --- Progress store ---
        .route("/api/get_user_learning_progress", post(handlers::get_user_learning_progress))
        .route("/api/add_learning_user", post(handlers::add_learning_user))
        .route("/api/set_user_learning_progress", post(handlers::set_user_learning_progress))
        .route("/api/set_user_completed_lessons", post(handlers::set_user_completed_lessons))
        .route("/api/get_lesson", post(handlers::get_lesson))
        .route("/api/lessons/:level", get(handlers::get_lessons))
        // --- Presentation boundary ---
        .route("/api/learn/:uid/route/:level/:lesson", get(handlers::evaluate_route))
        .route("/api/learn/:uid/gate", post(handlers::gate_completed))
        .route("/api/learn/:uid/next", post(handlers::advance))
        .route("/api/learn/:uid/back", post(handlers::back))
        .route("/api/learn/:uid/level-up/ack", post(handlers::level_up_acknowledged))
        .route("/api/learn/:uid/path", get(handlers::learning_path))
        .route("/api/learn/:uid/events", get(handlers::learner_events))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Connects to the database, starts the background sync and serves the API.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    // Tracing is initialized by the caller.
    dotenvy::dotenv().ok();
    let addr = config.server.socket_addr()?;

    let db_pool = database::connect().await?;
    database::run_migrations(&db_pool).await?;
    let db_repo = DbRepository::new(db_pool);

    let store = Arc::new(DbProgressStore::new(db_repo.clone()));
    let service = Arc::new(ProgressService::new(
        store.clone(),
        store,
        ServiceOptions::from_config(config),
    ));
    tokio::spawn(SyncRetrier::new(Arc::clone(&service), config.sync.retry_interval()).start());

    let app = router(Arc::new(AppState { db_repo, service }));

    tracing::info!("Web server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use api_client::{CurriculumSource, ProgressStore, StoreError};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use core_types::{ContentType, LearnerId, Lesson, LessonId, ProgressRecord};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct MemoryStore {
        records: Mutex<HashMap<LearnerId, ProgressRecord>>,
    }

    #[async_trait]
    impl ProgressStore for MemoryStore {
        async fn get_progress(&self, learner: LearnerId) -> Result<Option<ProgressRecord>, StoreError> {
            Ok(self.records.lock().unwrap().get(&learner).cloned())
        }

        async fn set_progress(
            &self,
            learner: LearnerId,
            level: u32,
            lesson: u32,
            completed: Option<&BTreeSet<LessonId>>,
        ) -> Result<ProgressRecord, StoreError> {
            let mut records = self.records.lock().unwrap();
            let record = records.entry(learner).or_default();
            record.level = level;
            record.lesson = lesson;
            if let Some(completed) = completed {
                record.completed_lesson_ids = completed.clone();
            }
            Ok(record.clone())
        }

        async fn create_default_progress(&self, learner: LearnerId) -> Result<ProgressRecord, StoreError> {
            Ok(self.records.lock().unwrap().entry(learner).or_default().clone())
        }
    }

    #[async_trait]
    impl CurriculumSource for MemoryStore {
        async fn get_lessons_for_level(&self, level: u32) -> Result<Vec<Lesson>, StoreError> {
            Ok(match level {
                0 => vec![
                    Lesson::new(1, 0, 1, ContentType::Information),
                    Lesson::new(2, 0, 2, ContentType::Quiz),
                ],
                1 => vec![Lesson::new(3, 1, 1, ContentType::Information)],
                _ => Vec::new(),
            })
        }

        async fn get_lesson(&self, level: u32, page_number: u32) -> Result<Option<Lesson>, StoreError> {
            let lessons = self.get_lessons_for_level(level).await?;
            Ok(lessons.into_iter().find(|l| l.page_number == page_number))
        }
    }

    fn app() -> Router {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://academy@localhost/academy_test")
            .unwrap();
        let store = Arc::new(MemoryStore::default());
        let service = Arc::new(ProgressService::new(store.clone(), store, ServiceOptions::default()));
        router(Arc::new(AppState {
            db_repo: DbRepository::new(pool),
            service,
        }))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    const UID: &str = "6f1c1c3e-8a43-4c8e-9d0e-0b6d2b0c9a11";

    #[tokio::test]
    async fn health_is_ok() {
        let response = app()
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn locked_route_is_redirected() {
        let (status, body) = send(
            app(),
            Request::get(format!("/api/learn/{}/route/0/2", UID)).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["kind"], "redirect");
        assert_eq!(body["data"]["to"], json!({ "level": 0, "lesson": 1 }));
    }

    #[tokio::test]
    async fn gate_payload_is_normalized() {
        let (status, body) = send(
            app(),
            post(
                &format!("/api/learn/{}/gate", UID),
                json!({ "lesson_id": 2, "result": { "score": 4, "total": 4 } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["newly_completed"], true);
        assert_eq!(body["data"]["record"]["completed_lesson_ids"], json!([2]));
    }

    #[tokio::test]
    async fn unreadable_gate_payload_is_a_bad_request() {
        let (status, body) = send(
            app(),
            post(&format!("/api/learn/{}/gate", UID), json!({ "lesson_id": 2, "result": "yes" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
    }

    #[tokio::test]
    async fn next_is_blocked_by_an_open_gate() {
        let app = app();
        let (_, moved) = send(app.clone(), post(&format!("/api/learn/{}/next", UID), json!({ "level": 0, "lesson": 1 }))).await;
        assert_eq!(moved["data"]["kind"], "moved");

        let (_, blocked) = send(app, post(&format!("/api/learn/{}/next", UID), json!({ "level": 0, "lesson": 2 }))).await;
        assert_eq!(blocked["data"], json!({ "kind": "blocked", "lesson_id": 2 }));
    }

    #[tokio::test]
    async fn learning_path_lists_every_level() {
        let (status, body) = send(
            app(),
            Request::get(format!("/api/learn/{}/path", UID)).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["levels"].as_array().map(Vec::len), Some(2));
    }
}
