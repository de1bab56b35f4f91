use crate::{AppState, error::AppError};
use api_client::{
    Envelope, LearnerRequest, LessonRequest, ProgressData, SetCompletedRequest, SetProgressRequest,
};
use axum::{
    Json,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use core_types::{GateResult, Lesson, LessonId, LevelUpEvent, RouteTarget, parse_completed_lessons};
use database::ProgressRow;
use engine::view::{AdvanceOutcome, GateOutcome, LearningPath, RouteOutcome};
use events::ProgressEvent;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

type ApiResult<T> = Result<Json<Envelope<T>>, AppError>;

fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope::success(data)))
}

fn progress_data(row: &ProgressRow) -> Result<ProgressData, AppError> {
    let record = row.to_record()?;
    Ok(ProgressData::from_record(row.id, &record, Some(row.last_updated)))
}

fn non_negative(value: i64, field: &str) -> Result<u32, AppError> {
    u32::try_from(value).map_err(|_| AppError::BadRequest(format!("{} must be a non-negative integer", field)))
}

fn completed_set(raw: &Value) -> Result<BTreeSet<LessonId>, AppError> {
    Ok(parse_completed_lessons(raw)?)
}

// ==============================================================================
// Progress store API
// ==============================================================================

/// # POST /api/get_user_learning_progress
/// Creates the default record the first time a learner is seen.
pub async fn get_user_learning_progress(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LearnerRequest>,
) -> ApiResult<ProgressData> {
    let row = state.db_repo.get_or_create_progress(req.uid).await?;
    ok(progress_data(&row)?)
}

/// # POST /api/add_learning_user
pub async fn add_learning_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LearnerRequest>,
) -> ApiResult<ProgressData> {
    let row = state.db_repo.insert_default_progress(req.uid).await?;
    tracing::info!(learner = %req.uid, "Registered learner.");
    ok(progress_data(&row)?)
}

/// # POST /api/set_user_learning_progress
/// A missing or null `completed_lessons` leaves the stored set unchanged.
pub async fn set_user_learning_progress(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetProgressRequest>,
) -> ApiResult<ProgressData> {
    let level = non_negative(req.level_progress, "level_progress")?;
    let lesson = non_negative(req.lesson_progress, "lesson_progress")?;
    let completed = match &req.completed_lessons {
        None | Some(Value::Null) => None,
        Some(raw) => Some(completed_set(raw)?),
    };

    let row = state
        .db_repo
        .set_progress(req.uid, level, lesson, completed.as_ref())
        .await?;
    ok(progress_data(&row)?)
}

/// # POST /api/set_user_completed_lessons
pub async fn set_user_completed_lessons(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetCompletedRequest>,
) -> ApiResult<ProgressData> {
    let completed = completed_set(&req.completed_lessons)?;
    let row = state.db_repo.set_completed_lessons(req.uid, &completed).await?;
    ok(progress_data(&row)?)
}

/// # POST /api/get_lesson
pub async fn get_lesson(State(state): State<Arc<AppState>>, Json(req): Json<LessonRequest>) -> ApiResult<Lesson> {
    let level = non_negative(req.level, "level")?;
    let page = non_negative(req.lesson, "lesson")?;
    match state.db_repo.get_lesson(level, page).await? {
        Some(lesson) => ok(lesson),
        None => Err(AppError::NotFound("Lesson not found".to_string())),
    }
}

/// # GET /api/lessons/:level
/// Ordered by page number; an unknown level is an empty list.
pub async fn get_lessons(State(state): State<Arc<AppState>>, Path(level): Path<u32>) -> ApiResult<Vec<Lesson>> {
    ok(state.db_repo.get_lessons_for_level(level).await?)
}

// ==============================================================================
// Presentation boundary
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct RoutePath {
    pub uid: Uuid,
    pub level: u32,
    pub lesson: u32,
}

#[derive(Debug, Deserialize)]
pub struct GateRequest {
    pub lesson_id: i64,
    /// Whatever the quiz widget reported.
    #[serde(default)]
    pub result: Value,
}

#[derive(Debug, Deserialize)]
pub struct RouteRequest {
    pub level: u32,
    pub lesson: u32,
}

/// # GET /api/learn/:uid/route/:level/:lesson
pub async fn evaluate_route(
    State(state): State<Arc<AppState>>,
    Path(path): Path<RoutePath>,
) -> ApiResult<RouteOutcome> {
    let outcome = state
        .service
        .evaluate_route(path.uid, RouteTarget::new(path.level, path.lesson))
        .await?;
    ok(outcome)
}

/// # POST /api/learn/:uid/gate
pub async fn gate_completed(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<Uuid>,
    Json(req): Json<GateRequest>,
) -> ApiResult<GateOutcome> {
    let result = GateResult::from_payload(LessonId(req.lesson_id), &req.result)?;
    ok(state.service.on_gate_completed(uid, result).await?)
}

/// # POST /api/learn/:uid/next
pub async fn advance(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<Uuid>,
    Json(req): Json<RouteRequest>,
) -> ApiResult<AdvanceOutcome> {
    ok(state.service.advance(uid, RouteTarget::new(req.level, req.lesson)).await?)
}

/// # POST /api/learn/:uid/back
/// `data` is `null` on the very first lesson.
pub async fn back(
    State(state): State<Arc<AppState>>,
    Path(_uid): Path<Uuid>,
    Json(req): Json<RouteRequest>,
) -> ApiResult<Option<RouteTarget>> {
    ok(state.service.back(RouteTarget::new(req.level, req.lesson)).await?)
}

/// # POST /api/learn/:uid/level-up/ack
pub async fn level_up_acknowledged(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<Uuid>,
) -> ApiResult<Option<LevelUpEvent>> {
    ok(state.service.on_level_up_acknowledged(uid).await)
}

/// # GET /api/learn/:uid/path
pub async fn learning_path(State(state): State<Arc<AppState>>, Path(uid): Path<Uuid>) -> ApiResult<LearningPath> {
    ok(state.service.learning_path(uid).await?)
}

/// # GET /api/learn/:uid/events
/// Streams this learner's progress events as JSON text frames.
pub async fn learner_events(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let rx = state.service.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, uid, rx))
}

async fn stream_events(socket: WebSocket, learner: Uuid, mut rx: broadcast::Receiver<ProgressEvent>) {
    tracing::info!(%learner, "[WS] Event stream opened.");
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(event) if event.learner() == learner => {
                    let text = match event.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(error = %e, "[WS] Could not serialize event.");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(%learner, skipped, "[WS] Event stream lagged.");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::error!(error = %e, "[WS] Error.");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::info!(%learner, "[WS] Event stream closed.");
}
