/*!
    HTTP surface of the task repository.

    | Method | Path                              |
    |--------|-----------------------------------|
    | GET    | /api/tasks                        |
    | POST   | /api/tasks                        |
    | GET    | /api/tasks/{id}                   |
    | PUT    | /api/tasks/{id}                   |
    | DELETE | /api/tasks/{id}                   |
    | GET    | /api/tasks/status/{isCompleted}   |
!*/
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{FromRequest, FromRequestParts, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::ServerSettings;
use crate::repository::{RepositoryError, TaskRepository};
use crate::task::{NewTask, Task, TaskChanges, is_valid_title};

pub const TASKS_PATH: &str = "/api/tasks";

#[derive(Debug, Clone)]
pub struct AppState {
    pub tasks: TaskRepository,
}

impl AppState {
    pub fn new(tasks: TaskRepository) -> Self {
        AppState { tasks }
    }
}

/// Body of every non-success response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("task with id {0} was not found")]
    NotFound(i64),
    #[error("task with id {0} was changed concurrently, try again")]
    Conflict(i64),
    #[error("internal error: {0}")]
    Internal(RepositoryError),
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Conflict { id } => ApiError::Conflict(id),
            other => ApiError::Internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let message = match &self {
            ApiError::Internal(error) => {
                tracing::error!(%error, "request failed");
                "An internal server error occurred".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            code: code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

/// A body that doesn't match the expected shape is a validation failure;
/// anything else wrong with it is a bad request.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(error) => ApiError::Validation(error.body_text()),
            other => ApiError::BadRequest(other.body_text()),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// `Json` whose rejections answer with an [`ErrorBody`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
struct ApiJson<T>(T);

/// `Path` whose rejections answer with an [`ErrorBody`].
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
struct ApiPath<T>(T);

const EMPTY_TITLE: &str = "title must not be empty";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(TASKS_PATH, get(list_tasks).post(create_task))
        .route(
            &format!("{TASKS_PATH}/{{id}}"),
            get(get_task).put(update_task).delete(delete_task),
        )
        .route(
            &format!("{TASKS_PATH}/status/{{is_completed}}"),
            get(tasks_by_status),
        )
        .with_state(state)
}

/// CORS for browser front ends served from `allowed_origins`.
pub fn cors(settings: &ServerSettings) -> Result<CorsLayer, header::InvalidHeaderValue> {
    let origins = settings
        .allowed_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any))
}

async fn list_tasks(State(state): State<AppState>) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.tasks.list_tasks().await?))
}

async fn tasks_by_status(
    State(state): State<AppState>,
    ApiPath(is_completed): ApiPath<bool>,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.tasks.list_by_status(is_completed).await?))
}

async fn get_task(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Task>, ApiError> {
    state
        .tasks
        .get_task(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

async fn create_task(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewTask>,
) -> Result<impl IntoResponse, ApiError> {
    if !is_valid_title(&input.title) {
        return Err(ApiError::Validation(EMPTY_TITLE.to_string()));
    }
    let task = state.tasks.create_task(input).await?;
    let location = format!("{TASKS_PATH}/{}", task.id);
    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(task)))
}

async fn update_task(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(changes): ApiJson<TaskChanges>,
) -> Result<Json<Task>, ApiError> {
    if !is_valid_title(&changes.title) {
        return Err(ApiError::Validation(EMPTY_TITLE.to_string()));
    }
    state
        .tasks
        .update_task(id, changes)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

async fn delete_task(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    if state.tasks.delete_task(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(id))
    }
}
