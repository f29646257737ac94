//! 워커 작업 큐 관리 API (관리자 전용).
//!
//! 응답은 `{"success": true, "data": ...}` 형식입니다.
//!
//! # 엔드포인트
//!
//! ## 워커 (`/api/v1/admin/workers`)
//! - `GET /` - 활성 워커 목록 (작업 수, 온라인 여부)
//! - `POST /` - 워커 계정 생성
//! - `DELETE /{id}` - 워커 권한 해제
//!
//! ## 작업 (`/api/v1/admin/tasks`)
//! - `GET /?status=&assigned_to=` - 작업 목록
//! - `POST /` - 작업 생성
//! - `GET|PUT|DELETE /{id}` - 작업 조회/수정/삭제
//! - `GET|POST /{id}/updates` - 진행 기록
//! - `GET /{id}/data?data_type=&ticker=&limit=&offset=` - 수집 데이터

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use invest_core::{TaskPriority, TaskStatus};

use crate::auth::{hash_password, AdminUser};
use crate::error::{ApiError, ApiResult};
use crate::repository::tasks::{
    NewTask, TaskChanges, TaskDataFilter, TaskDataRow, TaskUpdate, WorkerTask,
    TASK_DATA_DEFAULT_LIMIT, TASK_DATA_MAX_LIMIT,
};
use crate::repository::workers::WorkerInfo;
use crate::repository::{TaskRepository, WorkerRepository};
use crate::state::AppState;
use crate::types::{success, MessageResponse, SuccessResponse};
use crate::utils::{capped_or, parse_query_int};

// ==================== Request/Response Types ====================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterWorkerRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1, max = 255, message = "Full name is required"))]
    pub full_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<String>,
    pub assigned_to: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 500, message = "Title is required"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub assigned_to: Option<Uuid>,
    pub priority: Option<String>,
    pub task_type_id: Option<i32>,
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub status: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUpdateRequest {
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskDataQuery {
    pub data_type: Option<String>,
    pub ticker: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl TaskDataQuery {
    fn to_filter(&self) -> TaskDataFilter {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        TaskDataFilter {
            data_type: non_empty(&self.data_type),
            ticker: non_empty(&self.ticker).map(|t| t.to_uppercase()),
            limit: capped_or(
                self.limit.as_deref(),
                TASK_DATA_MAX_LIMIT,
                TASK_DATA_DEFAULT_LIMIT,
            ),
            offset: parse_query_int(self.offset.as_deref(), 0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskDataListResponse {
    pub success: bool,
    pub data: Vec<TaskDataRow>,
    pub total: i64,
}

fn parse_priority(raw: Option<&str>) -> ApiResult<Option<TaskPriority>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => Ok(Some(value.parse()?)),
        None => Ok(None),
    }
}

fn parse_status(raw: Option<&str>) -> ApiResult<Option<TaskStatus>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => Ok(Some(value.parse()?)),
        None => Ok(None),
    }
}

// ==================== Workers ====================

pub async fn list_workers(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SuccessResponse<Vec<WorkerInfo>>>> {
    let pool = state.db()?;
    let workers = WorkerRepository::list(pool)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch workers", e))?;
    Ok(success(workers))
}

pub async fn register_worker(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterWorkerRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<WorkerInfo>>)> {
    req.validate()?;
    let pool = state.db()?;

    let password_hash = hash_password(&req.password)
        .map_err(|e| ApiError::internal_with("Failed to create worker", e))?;
    let email = req.email.trim().to_lowercase();

    let worker = WorkerRepository::register(pool, &email, &password_hash, req.full_name.trim())
        .await
        .map_err(|e| {
            ApiError::internal_with("Failed to create worker. Email may already be in use.", e)
        })?;

    info!(admin_id = %admin.user_id, worker_id = %worker.id, "Worker registered");
    Ok((StatusCode::CREATED, success(worker)))
}

pub async fn delete_worker(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let pool = state.db()?;
    let removed = WorkerRepository::remove(pool, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to remove worker", e))?;
    if !removed {
        return Err(ApiError::not_found("Worker not found"));
    }

    info!(admin_id = %admin.user_id, worker_id = %id, "Worker removed");
    Ok(MessageResponse::ok("Worker removed successfully"))
}

// ==================== Tasks ====================

pub async fn list_tasks(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<TaskListQuery>,
) -> ApiResult<Json<SuccessResponse<Vec<WorkerTask>>>> {
    let status = parse_status(query.status.as_deref())?;
    let assigned_to = query
        .assigned_to
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|raw| Uuid::parse_str(raw).map_err(|_| ApiError::bad_request("Invalid assigned_to")))
        .transpose()?;

    let pool = state.db()?;
    let tasks = TaskRepository::list(pool, status, assigned_to)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch tasks", e))?;
    Ok(success(tasks))
}

pub async fn get_task(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<WorkerTask>>> {
    let pool = state.db()?;
    TaskRepository::find(pool, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch task", e))?
        .map(success)
        .ok_or_else(|| ApiError::not_found("Task not found"))
}

pub async fn create_task(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<WorkerTask>>)> {
    req.validate()?;
    let priority = parse_priority(req.priority.as_deref())?.unwrap_or_default();
    let pool = state.db()?;

    let new_task = NewTask {
        title: req.title.trim().to_string(),
        description: req.description,
        assigned_to: req.assigned_to,
        priority,
        task_type_id: req.task_type_id,
        params: req.params,
    };
    let task = TaskRepository::create(pool, &new_task, admin.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to create task", e))?;

    info!(task_id = %task.id, priority = %priority, "Task created");
    Ok((StatusCode::CREATED, success(task)))
}

pub async fn update_task(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateTaskRequest>,
) -> ApiResult<Json<SuccessResponse<WorkerTask>>> {
    let changes = TaskChanges {
        title: req.title,
        description: req.description,
        assigned_to: req.assigned_to,
        status: parse_status(req.status.as_deref())?,
        priority: parse_priority(req.priority.as_deref())?,
    };
    let pool = state.db()?;

    TaskRepository::update(pool, id, &changes)
        .await
        .map_err(|e| ApiError::internal_with("Failed to update task", e))?
        .map(success)
        .ok_or_else(|| ApiError::not_found("Task not found"))
}

pub async fn delete_task(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let pool = state.db()?;
    let deleted = TaskRepository::delete(pool, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to delete task", e))?;
    if !deleted {
        return Err(ApiError::not_found("Task not found"));
    }
    Ok(MessageResponse::ok("Task deleted successfully"))
}

// ==================== Task Updates ====================

pub async fn list_task_updates(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<Vec<TaskUpdate>>>> {
    let pool = state.db()?;
    let updates = TaskRepository::list_updates(pool, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch updates", e))?;
    Ok(success(updates))
}

pub async fn create_task_update(
    AdminUser(admin): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateUpdateRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<TaskUpdate>>)> {
    req.validate()?;
    let pool = state.db()?;

    if TaskRepository::find(pool, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch task", e))?
        .is_none()
    {
        return Err(ApiError::not_found("Task not found"));
    }

    let update = TaskRepository::add_update(pool, id, &req.content, admin.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to create update", e))?;
    Ok((StatusCode::CREATED, success(update)))
}

// ==================== Task Data ====================

pub async fn list_task_data(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<TaskDataQuery>,
) -> ApiResult<Json<TaskDataListResponse>> {
    let pool = state.db()?;
    let (data, total) = TaskRepository::list_task_data(pool, id, &query.to_filter())
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch task data", e))?;
    Ok(Json(TaskDataListResponse {
        success: true,
        data,
        total,
    }))
}

pub fn workers_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_workers).post(register_worker))
        .route("/{id}", delete(delete_worker))
}

pub fn admin_tasks_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/{id}", get(get_task).put(update_task).delete(delete_task))
        .route(
            "/{id}/updates",
            get(list_task_updates).post(create_task_update),
        )
        .route("/{id}/data", get(list_task_data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{create_token, Claims};
    use crate::state::{create_test_state, TEST_JWT_SECRET};
    use axum::{
        body::Body,
        http::{header, Method, Request},
    };
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .nest("/admin/workers", workers_router())
            .nest("/admin/tasks", admin_tasks_router())
            .with_state(Arc::new(create_test_state()))
    }

    fn bearer(is_admin: bool) -> String {
        let claims = Claims::new(
            "3c2b1a09-8f7e-4d6c-9b5a-4f3e2d1c0b9a",
            "ops@example.com",
            is_admin,
            60,
        );
        format!("Bearer {}", create_token(&claims, TEST_JWT_SECRET).unwrap())
    }

    async fn send(
        method: Method,
        uri: &str,
        body: Option<&str>,
        auth: Option<String>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_admin_only() {
        let (status, _) = send(Method::GET, "/admin/workers", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(Method::GET, "/admin/tasks", None, Some(bearer(false))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_without_database_is_503() {
        let (status, _) = send(
            Method::GET,
            "/admin/tasks?status=pending",
            None,
            Some(bearer(true)),
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_list_rejects_unknown_status() {
        let (status, json) =
            send(Method::GET, "/admin/tasks?status=archived", None, Some(bearer(true))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid status: archived");
    }

    #[tokio::test]
    async fn test_create_task_requires_title() {
        let (status, json) = send(
            Method::POST,
            "/admin/tasks",
            Some(r#"{"title":"","priority":"high"}"#),
            Some(bearer(true)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Title is required");
    }

    #[tokio::test]
    async fn test_register_validates_email() {
        let (status, json) = send(
            Method::POST,
            "/admin/workers",
            Some(r#"{"email":"not-an-email","password":"longenough","full_name":"Kim"}"#),
            Some(bearer(true)),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Invalid email address");
    }

    #[test]
    fn test_task_data_filter() {
        let query = TaskDataQuery {
            data_type: Some(" earnings ".to_string()),
            ticker: Some("aapl".to_string()),
            limit: Some("5000".to_string()),
            offset: None,
        };
        let filter = query.to_filter();
        assert_eq!(filter.data_type.as_deref(), Some("earnings"));
        assert_eq!(filter.ticker.as_deref(), Some("AAPL"));
        assert_eq!(filter.limit, 1000);
        assert_eq!(filter.offset, 0);

        let filter = TaskDataQuery::default().to_filter();
        assert_eq!(filter.limit, 100);
        assert!(filter.data_type.is_none());
    }
}
