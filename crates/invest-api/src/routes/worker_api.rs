//! 워커 전용 API.
//!
//! 워커는 본인에게 배정된 작업만 조회하고 갱신할 수 있습니다. 모든 요청은
//! [`WorkerUser`] 추출기를 거치며, 이때 마지막 활동 시각이 갱신됩니다.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/worker/tasks?status=` - 배정된 작업 목록
//! - `GET /api/v1/worker/tasks/{id}` - 작업 상세 (작업 유형 SOP 포함)
//! - `PUT /api/v1/worker/tasks/{id}/status` - 상태 변경
//! - `GET|POST /api/v1/worker/tasks/{id}/updates` - 진행 기록
//! - `POST /api/v1/worker/tasks/{id}/result` - 결과 제출 (진행 중일 때만)
//! - `POST /api/v1/worker/tasks/{id}/data` - 수집 데이터 일괄 입력
//! - `GET /api/v1/worker/task-types/{id}` - 작업 유형
//! - `POST /api/v1/worker/heartbeat` - 생존 신호

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

use invest_core::TaskStatus;

use crate::auth::WorkerUser;
use crate::error::{ApiError, ApiResult};
use crate::repository::task_types::TaskType;
use crate::repository::tasks::{BulkInsertOutcome, TaskDataItem, TaskUpdate, WorkerTask};
use crate::repository::{TaskRepository, TaskTypeRepository};
use crate::state::AppState;
use crate::types::{success, MessageResponse, SuccessResponse};

const NOT_ASSIGNED: &str = "Task not found or not assigned to you";
const INVALID_STATUS: &str = "Invalid status. Must be one of: in_progress, completed, failed";

// ==================== Request Types ====================

#[derive(Debug, Default, Deserialize)]
pub struct MyTasksQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PostUpdateRequest {
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ResultRequest {
    pub result: serde_json::Value,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TaskDataRequest {
    #[validate(length(min = 1, max = 100, message = "data_type is required"))]
    pub data_type: String,
    #[validate(length(min = 1, max = 1000, message = "items must contain 1 to 1000 entries"))]
    pub items: Vec<TaskDataItem>,
}

/// 워커가 설정할 수 있는 상태로 변환합니다.
fn worker_status(raw: &str) -> ApiResult<TaskStatus> {
    raw.trim()
        .parse::<TaskStatus>()
        .ok()
        .filter(TaskStatus::is_worker_settable)
        .ok_or_else(|| ApiError::bad_request(INVALID_STATUS))
}

async fn ensure_assigned(pool: &PgPool, worker_id: Uuid, task_id: Uuid) -> ApiResult<()> {
    let assigned = TaskRepository::is_assigned(pool, worker_id, task_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch task", e))?;
    if assigned {
        Ok(())
    } else {
        Err(ApiError::not_found(NOT_ASSIGNED))
    }
}

// ==================== Handlers ====================

pub async fn my_tasks(
    WorkerUser(worker_id): WorkerUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<MyTasksQuery>,
) -> ApiResult<Json<SuccessResponse<Vec<WorkerTask>>>> {
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<TaskStatus>)
        .transpose()?;
    let pool = state.db()?;
    let tasks = TaskRepository::list_assigned(pool, worker_id, status)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch tasks", e))?;
    Ok(success(tasks))
}

pub async fn get_task(
    WorkerUser(worker_id): WorkerUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<WorkerTask>>> {
    let pool = state.db()?;
    TaskRepository::find_assigned(pool, worker_id, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch task", e))?
        .map(success)
        .ok_or_else(|| ApiError::not_found(NOT_ASSIGNED))
}

pub async fn update_status(
    WorkerUser(worker_id): WorkerUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<Json<SuccessResponse<WorkerTask>>> {
    let status = worker_status(&req.status)?;
    let pool = state.db()?;

    let task = TaskRepository::set_status(pool, worker_id, id, status)
        .await
        .map_err(|e| ApiError::internal_with("Failed to update status", e))?
        .ok_or_else(|| ApiError::not_found(NOT_ASSIGNED))?;

    info!(worker_id = %worker_id, task_id = %id, status = %status, "Task status changed");
    Ok(success(task))
}

pub async fn list_updates(
    WorkerUser(worker_id): WorkerUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<Vec<TaskUpdate>>>> {
    let pool = state.db()?;
    ensure_assigned(pool, worker_id, id).await?;

    let updates = TaskRepository::list_updates(pool, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch updates", e))?;
    Ok(success(updates))
}

pub async fn post_update(
    WorkerUser(worker_id): WorkerUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<PostUpdateRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<TaskUpdate>>)> {
    let pool = state.db()?;
    ensure_assigned(pool, worker_id, id).await?;
    req.validate()?;

    let update = TaskRepository::add_update(pool, id, &req.content, worker_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to create update", e))?;
    Ok((StatusCode::CREATED, success(update)))
}

pub async fn post_result(
    WorkerUser(worker_id): WorkerUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ResultRequest>,
) -> ApiResult<Json<SuccessResponse<WorkerTask>>> {
    let pool = state.db()?;
    let status = TaskRepository::assigned_status(pool, worker_id, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to check task status", e))?
        .ok_or_else(|| ApiError::not_found(NOT_ASSIGNED))?;

    if status != TaskStatus::InProgress.as_str() {
        return Err(ApiError::bad_request(
            "Can only post results to tasks with status 'in_progress'",
        ));
    }

    TaskRepository::set_result(pool, worker_id, id, &req.result)
        .await
        .map_err(|e| ApiError::internal_with("Failed to save result", e))?
        .map(success)
        .ok_or_else(|| ApiError::not_found(NOT_ASSIGNED))
}

pub async fn post_task_data(
    WorkerUser(worker_id): WorkerUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<TaskDataRequest>,
) -> ApiResult<Json<SuccessResponse<BulkInsertOutcome>>> {
    let pool = state.db()?;
    ensure_assigned(pool, worker_id, id).await?;
    req.validate()?;

    let outcome = TaskRepository::insert_task_data(pool, id, req.data_type.trim(), &req.items)
        .await
        .map_err(|e| ApiError::internal_with("Failed to save task data", e))?;

    debug!(
        task_id = %id,
        data_type = %req.data_type,
        inserted = outcome.inserted,
        skipped = outcome.skipped,
        "Task data stored"
    );
    Ok(success(outcome))
}

pub async fn get_task_type(
    WorkerUser(_): WorkerUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Json<SuccessResponse<TaskType>>> {
    let pool = state.db()?;
    TaskTypeRepository::find_active(pool, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch task type", e))?
        .map(success)
        .ok_or_else(|| ApiError::not_found("Task type not found"))
}

/// 추출기가 활동 시각을 이미 갱신했으므로 응답만 돌려줍니다.
pub async fn heartbeat(WorkerUser(_): WorkerUser) -> Json<MessageResponse> {
    MessageResponse::ok("Heartbeat received")
}

pub fn worker_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(my_tasks))
        .route("/tasks/{id}", get(get_task))
        .route("/tasks/{id}/status", put(update_status))
        .route("/tasks/{id}/updates", get(list_updates).post(post_update))
        .route("/tasks/{id}/result", post(post_result))
        .route("/tasks/{id}/data", post(post_task_data))
        .route("/task-types/{id}", get(get_task_type))
        .route("/heartbeat", post(heartbeat))
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
            .nest("/worker", worker_router())
            .with_state(Arc::new(create_test_state()))
    }

    #[tokio::test]
    async fn test_requires_token() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/worker/heartbeat")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_worker_check_needs_database() {
        let claims = Claims::new(
            "2b3c4d5e-6f70-4182-93a4-b5c6d7e8f901",
            "worker@example.com",
            false,
            60,
        );
        let token = create_token(&claims, TEST_JWT_SECRET).unwrap();

        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/worker/tasks")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_task_data_request_bounds() {
        let req: TaskDataRequest =
            serde_json::from_str(r#"{"data_type":"reddit_post","items":[]}"#).unwrap();
        let err = req.validate().unwrap_err();
        assert!(err.field_errors().contains_key("items"));

        let req: TaskDataRequest = serde_json::from_str(
            r#"{"data_type":"reddit_post","items":[{"ticker":"AAPL","external_id":"t3_abc","data":{"score":12}}]}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.items[0].external_id.as_deref(), Some("t3_abc"));
    }

    #[test]
    fn test_worker_status() {
        assert_eq!(worker_status("in_progress").unwrap(), TaskStatus::InProgress);
        assert_eq!(worker_status(" completed ").unwrap(), TaskStatus::Completed);
        assert_eq!(worker_status("failed").unwrap(), TaskStatus::Failed);

        for bad in ["pending", "done", ""] {
            let err = worker_status(bad).unwrap_err();
            assert_eq!(err.to_string(), INVALID_STATUS);
        }
    }
}
