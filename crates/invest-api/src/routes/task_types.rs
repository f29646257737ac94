//! 작업 유형 관리 API (관리자 전용).
//!
//! - `GET /api/v1/admin/task-types` - 활성 유형 목록
//! - `POST /api/v1/admin/task-types` - 생성
//! - `PUT /api/v1/admin/task-types/{id}` - 라벨/SOP/파라미터 스키마 변경
//! - `DELETE /api/v1/admin/task-types/{id}` - 비활성화

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

use crate::auth::AdminUser;
use crate::error::{ApiError, ApiResult};
use crate::repository::task_types::{is_valid_task_type_name, TaskType};
use crate::repository::TaskTypeRepository;
use crate::state::AppState;
use crate::types::{success, MessageResponse, SuccessResponse};

const INVALID_NAME: &str =
    "Name must be lowercase alphanumeric with underscores only (1-100 chars)";

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskTypeRequest {
    pub name: String,
    #[validate(length(min = 1, max = 255, message = "Label is required"))]
    pub label: String,
    #[serde(default)]
    pub sop: String,
    pub param_schema: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskTypeRequest {
    pub label: Option<String>,
    pub sop: Option<String>,
    pub param_schema: Option<serde_json::Value>,
}

pub async fn list_task_types(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SuccessResponse<Vec<TaskType>>>> {
    let pool = state.db()?;
    let types = TaskTypeRepository::list_active(pool)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch task types", e))?;
    Ok(success(types))
}

pub async fn create_task_type(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateTaskTypeRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<TaskType>>)> {
    if !is_valid_task_type_name(&req.name) {
        return Err(ApiError::bad_request(INVALID_NAME));
    }
    req.validate()?;
    let pool = state.db()?;

    let task_type = TaskTypeRepository::create(
        pool,
        &req.name,
        req.label.trim(),
        &req.sop,
        req.param_schema.as_ref(),
    )
    .await
    .map_err(|e| {
        ApiError::internal_with("Failed to create task type. Name may already be in use.", e)
    })?;

    info!(task_type = %task_type.name, id = task_type.id, "Task type created");
    Ok((StatusCode::CREATED, success(task_type)))
}

pub async fn update_task_type(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(req): Json<UpdateTaskTypeRequest>,
) -> ApiResult<Json<SuccessResponse<TaskType>>> {
    let pool = state.db()?;
    TaskTypeRepository::update(
        pool,
        id,
        req.label.as_deref(),
        req.sop.as_deref(),
        req.param_schema.as_ref(),
    )
    .await
    .map_err(|e| ApiError::internal_with("Failed to update task type", e))?
    .map(success)
    .ok_or_else(|| ApiError::not_found("Task type not found"))
}

pub async fn delete_task_type(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> ApiResult<Json<MessageResponse>> {
    let pool = state.db()?;
    let deactivated = TaskTypeRepository::deactivate(pool, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to delete task type", e))?;
    if !deactivated {
        return Err(ApiError::not_found("Task type not found"));
    }
    Ok(MessageResponse::ok("Task type deleted successfully"))
}

pub fn task_types_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_task_types).post(create_task_type))
        .route("/{id}", put(update_task_type).delete(delete_task_type))
}
