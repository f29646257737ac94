//! 기능 노트(위키) API (관리자 전용).
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/admin/notes/tree` - 그룹 → 기능 트리 (섹션별 노트 수)
//! - `GET|POST /api/v1/admin/notes/groups`
//! - `PUT|DELETE /api/v1/admin/notes/groups/{id}`
//! - `GET|POST /api/v1/admin/notes/groups/{id}/features`
//! - `PUT|DELETE /api/v1/admin/notes/features/{id}`
//! - `GET|POST /api/v1/admin/notes/features/{id}/notes?section=`
//! - `PUT|DELETE /api/v1/admin/notes/notes/{id}`

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use invest_core::NoteSection;

use crate::auth::AdminUser;
use crate::error::{ApiError, ApiResult};
use crate::repository::notes::{
    Feature, FeatureGroup, FeatureNote, GroupWithFeatures, NoteChanges, OutlineChanges,
};
use crate::repository::NotesRepository;
use crate::state::AppState;
use crate::types::{success, MessageResponse, SuccessResponse};

/// 제목이 비어 있을 때 쓰는 기본값.
const DEFAULT_NOTE_TITLE: &str = "Untitled";

// ==================== Request Types ====================

/// 그룹/기능 생성.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateOutlineRequest {
    #[validate(length(min = 1, max = 255, message = "Name is required (max 255 characters)"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 10000, message = "Notes must be at most 10000 characters"))]
    pub notes: String,
}

/// 그룹/기능 부분 변경.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateOutlineRequest {
    #[validate(length(max = 255, message = "Name must be at most 255 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 10000, message = "Notes must be at most 10000 characters"))]
    pub notes: Option<String>,
    #[validate(range(min = 0, max = 10000, message = "sort_order must be between 0 and 10000"))]
    pub sort_order: Option<i32>,
}

impl From<UpdateOutlineRequest> for OutlineChanges {
    fn from(req: UpdateOutlineRequest) -> Self {
        Self {
            name: req.name,
            notes: req.notes,
            sort_order: req.sort_order,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateNoteRequest {
    pub section: String,
    #[serde(default)]
    #[validate(length(max = 500, message = "Title must be at most 500 characters"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 50000, message = "Content must be at most 50000 characters"))]
    pub content: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateNoteRequest {
    #[validate(length(max = 500, message = "Title must be at most 500 characters"))]
    pub title: Option<String>,
    #[validate(length(max = 50000, message = "Content must be at most 50000 characters"))]
    pub content: Option<String>,
    #[validate(range(min = 0, max = 10000, message = "sort_order must be between 0 and 10000"))]
    pub sort_order: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct NotesQuery {
    pub section: Option<String>,
}

fn note_title(title: &str) -> &str {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        DEFAULT_NOTE_TITLE
    } else {
        trimmed
    }
}

// ==================== Tree ====================

pub async fn get_tree(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SuccessResponse<Vec<GroupWithFeatures>>>> {
    let pool = state.db()?;
    let tree = NotesRepository::tree(pool)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch notes tree", e))?;
    Ok(success(tree))
}

// ==================== Groups ====================

pub async fn list_groups(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SuccessResponse<Vec<FeatureGroup>>>> {
    let pool = state.db()?;
    let groups = NotesRepository::list_groups(pool)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch groups", e))?;
    Ok(success(groups))
}

pub async fn create_group(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOutlineRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<FeatureGroup>>)> {
    req.validate()?;
    let pool = state.db()?;
    let group = NotesRepository::create_group(pool, req.name.trim(), &req.notes)
        .await
        .map_err(|e| ApiError::internal_with("Failed to create group", e))?;
    Ok((StatusCode::CREATED, success(group)))
}

pub async fn update_group(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateOutlineRequest>,
) -> ApiResult<Json<SuccessResponse<FeatureGroup>>> {
    req.validate()?;
    let pool = state.db()?;
    NotesRepository::update_group(pool, id, &req.into())
        .await
        .map_err(|e| ApiError::internal_with("Failed to update group", e))?
        .map(success)
        .ok_or_else(|| ApiError::not_found("Group not found"))
}

pub async fn delete_group(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let pool = state.db()?;
    let deleted = NotesRepository::delete_group(pool, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to delete group", e))?;
    if !deleted {
        return Err(ApiError::not_found("Group not found"));
    }
    Ok(MessageResponse::ok("Group deleted successfully"))
}

// ==================== Features ====================

pub async fn list_features(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<Uuid>,
) -> ApiResult<Json<SuccessResponse<Vec<Feature>>>> {
    let pool = state.db()?;
    let features = NotesRepository::list_features(pool, group_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch features", e))?;
    Ok(success(features))
}

pub async fn create_feature(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<CreateOutlineRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<Feature>>)> {
    req.validate()?;
    let pool = state.db()?;
    let feature = NotesRepository::create_feature(pool, group_id, req.name.trim(), &req.notes)
        .await
        .map_err(|e| ApiError::internal_with("Failed to create feature", e))?;
    Ok((StatusCode::CREATED, success(feature)))
}

pub async fn update_feature(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateOutlineRequest>,
) -> ApiResult<Json<SuccessResponse<Feature>>> {
    req.validate()?;
    let pool = state.db()?;
    NotesRepository::update_feature(pool, id, &req.into())
        .await
        .map_err(|e| ApiError::internal_with("Failed to update feature", e))?
        .map(success)
        .ok_or_else(|| ApiError::not_found("Feature not found"))
}

pub async fn delete_feature(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let pool = state.db()?;
    let deleted = NotesRepository::delete_feature(pool, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to delete feature", e))?;
    if !deleted {
        return Err(ApiError::not_found("Feature not found"));
    }
    Ok(MessageResponse::ok("Feature deleted successfully"))
}

// ==================== Notes ====================

pub async fn list_notes(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(feature_id): Path<Uuid>,
    Query(query): Query<NotesQuery>,
) -> ApiResult<Json<SuccessResponse<Vec<FeatureNote>>>> {
    let section = query
        .section
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<NoteSection>)
        .transpose()?;

    let pool = state.db()?;
    let notes = NotesRepository::list_notes(pool, feature_id, section)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch notes", e))?;
    Ok(success(notes))
}

pub async fn create_note(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(feature_id): Path<Uuid>,
    Json(req): Json<CreateNoteRequest>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<FeatureNote>>)> {
    req.validate()?;
    let section: NoteSection = req.section.trim().parse()?;
    let pool = state.db()?;

    let note = NotesRepository::create_note(
        pool,
        feature_id,
        section,
        note_title(&req.title),
        &req.content,
    )
    .await
    .map_err(|e| ApiError::internal_with("Failed to create note", e))?;
    Ok((StatusCode::CREATED, success(note)))
}

pub async fn update_note(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateNoteRequest>,
) -> ApiResult<Json<SuccessResponse<FeatureNote>>> {
    req.validate()?;
    let changes = NoteChanges {
        title: req.title,
        content: req.content,
        sort_order: req.sort_order,
    };
    let pool = state.db()?;

    NotesRepository::update_note(pool, id, &changes)
        .await
        .map_err(|e| ApiError::internal_with("Failed to update note", e))?
        .map(success)
        .ok_or_else(|| ApiError::not_found("Note not found"))
}

pub async fn delete_note(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    let pool = state.db()?;
    let deleted = NotesRepository::delete_note(pool, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to delete note", e))?;
    if !deleted {
        return Err(ApiError::not_found("Note not found"));
    }
    Ok(MessageResponse::ok("Note deleted successfully"))
}

pub fn notes_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tree", get(get_tree))
        .route("/groups", get(list_groups).post(create_group))
        .route("/groups/{id}", put(update_group).delete(delete_group))
        .route(
            "/groups/{id}/features",
            get(list_features).post(create_feature),
        )
        .route("/features/{id}", put(update_feature).delete(delete_feature))
        .route("/features/{id}/notes", get(list_notes).post(create_note))
        .route("/notes/{id}", put(update_note).delete(delete_note))
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

    const FEATURE_ID: &str = "4d3c2b1a-0f9e-48d7-86c5-b4a392817060";

    fn admin_bearer() -> String {
        let claims = Claims::new(
            "8a7b6c5d-4e3f-4a1b-9c8d-7e6f5a4b3c2d",
            "wiki@example.com",
            true,
            60,
        );
        format!("Bearer {}", create_token(&claims, TEST_JWT_SECRET).unwrap())
    }

    async fn send(method: Method, uri: &str, body: Option<&str>) -> (StatusCode, serde_json::Value) {
        let app = Router::new()
            .nest("/notes", notes_router())
            .with_state(Arc::new(create_test_state()));

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, admin_bearer());
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_tree_without_database_is_503() {
        let (status, _) = send(Method::GET, "/notes/tree", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_create_note_rejects_unknown_section() {
        let uri = format!("/notes/features/{FEATURE_ID}/notes");
        let (status, json) = send(Method::POST, &uri, Some(r#"{"section":"mobile"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json["error"],
            "Invalid section. Must be one of: ui, backend, data, infra"
        );
    }

    #[tokio::test]
    async fn test_list_notes_rejects_unknown_section_filter() {
        let uri = format!("/notes/features/{FEATURE_ID}/notes?section=mobile");
        let (status, _) = send(Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_group_limits() {
        let (status, json) = send(Method::POST, "/notes/groups", Some(r#"{"name":""}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Name is required (max 255 characters)");

        let uri = format!("/notes/groups/{FEATURE_ID}");
        let (status, json) = send(Method::PUT, &uri, Some(r#"{"sort_order":10001}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "sort_order must be between 0 and 10000");
    }

    #[test]
    fn test_note_title_default() {
        assert_eq!(note_title("  "), "Untitled");
        assert_eq!(note_title(" Rollout plan "), "Rollout plan");
    }
}
