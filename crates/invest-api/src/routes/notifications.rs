//! 인앱 알림 API (로그인 사용자 전용).
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/notifications?unread_only=&limit=` - 알림 목록
//! - `GET /api/v1/notifications/unread-count` - 읽지 않은 알림 수
//! - `POST /api/v1/notifications/{id}/read` - 읽음 처리
//! - `POST /api/v1/notifications/read-all` - 전체 읽음 처리
//! - `POST /api/v1/notifications/{id}/dismiss` - 닫기
//! - `GET|PUT /api/v1/notifications/preferences` - 알림 설정
//! - `GET /api/v1/notifications/quiet-hours` - 현재 방해 금지 시간 여부

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::repository::notifications::{
    InAppNotification, NotificationPreferences, PreferenceChanges, DEFAULT_NOTIFICATION_LIMIT,
};
use crate::repository::NotificationRepository;
use crate::state::AppState;
use crate::utils::capped_or;

/// 알림 목록 최대 개수.
const MAX_NOTIFICATION_LIMIT: i64 = 200;

// ==================== Request/Response Types ====================

#[derive(Debug, Default, Deserialize)]
pub struct NotificationListQuery {
    pub unread_only: Option<String>,
    pub limit: Option<String>,
}

impl NotificationListQuery {
    fn unread_only(&self) -> bool {
        self.unread_only.as_deref() == Some("true")
    }

    fn limit(&self) -> i64 {
        capped_or(
            self.limit.as_deref(),
            MAX_NOTIFICATION_LIMIT,
            DEFAULT_NOTIFICATION_LIMIT,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ReadAllResponse {
    pub success: bool,
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct QuietHoursResponse {
    pub in_quiet_hours: bool,
}

fn ack() -> Json<AckResponse> {
    Json(AckResponse { success: true })
}

// ==================== Handlers ====================

pub async fn list_notifications(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<NotificationListQuery>,
) -> ApiResult<Json<Vec<InAppNotification>>> {
    let pool = state.db()?;
    let notifications =
        NotificationRepository::list(pool, user.user_id, query.unread_only(), query.limit())
            .await
            .map_err(|e| ApiError::internal_with("Failed to fetch notifications", e))?;
    Ok(Json(notifications))
}

pub async fn unread_count(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<UnreadCountResponse>> {
    let pool = state.db()?;
    let count = NotificationRepository::unread_count(pool, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to get unread count", e))?;
    Ok(Json(UnreadCountResponse { count }))
}

pub async fn mark_read(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AckResponse>> {
    let pool = state.db()?;
    let updated = NotificationRepository::mark_read(pool, id, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to mark notification as read", e))?;
    if !updated {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(ack())
}

pub async fn mark_all_read(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ReadAllResponse>> {
    let pool = state.db()?;
    let updated = NotificationRepository::mark_all_read(pool, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to mark all notifications as read", e))?;
    debug!(user_id = %user.user_id, updated, "Marked all notifications read");
    Ok(Json(ReadAllResponse {
        success: true,
        updated,
    }))
}

pub async fn dismiss(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AckResponse>> {
    let pool = state.db()?;
    let dismissed = NotificationRepository::dismiss(pool, id, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to dismiss notification", e))?;
    if !dismissed {
        return Err(ApiError::not_found("Notification not found"));
    }
    Ok(ack())
}

pub async fn get_preferences(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<NotificationPreferences>> {
    let pool = state.db()?;
    NotificationRepository::get_preferences(pool, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to get notification preferences", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Notification preferences not found"))
}

/// 알림 설정 부분 변경.
///
/// 검증 순서: 필드 규칙, 시각/타임존 형식, 변경 필드 존재 여부.
pub async fn update_preferences(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(changes): Json<PreferenceChanges>,
) -> ApiResult<Json<NotificationPreferences>> {
    changes.validate()?;
    changes.check_formats()?;
    if changes.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }

    let pool = state.db()?;
    NotificationRepository::update_preferences(pool, user.user_id, &changes)
        .await
        .map_err(|e| ApiError::internal_with("Failed to update notification preferences", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Notification preferences not found"))
}

/// 설정이 없는 사용자는 방해 금지 시간이 아닙니다.
pub async fn quiet_hours_status(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<QuietHoursResponse>> {
    let pool = state.db()?;
    let prefs = NotificationRepository::get_preferences(pool, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to get notification preferences", e))?;

    let in_quiet_hours = prefs
        .map(|p| p.is_in_quiet_hours(Utc::now()))
        .unwrap_or(false);
    Ok(Json(QuietHoursResponse { in_quiet_hours }))
}

pub fn notifications_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/preferences", get(get_preferences).put(update_preferences))
        .route("/quiet-hours", get(quiet_hours_status))
        .route("/{id}/read", post(mark_read))
        .route("/{id}/dismiss", post(dismiss))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{create_token, Claims};
    use crate::state::{create_test_state, TEST_JWT_SECRET};
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .nest("/notifications", notifications_router())
            .with_state(Arc::new(create_test_state()))
    }

    fn bearer() -> String {
        let claims = Claims::new(
            "1f2e3d4c-5b6a-4978-8695-a4b3c2d1e0f9",
            "reader@example.com",
            false,
            60,
        );
        format!("Bearer {}", create_token(&claims, TEST_JWT_SECRET).unwrap())
    }

    async fn put_preferences(body: &str) -> (StatusCode, serde_json::Value) {
        let response = app()
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/notifications/preferences")
                    .header(header::AUTHORIZATION, bearer())
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_requires_login() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/notifications/unread-count")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_list_without_database_is_503() {
        let response = app()
            .oneshot(
                Request::builder()
                    .uri("/notifications?unread_only=true&limit=10")
                    .header(header::AUTHORIZATION, bearer())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_update_preferences_with_nothing_to_change() {
        let (status, json) = put_preferences("{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No fields to update");
    }

    #[tokio::test]
    async fn test_update_preferences_rejects_bad_values() {
        let (status, json) = put_preferences(r#"{"weekly_digest_day": 9}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "weekly_digest_day must be between 0 and 6");

        let (status, _) = put_preferences(r#"{"quiet_hours_start": "25:99"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = put_preferences(r#"{"quiet_hours_timezone": "Mars/Olympus"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_list_query_defaults() {
        let query = NotificationListQuery::default();
        assert!(!query.unread_only());
        assert_eq!(query.limit(), 50);

        let query = NotificationListQuery {
            unread_only: Some("true".to_string()),
            limit: Some("1000".to_string()),
        };
        assert!(query.unread_only());
        assert_eq!(query.limit(), 200);
    }
}
