//! 관심 종목 알림 규칙 API (로그인 사용자 전용).
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/alerts?watch_list_id=&is_active=` - 규칙 목록
//! - `POST /api/v1/alerts` - 규칙 생성 (플랜 한도 적용)
//! - `GET|PUT|DELETE /api/v1/alerts/{id}` - 규칙 조회/수정/삭제
//! - `GET /api/v1/alerts/logs?alert_id=&symbol=&limit=&offset=` - 발동 기록
//! - `POST /api/v1/alerts/logs/{id}/read` - 기록 읽음 처리
//! - `POST /api/v1/alerts/logs/{id}/dismiss` - 기록 닫기

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use invest_core::{check_limit, AlertFrequency, AlertType, LimitType};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::repository::alerts::{
    AlertLog, AlertLogFilter, AlertRule, AlertRuleChanges, AlertRuleWithDetails, NewAlertRule,
    ALERT_LOG_DEFAULT_LIMIT, ALERT_LOG_MAX_LIMIT,
};
use crate::repository::{AlertRepository, SubscriptionRepository, WatchlistRepository};
use crate::state::AppState;
use crate::utils::{capped_or, parse_query_int};

/// 구독 정보를 못 읽을 때 적용하는 규칙 수 한도.
const FALLBACK_MAX_ALERT_RULES: i32 = 10;

const ALERT_LIMIT_REACHED: &str = "Alert limit reached. Upgrade to Premium for more alerts.";

// ==================== Request/Response Types ====================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAlertRequest {
    pub watch_list_id: Uuid,
    #[validate(length(min = 1, max = 20, message = "Symbol is required"))]
    pub symbol: String,
    pub alert_type: String,
    pub conditions: serde_json::Value,
    #[validate(length(min = 1, max = 255, message = "Name is required (max 255 characters)"))]
    pub name: String,
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,
    pub frequency: String,
    #[serde(default)]
    pub notify_email: bool,
    #[serde(default)]
    pub notify_in_app: bool,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAlertRequest {
    #[validate(length(min = 1, max = 255, message = "Name is required (max 255 characters)"))]
    pub name: Option<String>,
    #[validate(length(max = 5000, message = "Description must be at most 5000 characters"))]
    pub description: Option<String>,
    pub conditions: Option<serde_json::Value>,
    pub is_active: Option<bool>,
    pub frequency: Option<String>,
    pub notify_email: Option<bool>,
    pub notify_in_app: Option<bool>,
}

impl UpdateAlertRequest {
    fn into_changes(self) -> ApiResult<AlertRuleChanges> {
        let conditions = self.conditions.map(check_conditions).transpose()?;
        let frequency = self
            .frequency
            .as_deref()
            .map(str::parse::<AlertFrequency>)
            .transpose()?;
        Ok(AlertRuleChanges {
            name: self.name,
            description: self.description,
            conditions,
            is_active: self.is_active,
            frequency,
            notify_email: self.notify_email,
            notify_in_app: self.notify_in_app,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertListQuery {
    pub watch_list_id: Option<Uuid>,
    pub is_active: Option<String>,
}

impl AlertListQuery {
    /// 비어 있으면 필터 없음, `true` 외의 값은 false.
    fn is_active(&self) -> Option<bool> {
        self.is_active
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(|v| v == "true")
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertLogsQuery {
    pub alert_id: Option<String>,
    pub symbol: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl AlertLogsQuery {
    fn into_filter(self) -> ApiResult<AlertLogFilter> {
        let alert_rule_id = self
            .alert_id
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| {
                Uuid::parse_str(v).map_err(|_| ApiError::bad_request("Invalid alert_id"))
            })
            .transpose()?;
        Ok(AlertLogFilter {
            alert_rule_id,
            symbol: self
                .symbol
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty()),
            limit: capped_or(self.limit.as_deref(), ALERT_LOG_MAX_LIMIT, ALERT_LOG_DEFAULT_LIMIT),
            offset: parse_query_int(self.offset.as_deref(), 0),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub success: bool,
}

/// 조건은 JSON 객체여야 합니다.
fn check_conditions(conditions: serde_json::Value) -> ApiResult<serde_json::Value> {
    if conditions.is_object() {
        Ok(conditions)
    } else {
        Err(ApiError::bad_request("invalid conditions format"))
    }
}

// ==================== Handlers ====================

pub async fn list_alerts(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertListQuery>,
) -> ApiResult<Json<Vec<AlertRuleWithDetails>>> {
    let pool = state.db()?;
    let alerts = AlertRepository::list(pool, user.user_id, query.watch_list_id, query.is_active())
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch alerts", e))?;
    Ok(Json(alerts))
}

/// 규칙 생성.
///
/// 검증 순서: 본문 규칙, 관심 목록 소유권, 플랜 한도, 유형/빈도/조건, 목록 내 종목 여부.
pub async fn create_alert(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAlertRequest>,
) -> ApiResult<(StatusCode, Json<AlertRule>)> {
    req.validate()?;
    let pool = state.db()?;

    WatchlistRepository::find_owned(pool, req.watch_list_id, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch watch list", e))?
        .ok_or_else(|| ApiError::forbidden("Watch list not found"))?;

    let count = AlertRepository::count_for_user(pool, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to check limits", e))?;
    let allowed = match SubscriptionRepository::current_for_user(pool, user.user_id).await {
        Ok(current) => current.limits().allows(LimitType::AlertRules, count),
        Err(e) => {
            warn!(user_id = %user.user_id, error = %e, "Subscription lookup failed, using fallback alert limit");
            check_limit(FALLBACK_MAX_ALERT_RULES, count)
        }
    };
    if !allowed {
        return Err(ApiError::forbidden(ALERT_LIMIT_REACHED));
    }

    let alert_type: AlertType = req.alert_type.trim().parse()?;
    let frequency: AlertFrequency = req.frequency.trim().parse()?;
    let conditions = check_conditions(req.conditions)?;
    let symbol = req.symbol.trim().to_uppercase();

    let in_list = WatchlistRepository::has_symbol(pool, req.watch_list_id, &symbol)
        .await
        .map_err(|e| ApiError::internal_with("Failed to validate watch list", e))?;
    if !in_list {
        return Err(ApiError::bad_request("symbol not found in watch list"));
    }

    let rule = NewAlertRule {
        watch_list_id: req.watch_list_id,
        symbol,
        alert_type,
        conditions,
        name: req.name.trim().to_string(),
        description: req.description,
        frequency,
        notify_email: req.notify_email,
        notify_in_app: req.notify_in_app,
    };
    let created = AlertRepository::create(pool, user.user_id, &rule)
        .await
        .map_err(|e| ApiError::internal_with("Failed to create alert", e))?;

    info!(user_id = %user.user_id, alert_id = %created.id, symbol = %created.symbol, "Alert rule created");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_alert(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AlertRule>> {
    let pool = state.db()?;
    AlertRepository::find(pool, id, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch alert", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Alert not found"))
}

pub async fn update_alert(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAlertRequest>,
) -> ApiResult<Json<AlertRule>> {
    req.validate()?;
    let changes = req.into_changes()?;
    if changes.is_empty() {
        return Err(ApiError::bad_request("no fields to update"));
    }

    let pool = state.db()?;
    AlertRepository::update(pool, id, user.user_id, &changes)
        .await
        .map_err(|e| ApiError::internal_with("Failed to update alert", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Alert not found"))
}

pub async fn delete_alert(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let pool = state.db()?;
    let deleted = AlertRepository::delete(pool, id, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to delete alert", e))?;
    if !deleted {
        return Err(ApiError::not_found("Alert not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_alert_logs(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertLogsQuery>,
) -> ApiResult<Json<Vec<AlertLog>>> {
    let filter = query.into_filter()?;
    let pool = state.db()?;
    let logs = AlertRepository::list_logs(pool, user.user_id, &filter)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch alert logs", e))?;
    Ok(Json(logs))
}

pub async fn mark_log_read(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AckResponse>> {
    let pool = state.db()?;
    let updated = AlertRepository::mark_log_read(pool, id, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to mark alert log as read", e))?;
    if !updated {
        return Err(ApiError::not_found("Alert log not found"));
    }
    Ok(Json(AckResponse { success: true }))
}

pub async fn dismiss_log(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AckResponse>> {
    let pool = state.db()?;
    let dismissed = AlertRepository::dismiss_log(pool, id, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to dismiss alert log", e))?;
    if !dismissed {
        return Err(ApiError::not_found("Alert log not found"));
    }
    Ok(Json(AckResponse { success: true }))
}

pub fn alerts_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_alerts).post(create_alert))
        .route("/logs", get(list_alert_logs))
        .route("/logs/{id}/read", post(mark_log_read))
        .route("/logs/{id}/dismiss", post(dismiss_log))
        .route(
            "/{id}",
            get(get_alert).put(update_alert).delete(delete_alert),
        )
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

    const ALERT_ID: &str = "3e4f5a6b-7c8d-4e9f-a0b1-c2d3e4f5a6b7";

    fn app() -> Router {
        Router::new()
            .nest("/alerts", alerts_router())
            .with_state(Arc::new(create_test_state()))
    }

    fn bearer() -> String {
        let claims = Claims::new(
            "7d6c5b4a-3928-4716-a5b4-c3d2e1f0a9b8",
            "alerts@example.com",
            false,
            60,
        );
        format!("Bearer {}", create_token(&claims, TEST_JWT_SECRET).unwrap())
    }

    async fn send(method: Method, uri: &str, body: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, bearer());
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
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    #[tokio::test]
    async fn test_requires_login() {
        let response = app()
            .oneshot(Request::builder().uri("/alerts").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_without_database_is_503() {
        for (method, uri) in [
            (Method::GET, "/alerts".to_string()),
            (Method::GET, "/alerts/logs".to_string()),
            (Method::GET, format!("/alerts/{ALERT_ID}")),
            (Method::DELETE, format!("/alerts/{ALERT_ID}")),
            (Method::POST, format!("/alerts/logs/{ALERT_ID}/read")),
            (Method::POST, format!("/alerts/logs/{ALERT_ID}/dismiss")),
        ] {
            let (status, _) = send(method, &uri, None).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_create_validates_name_before_database() {
        let body = r#"{"watch_list_id":"3e4f5a6b-7c8d-4e9f-a0b1-c2d3e4f5a6b7","symbol":"AAPL",
            "alert_type":"price_above","conditions":{"threshold":200},"name":"","frequency":"once"}"#;
        let (status, body) = send(Method::POST, "/alerts", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Name is required"));
    }

    #[tokio::test]
    async fn test_update_rejects_bad_fields_before_database() {
        let uri = format!("/alerts/{ALERT_ID}");

        let (status, body) = send(Method::PUT, &uri, Some("{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("no fields to update"));

        let (status, body) = send(Method::PUT, &uri, Some(r#"{"frequency":"weekly"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("invalid frequency"));

        let (status, body) = send(Method::PUT, &uri, Some(r#"{"conditions":[1,2]}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("invalid conditions format"));
    }

    #[tokio::test]
    async fn test_logs_reject_malformed_alert_id() {
        let (status, body) = send(Method::GET, "/alerts/logs?alert_id=abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Invalid alert_id"));
    }

    #[test]
    fn test_log_filter_defaults_and_caps() {
        let filter = AlertLogsQuery::default().into_filter().unwrap();
        assert_eq!(filter.limit, ALERT_LOG_DEFAULT_LIMIT);
        assert_eq!(filter.offset, 0);
        assert!(filter.alert_rule_id.is_none());

        let filter = AlertLogsQuery {
            alert_id: Some(ALERT_ID.into()),
            symbol: Some(" nvda ".into()),
            limit: Some("100000".into()),
            offset: Some("-5".into()),
        }
        .into_filter()
        .unwrap();
        assert_eq!(filter.limit, ALERT_LOG_MAX_LIMIT);
        assert_eq!(filter.offset, 0);
        assert_eq!(filter.symbol.as_deref(), Some("NVDA"));
        assert_eq!(filter.alert_rule_id, Some(Uuid::parse_str(ALERT_ID).unwrap()));
    }

    #[test]
    fn test_is_active_filter() {
        let query = |v: Option<&str>| AlertListQuery {
            watch_list_id: None,
            is_active: v.map(String::from),
        };
        assert_eq!(query(None).is_active(), None);
        assert_eq!(query(Some("")).is_active(), None);
        assert_eq!(query(Some("true")).is_active(), Some(true));
        assert_eq!(query(Some("1")).is_active(), Some(false));
    }
}
