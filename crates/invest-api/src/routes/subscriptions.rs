//! 구독 API.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/subscriptions/plans` - 활성 플랜 목록 (공개)
//! - `GET /api/v1/subscriptions/plans/{id}` - 플랜 상세 (공개)
//! - `GET /api/v1/subscriptions/me` - 내 구독 (없으면 free 플랜)
//! - `POST /api/v1/subscriptions` - 구독 생성
//! - `PUT /api/v1/subscriptions/me` - 플랜/결제 주기/결제 수단 변경
//! - `POST /api/v1/subscriptions/me/cancel` - 구독 취소
//! - `GET /api/v1/subscriptions/limits` - 플랜 한도
//! - `GET /api/v1/subscriptions/payments?limit=` - 결제 이력

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use invest_core::{BillingPeriod, SubscriptionStatus};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiErrorResponse, ApiResult};
use crate::repository::subscriptions::{
    PaymentRecord, SubscriptionChanges, SubscriptionLimits, SubscriptionPlan, UserSubscription,
    UserSubscriptionWithPlan,
};
use crate::repository::SubscriptionRepository;
use crate::state::AppState;
use crate::types::MessageResponse;

/// 결제 이력 기본 조회 수.
const DEFAULT_PAYMENTS_LIMIT: i64 = 50;

// ==================== Request/Response Types ====================

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSubscriptionRequest {
    pub plan_id: String,
    pub billing_period: String,
    pub payment_method: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateSubscriptionRequest {
    pub plan_id: Option<String>,
    pub billing_period: Option<String>,
    pub payment_method: Option<String>,
}

impl UpdateSubscriptionRequest {
    fn is_empty(&self) -> bool {
        self.plan_id.is_none() && self.billing_period.is_none() && self.payment_method.is_none()
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaymentsQuery {
    /// 최대 건수 (기본 50, 0 이하는 전체)
    pub limit: Option<String>,
}

/// 결제 이력 조회 수. 0 이하이거나 숫자가 아니면 제한 없음.
fn payments_limit(raw: Option<&str>) -> Option<i64> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        None => Some(DEFAULT_PAYMENTS_LIMIT),
        Some(v) => v.parse::<i64>().ok().filter(|n| *n > 0),
    }
}

/// 존재하는 플랜 ID로 변환합니다.
async fn existing_plan(pool: &PgPool, raw_id: &str) -> ApiResult<SubscriptionPlan> {
    let not_found = || ApiError::bad_request("subscription plan not found");
    let id = Uuid::parse_str(raw_id.trim()).map_err(|_| not_found())?;
    SubscriptionRepository::find_plan(pool, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch subscription plan", e))?
        .filter(|plan| plan.is_active)
        .ok_or_else(not_found)
}

/// 현재 활성 구독. free 플랜 행이 없어도 "구독 없음"으로 취급합니다.
async fn active_subscription(pool: &PgPool, user_id: Uuid) -> ApiResult<Option<UserSubscription>> {
    match SubscriptionRepository::current_for_user(pool, user_id).await {
        Ok(current) => Ok(current
            .subscription
            .filter(|s| s.status == SubscriptionStatus::Active.as_str())),
        Err(sqlx::Error::RowNotFound) => Ok(None),
        Err(e) => Err(ApiError::internal_with("Failed to fetch subscription", e)),
    }
}

// ==================== Handlers ====================

/// 활성 구독 플랜 (월 가격 오름차순).
#[utoipa::path(
    get,
    path = "/api/v1/subscriptions/plans",
    responses(
        (status = 200, description = "플랜 목록", body = Vec<SubscriptionPlan>),
        (status = 503, description = "DB 없음", body = ApiErrorResponse)
    ),
    tag = "subscriptions"
)]
pub async fn list_plans(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<SubscriptionPlan>>> {
    let pool = state.db()?;
    let plans = SubscriptionRepository::list_plans(pool)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch subscription plans", e))?;
    Ok(Json(plans))
}

#[utoipa::path(
    get,
    path = "/api/v1/subscriptions/plans/{id}",
    params(("id" = Uuid, Path, description = "플랜 ID")),
    responses(
        (status = 200, description = "플랜", body = SubscriptionPlan),
        (status = 404, description = "플랜 없음", body = ApiErrorResponse)
    ),
    tag = "subscriptions"
)]
pub async fn get_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SubscriptionPlan>> {
    let pool = state.db()?;
    SubscriptionRepository::find_plan(pool, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch subscription plan", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Subscription plan not found"))
}

pub async fn get_my_subscription(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<UserSubscriptionWithPlan>> {
    let pool = state.db()?;
    let current = SubscriptionRepository::current_for_user(pool, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch subscription", e))?;
    Ok(Json(current))
}

pub async fn create_subscription(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSubscriptionRequest>,
) -> ApiResult<(StatusCode, Json<UserSubscription>)> {
    let billing_period: BillingPeriod = req.billing_period.trim().parse()?;
    let pool = state.db()?;

    let plan = existing_plan(pool, &req.plan_id).await?;
    if active_subscription(pool, user.user_id).await?.is_some() {
        return Err(ApiError::conflict("user already has an active subscription"));
    }

    let mut subscription =
        SubscriptionRepository::create(pool, user.user_id, plan.id, billing_period, Utc::now())
            .await
            .map_err(|e| ApiError::internal_with("Failed to create subscription", e))?;

    if let Some(method) = req.payment_method.filter(|m| !m.is_empty()) {
        let changes = SubscriptionChanges {
            payment_method: Some(method),
            ..Default::default()
        };
        if let Some(updated) = SubscriptionRepository::update(pool, subscription.id, &changes)
            .await
            .map_err(|e| ApiError::internal_with("Failed to create subscription", e))?
        {
            subscription = updated;
        }
    }

    info!(
        user_id = %user.user_id,
        plan = %plan.name,
        billing_period = %billing_period,
        "Subscription created"
    );
    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn update_subscription(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateSubscriptionRequest>,
) -> ApiResult<Json<UserSubscription>> {
    if req.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    let billing_period = req
        .billing_period
        .as_deref()
        .map(|p| p.trim().parse::<BillingPeriod>())
        .transpose()?;

    let pool = state.db()?;
    let current = active_subscription(pool, user.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("No active subscription found"))?;

    let plan_id = match req.plan_id.as_deref() {
        Some(raw) => Some(existing_plan(pool, raw).await?.id),
        None => None,
    };

    let changes = SubscriptionChanges {
        plan_id,
        billing_period,
        payment_method: req.payment_method,
    };
    SubscriptionRepository::update(pool, current.id, &changes)
        .await
        .map_err(|e| ApiError::internal_with("Failed to update subscription", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("No active subscription found"))
}

pub async fn cancel_subscription(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<MessageResponse>> {
    let pool = state.db()?;
    let canceled = SubscriptionRepository::cancel(pool, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to cancel subscription", e))?;
    if !canceled {
        return Err(ApiError::not_found("Active subscription not found"));
    }

    info!(user_id = %user.user_id, "Subscription canceled");
    Ok(MessageResponse::ok("Subscription canceled successfully"))
}

pub async fn get_limits(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<SubscriptionLimits>> {
    let pool = state.db()?;
    let current = SubscriptionRepository::current_for_user(pool, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch subscription limits", e))?;
    Ok(Json(current.limits()))
}

pub async fn get_payments(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<PaymentsQuery>,
) -> ApiResult<Json<Vec<PaymentRecord>>> {
    let pool = state.db()?;
    let payments =
        SubscriptionRepository::payments(pool, user.user_id, payments_limit(query.limit.as_deref()))
            .await
            .map_err(|e| ApiError::internal_with("Failed to fetch payment history", e))?;
    Ok(Json(payments))
}

pub fn subscriptions_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_subscription))
        .route("/plans", get(list_plans))
        .route("/plans/{id}", get(get_plan))
        .route("/me", get(get_my_subscription).put(update_subscription))
        .route("/me/cancel", post(cancel_subscription))
        .route("/limits", get(get_limits))
        .route("/payments", get(get_payments))
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
            .nest("/subscriptions", subscriptions_router())
            .with_state(Arc::new(create_test_state()))
    }

    fn bearer() -> String {
        let claims = Claims::new(
            "9d1e2f3a-4b5c-4d6e-8f70-8192a3b4c5d6",
            "member@example.com",
            false,
            60,
        );
        format!("Bearer {}", create_token(&claims, TEST_JWT_SECRET).unwrap())
    }

    async fn send(
        method: Method,
        uri: &str,
        body: Option<&str>,
        auth: bool,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if auth {
            builder = builder.header(header::AUTHORIZATION, bearer());
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
    async fn test_plans_are_public() {
        // 토큰 없이도 인증 단계를 통과해 DB 확인까지 진행됩니다.
        let (status, _) = send(Method::GET, "/subscriptions/plans", None, false).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_me_requires_login() {
        let (status, _) = send(Method::GET, "/subscriptions/me", None, false).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_update_with_empty_body() {
        let (status, json) = send(Method::PUT, "/subscriptions/me", Some("{}"), true).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No fields to update");
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_billing_period() {
        let body = r#"{"plan_id":"00000000-0000-0000-0000-000000000001","billing_period":"weekly"}"#;
        let (status, json) = send(Method::POST, "/subscriptions", Some(body), true).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            json["error"],
            "invalid billing period: must be 'monthly' or 'yearly'"
        );
    }

    #[test]
    fn test_payments_limit() {
        assert_eq!(payments_limit(None), Some(50));
        assert_eq!(payments_limit(Some("10")), Some(10));
        assert_eq!(payments_limit(Some("0")), None);
        assert_eq!(payments_limit(Some("-5")), None);
        assert_eq!(payments_limit(Some("abc")), None);
    }
}
