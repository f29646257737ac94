//! 헬스 체크 endpoint.
//!
//! 로드밸런서용 `/health`와 컴포넌트별 상태를 보여주는 `/health/ready`를 제공합니다.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::state::AppState;

/// 서비스 이름.
pub const SERVICE_NAME: &str = "investorcenter-api";

/// `/health` 응답.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// "healthy" | "unhealthy"
    pub status: String,
    /// RFC 3339
    pub timestamp: String,
    pub service: String,
    /// "healthy" | "unhealthy" | "not_connected"
    pub database: String,
}

/// `/health/ready` 응답.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadinessResponse {
    /// "healthy" | "degraded" | "unhealthy"
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
    pub timestamp: String,
    pub components: ComponentHealth,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ComponentHealth {
    pub database: ComponentStatus,
    pub redis: ComponentStatus,
    pub market_data: ComponentStatus,
}

/// 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ComponentStatus {
    /// "up" | "down" | "not_configured"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    pub fn up() -> Self {
        Self {
            status: "up".to_string(),
            message: None,
        }
    }

    pub fn down(message: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            message: Some(message.into()),
        }
    }

    pub fn not_configured() -> Self {
        Self {
            status: "not_configured".to_string(),
            message: None,
        }
    }
}

/// 서버와 DB 연결 상태.
///
/// DB가 설정되어 있는데 응답하지 않으면 503입니다. DB 없이 실행 중이면
/// `database: "not_connected"`로 200을 반환합니다.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "정상", body = HealthResponse),
        (status = 503, description = "DB 연결 실패", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status_code, status, database) = match &state.db_pool {
        None => (StatusCode::OK, "healthy", "not_connected"),
        Some(_) if state.is_db_healthy().await => (StatusCode::OK, "healthy", "healthy"),
        Some(_) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy", "unhealthy"),
    };

    let response = HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        service: SERVICE_NAME.to_string(),
        database: database.to_string(),
    };
    (status_code, Json(response))
}

/// 의존성별 상세 상태.
#[utoipa::path(
    get,
    path = "/health/ready",
    responses(
        (status = 200, description = "준비 완료", body = ReadinessResponse),
        (status = 503, description = "DB 연결 실패", body = ReadinessResponse)
    ),
    tag = "health"
)]
pub async fn health_ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut overall = "healthy";
    let mut status_code = StatusCode::OK;

    let database = if state.db_pool.is_some() {
        if state.is_db_healthy().await {
            ComponentStatus::up()
        } else {
            overall = "unhealthy";
            status_code = StatusCode::SERVICE_UNAVAILABLE;
            ComponentStatus::down("connection failed")
        }
    } else {
        ComponentStatus::not_configured()
    };

    // Redis는 암호화폐 시세에만 쓰이므로 degraded로 처리
    let redis = if state.redis.is_some() {
        if state.is_redis_healthy().await {
            ComponentStatus::up()
        } else {
            if overall == "healthy" {
                overall = "degraded";
            }
            ComponentStatus::down("connection failed")
        }
    } else {
        ComponentStatus::not_configured()
    };

    let market_data = match &state.market_data {
        Some(_) => ComponentStatus::up(),
        None => ComponentStatus::not_configured(),
    };

    let response = ReadinessResponse {
        status: overall.to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        components: ComponentHealth {
            database,
            redis,
            market_data,
        },
    };
    (status_code, Json(response))
}

pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(health_check))
        .route("/ready", get(health_ready))
}
