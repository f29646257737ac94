//! API 라우트.
//!
//! 모든 REST API 엔드포인트를 정의하고 라우터를 구성합니다.
//!
//! # 라우트 구조
//!
//! - `/health` - 헬스 체크 (liveness)
//! - `/health/ready` - 상세 헬스 체크 (readiness)
//! - `/api/v1/tickers` - 종목 목록/상세/현재가
//! - `/api/v1/markets` - 검색, 상승/하락 종목, 지수
//! - `/api/v1/crypto` - 암호화폐 시세 (SSE 스트림 포함)
//! - `/api/v1/sentiment` - 소셜 감성 분석
//! - `/api/v1/screener` - 종목 스크리너
//! - `/api/v1/stocks/{ticker}/financials` - 재무제표
//! - `/api/v1/fundamentals` - 저장된 재무 지표
//! - `/api/v1/watchlists` - 관심 목록 (로그인 필요)
//! - `/api/v1/subscriptions` - 구독 플랜/결제 (플랜 조회 외 로그인 필요)
//! - `/api/v1/notifications` - 인앱 알림 (로그인 필요)
//! - `/api/v1/alerts` - 관심 종목 알림 규칙/발동 기록 (로그인 필요)
//! - `/api/v1/admin` - 관리자 조회, 워커/작업/작업 유형/노트 관리
//! - `/api/v1/worker` - 워커 전용 작업 API

pub mod admin;
pub mod alerts;
pub mod crypto;
pub mod financials;
pub mod health;
pub mod markets;
pub mod notes;
pub mod notifications;
pub mod screener;
pub mod sentiment;
pub mod subscriptions;
pub mod task_types;
pub mod tickers;
pub mod watchlists;
pub mod worker_api;
pub mod workers;

pub use admin::{admin_router, AdminListResponse, PageMeta};
pub use alerts::alerts_router;
pub use crypto::{crypto_router, CryptoPricesResponse};
pub use financials::{
    financials_router, fundamentals_router, AllFinancialsResponse, StatementsResponse,
};
pub use health::{health_router, ComponentHealth, ComponentStatus, HealthResponse, ReadinessResponse};
pub use markets::{markets_router, IndicesResponse, MoversResponse, SearchResponse};
pub use notes::notes_router;
pub use notifications::notifications_router;
pub use screener::{screener_router, ScreenerResponse};
pub use sentiment::{
    sentiment_router, PostsResponse, SentimentHistoryResponse, SentimentResponse, TrendingResponse,
};
pub use subscriptions::{subscriptions_router, CreateSubscriptionRequest, UpdateSubscriptionRequest};
pub use task_types::task_types_router;
pub use tickers::{tickers_router, PriceResponse, StockListResponse, StockResponse};
pub use watchlists::watchlists_router;
pub use worker_api::worker_router;
pub use workers::{admin_tasks_router, workers_router};

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// 관리자 라우터.
///
/// 데이터 조회 라우트에 워커/작업/작업 유형/노트 관리를 합칩니다.
fn admin_routes() -> Router<Arc<AppState>> {
    admin_router()
        .nest("/workers", workers_router())
        .nest("/tasks", admin_tasks_router())
        .nest("/task-types", task_types_router())
        .nest("/notes", notes_router())
}

/// 전체 API 라우터 생성.
///
/// 모든 서브 라우터를 조합하여 하나의 라우터로 반환합니다.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        // 헬스 체크 엔드포인트
        .nest("/health", health_router())
        // 공개 시장 데이터
        .nest("/api/v1/tickers", tickers_router())
        .nest("/api/v1/markets", markets_router())
        .nest("/api/v1/crypto", crypto_router())
        .nest("/api/v1/sentiment", sentiment_router())
        .nest("/api/v1/screener", screener_router())
        .nest("/api/v1/stocks", financials_router())
        .nest("/api/v1/fundamentals", fundamentals_router())
        // 사용자 기능
        .nest("/api/v1/watchlists", watchlists_router())
        .nest("/api/v1/subscriptions", subscriptions_router())
        .nest("/api/v1/notifications", notifications_router())
        .nest("/api/v1/alerts", alerts_router())
        // 관리자 / 워커
        .nest("/api/v1/admin", admin_routes())
        .nest("/api/v1/worker", worker_router())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{create_token, Claims};
    use crate::state::{create_test_state, TEST_JWT_SECRET};
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    fn app() -> Router {
        create_api_router().with_state(Arc::new(create_test_state()))
    }

    async fn status_of(uri: &str, bearer: Option<String>) -> StatusCode {
        let mut builder = Request::builder().uri(uri);
        if let Some(bearer) = bearer {
            builder = builder.header(header::AUTHORIZATION, bearer);
        }
        app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    fn admin_bearer() -> String {
        let claims = Claims::new(
            "0c1d2e3f-4a5b-4c6d-8e7f-90a1b2c3d4e5",
            "ops@example.com",
            true,
            60,
        );
        format!("Bearer {}", create_token(&claims, TEST_JWT_SECRET).unwrap())
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        assert_eq!(status_of("/api/v1/nope", None).await, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_protected_groups_require_auth() {
        for uri in [
            "/api/v1/watchlists",
            "/api/v1/notifications",
            "/api/v1/alerts",
            "/api/v1/alerts/logs",
            "/api/v1/subscriptions/me",
            "/api/v1/admin/stocks",
            "/api/v1/admin/workers",
            "/api/v1/worker/tasks",
        ] {
            assert_eq!(status_of(uri, None).await, StatusCode::UNAUTHORIZED, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_admin_subrouters_are_mounted() {
        for uri in [
            "/api/v1/admin/workers",
            "/api/v1/admin/tasks",
            "/api/v1/admin/task-types",
            "/api/v1/admin/notes/tree",
        ] {
            assert_eq!(
                status_of(uri, Some(admin_bearer())).await,
                StatusCode::SERVICE_UNAVAILABLE,
                "{uri}"
            );
        }
    }
}
