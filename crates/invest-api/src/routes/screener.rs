//! 종목 스크리너 API.
//!
//! `GET /api/v1/screener/stocks` 하나만 제공합니다. 파라미터 해석 규칙은
//! [`ScreenerParams::from_query`]에 있습니다.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use utoipa::ToSchema;

use crate::error::{ApiError, ApiErrorResponse, ApiResult};
use crate::repository::screener::{ScreenerParams, ScreenerStock};
use crate::repository::ScreenerRepository;
use crate::state::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct ScreenerMeta {
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScreenerResponse {
    pub data: Vec<ScreenerStock>,
    pub meta: ScreenerMeta,
}

/// 스크리너 결과.
///
/// `<filter>_min` / `<filter>_max` 범위 필터, `sectors` / `industries` 목록 필터,
/// `sort` / `order` 정렬, `page` / `limit` 페이지를 지원합니다.
#[utoipa::path(
    get,
    path = "/api/v1/screener/stocks",
    responses(
        (status = 200, description = "스크리너 결과", body = ScreenerResponse),
        (status = 503, description = "DB 없음", body = ApiErrorResponse)
    ),
    tag = "screener"
)]
pub async fn get_screener_stocks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> ApiResult<Json<ScreenerResponse>> {
    let pool = state.db_pool.as_ref().ok_or_else(|| {
        ApiError::custom(
            StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorResponse::simple("SERVICE_UNAVAILABLE", "Database not available")
                .with_field("message", "Screener service is temporarily unavailable"),
        )
    })?;

    let params = ScreenerParams::from_query(&query);
    debug!(
        sort = params.sort_column,
        page = params.page,
        limit = params.limit,
        ranges = params.ranges.len(),
        "Screener query"
    );

    let (stocks, total) = ScreenerRepository::search(pool, &params).await.map_err(|e| {
        tracing::error!(error = %e, "Screener query failed");
        ApiError::custom(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiErrorResponse::simple("INTERNAL_ERROR", "Failed to fetch stocks")
                .with_field("message", "An error occurred while retrieving screener data"),
        )
    })?;

    Ok(Json(ScreenerResponse {
        data: stocks,
        meta: ScreenerMeta {
            total,
            page: params.page,
            limit: params.limit,
            total_pages: params.total_pages(total),
            timestamp: Utc::now(),
        },
    }))
}

pub fn screener_router() -> Router<Arc<AppState>> {
    Router::new().route("/stocks", get(get_screener_stocks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::create_test_state;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_unavailable_body() {
        let app = Router::new()
            .nest("/screener", screener_router())
            .with_state(Arc::new(create_test_state()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/screener/stocks?pe_ratio_min=5&sectors=Technology")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Database not available");
        assert_eq!(json["message"], "Screener service is temporarily unavailable");
    }
}
