//! 시장 개요 API.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/markets/search?q=` - 종목 검색 (최대 10건)
//! - `GET /api/v1/markets/movers?limit=` - 급등/급락/거래량 상위
//! - `GET /api/v1/markets/indices` - 주요 지수 (ETF 프록시)

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::error::{ApiError, ApiErrorResponse, ApiResult};
use crate::metrics::record_movers_cache;
use crate::repository::TickerRepository;
use crate::services::{select_movers, MarketMovers};
use crate::state::AppState;
use crate::utils::in_range_or;

/// 검색 결과 최대 건수.
const SEARCH_LIMIT: i64 = 10;
const DEFAULT_MOVERS_LIMIT: i64 = 5;
const MAX_MOVERS_LIMIT: i64 = 20;

/// (ETF 심볼, 지수 이름)
const INDEX_PROXIES: &[(&str, &str)] = &[
    ("SPY", "S&P 500"),
    ("DIA", "Dow Jones"),
    ("QQQ", "NASDAQ"),
    ("IWM", "Russell 2000"),
    ("VIXY", "VIX"),
];

// ================================================================================================
// Request/Response Types
// ================================================================================================

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// 검색어
    pub q: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SecuritySearchResult {
    pub symbol: String,
    pub name: String,
    #[serde(rename = "type")]
    pub asset_type: String,
    pub exchange: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchMeta {
    pub query: String,
    pub count: usize,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub data: Vec<SecuritySearchResult>,
    pub meta: SearchMeta,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MoversQuery {
    /// 1~20 (기본 5)
    pub limit: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MoversMeta {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub cached: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MoversResponse {
    pub data: MarketMovers,
    pub meta: MoversMeta,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub symbol: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub last_updated: String,
    /// "usd"
    pub display_format: String,
    /// "etf_proxy"
    pub data_type: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IndicesMeta {
    pub count: usize,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IndicesResponse {
    pub data: Vec<IndexInfo>,
    pub meta: IndicesMeta,
}

// ================================================================================================
// Handlers
// ================================================================================================

/// 종목 검색.
#[utoipa::path(
    get,
    path = "/api/v1/markets/search",
    params(SearchQuery),
    responses(
        (status = 200, description = "검색 결과", body = SearchResponse),
        (status = 400, description = "검색어 없음", body = ApiErrorResponse)
    ),
    tag = "markets"
)]
pub async fn search_securities(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let term = query.q.as_deref().map(str::trim).unwrap_or_default();
    if term.is_empty() {
        return Err(ApiError::bad_request("Search query is required"));
    }

    let pool = state.db()?;
    let stocks = TickerRepository::search(pool, term, SEARCH_LIMIT)
        .await
        .map_err(|e| ApiError::internal_with("Failed to search securities", e))?;

    let data: Vec<SecuritySearchResult> = stocks
        .into_iter()
        .map(|s| SecuritySearchResult {
            symbol: s.symbol,
            name: s.name,
            asset_type: s.asset_type,
            exchange: s.exchange,
        })
        .collect();

    Ok(Json(SearchResponse {
        meta: SearchMeta {
            query: term.to_string(),
            count: data.len(),
            timestamp: Utc::now(),
            source: "database".to_string(),
        },
        data,
    }))
}

/// 급등/급락/거래량 상위 종목.
///
/// 같은 limit의 결과는 캐시 TTL 동안 재사용합니다.
#[utoipa::path(
    get,
    path = "/api/v1/markets/movers",
    params(MoversQuery),
    responses(
        (status = 200, description = "상위 종목", body = MoversResponse),
        (status = 503, description = "시세 제공자 실패", body = ApiErrorResponse)
    ),
    tag = "markets"
)]
pub async fn get_movers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MoversQuery>,
) -> ApiResult<Json<MoversResponse>> {
    let limit = in_range_or(
        query.limit.as_deref(),
        1,
        MAX_MOVERS_LIMIT,
        DEFAULT_MOVERS_LIMIT,
    ) as usize;

    let cached = state.movers_cache.get(limit).await;
    record_movers_cache(cached.is_some());
    if let Some(movers) = cached {
        debug!(limit, "Serving cached market movers");
        return Ok(Json(MoversResponse {
            data: movers,
            meta: MoversMeta {
                timestamp: Utc::now(),
                source: "polygon.io".to_string(),
                cached: true,
            },
        }));
    }

    let provider = state.market_data()?;
    let snapshots = provider.bulk_snapshot().await.map_err(|e| {
        warn!(error = %e, "Bulk snapshot failed");
        ApiError::custom(
            StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorResponse::simple(
                "SERVICE_UNAVAILABLE",
                "Failed to fetch market movers from Polygon.io",
            )
            .with_field("meta", json!({ "timestamp": Utc::now() })),
        )
    })?;

    let mut movers = select_movers(&snapshots, limit);

    if let Some(pool) = &state.db_pool {
        match TickerRepository::names_for(pool, &movers.symbols()).await {
            Ok(names) => movers.apply_names(&names),
            Err(e) => warn!(error = %e, "Mover name lookup failed"),
        }
    }

    state.movers_cache.set(limit, movers.clone()).await;
    info!(
        gainers = movers.gainers.len(),
        losers = movers.losers.len(),
        most_active = movers.most_active.len(),
        "Fetched market movers"
    );

    Ok(Json(MoversResponse {
        data: movers,
        meta: MoversMeta {
            timestamp: Utc::now(),
            source: provider.name().to_string(),
            cached: false,
        },
    }))
}

/// 주요 지수. 일부 실패는 건너뛰고, 모두 실패하면 503.
#[utoipa::path(
    get,
    path = "/api/v1/markets/indices",
    responses(
        (status = 200, description = "지수 목록", body = IndicesResponse),
        (status = 503, description = "조회 실패", body = ApiErrorResponse)
    ),
    tag = "markets"
)]
pub async fn get_indices(State(state): State<Arc<AppState>>) -> ApiResult<Json<IndicesResponse>> {
    let provider = state.market_data()?;

    let results = join_all(INDEX_PROXIES.iter().map(|(symbol, name)| {
        let provider = Arc::clone(&provider);
        async move { (symbol, name, provider.quote(symbol).await) }
    }))
    .await;

    let mut indices = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for (symbol, name, result) in results {
        match result {
            Ok(quote) => indices.push(IndexInfo {
                symbol: symbol.to_string(),
                name: name.to_string(),
                price: quote.price,
                change: quote.change,
                change_percent: quote.change_percent,
                last_updated: quote.timestamp.to_rfc3339(),
                display_format: "usd".to_string(),
                data_type: "etf_proxy".to_string(),
            }),
            Err(e) => {
                let message = format!("Failed to fetch {} ({}): {}", name, symbol, e);
                warn!("{}", message);
                errors.push(message);
            }
        }
    }

    if indices.is_empty() {
        return Err(ApiError::custom(
            StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorResponse::simple(
                "SERVICE_UNAVAILABLE",
                "Failed to fetch market indices from Polygon.io. Please check API key and connectivity.",
            )
            .with_details(json!(errors))
            .with_field("meta", json!({ "timestamp": Utc::now() })),
        ));
    }

    Ok(Json(IndicesResponse {
        meta: IndicesMeta {
            count: indices.len(),
            timestamp: Utc::now(),
            source: provider.name().to_string(),
        },
        data: indices,
    }))
}

pub fn markets_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/search", get(search_securities))
        .route("/movers", get(get_movers))
        .route("/indices", get(get_indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        DayBar, LastTrade, MarketDataError, MarketDataProvider, MoverStock, TickerSnapshot,
    };
    use crate::state::create_test_state;
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    /// SPY와 QQQ만 응답하는 제공자.
    struct PartialProvider;

    fn snapshot(ticker: &str, pct: f64, volume: f64) -> TickerSnapshot {
        TickerSnapshot {
            ticker: ticker.to_string(),
            todays_change: pct,
            todays_change_perc: pct,
            day: DayBar {
                open: 100.0,
                high: 110.0,
                low: 90.0,
                close: 100.0 + pct,
                volume,
            },
            last_trade: LastTrade {
                price: 100.0 + pct,
                timestamp_ns: 0,
            },
            prev_day: DayBar::default(),
        }
    }

    #[async_trait]
    impl MarketDataProvider for PartialProvider {
        fn name(&self) -> &str {
            "polygon.io"
        }

        async fn bulk_snapshot(&self) -> Result<Vec<TickerSnapshot>, MarketDataError> {
            Ok(vec![
                snapshot("UP", 5.0, 500_000.0),
                snapshot("DOWN", -4.0, 300_000.0),
                snapshot("THIN", 9.0, 10.0),
            ])
        }

        async fn ticker_snapshot(&self, symbol: &str) -> Result<TickerSnapshot, MarketDataError> {
            match symbol {
                "SPY" | "QQQ" => Ok(snapshot(symbol, 1.0, 1_000_000.0)),
                _ => Err(MarketDataError::Status(500)),
            }
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl MarketDataProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn bulk_snapshot(&self) -> Result<Vec<TickerSnapshot>, MarketDataError> {
            Err(MarketDataError::Api("upstream down".into()))
        }

        async fn ticker_snapshot(&self, _symbol: &str) -> Result<TickerSnapshot, MarketDataError> {
            Err(MarketDataError::Status(503))
        }
    }

    fn app(state: AppState) -> Router {
        Router::new()
            .nest("/markets", markets_router())
            .with_state(Arc::new(state))
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let (status, json) = get_json(app(create_test_state()), "/markets/search?q=%20").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Search query is required");
    }

    #[tokio::test]
    async fn test_movers_from_provider() {
        let state = create_test_state().with_market_data(Arc::new(PartialProvider));
        let (status, json) = get_json(app(state), "/markets/movers?limit=50").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["meta"]["cached"], false);
        assert_eq!(json["meta"]["source"], "polygon.io");
        assert_eq!(json["data"]["gainers"][0]["symbol"], "UP");
        assert_eq!(json["data"]["losers"][0]["symbol"], "DOWN");
        assert_eq!(json["data"]["mostActive"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_movers_served_from_cache() {
        let state = create_test_state();
        let cached = MarketMovers {
            gainers: vec![MoverStock {
                symbol: "CACHED".into(),
                name: String::new(),
                price: 10.0,
                change: 1.0,
                change_percent: 10.0,
                volume: 200_000.0,
            }],
            ..Default::default()
        };
        state.movers_cache.set(5, cached).await;

        // 제공자가 없어도 캐시가 있으면 응답한다
        let (status, json) = get_json(app(state), "/markets/movers").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["meta"]["cached"], true);
        assert_eq!(json["data"]["gainers"][0]["symbol"], "CACHED");
    }

    #[tokio::test]
    async fn test_movers_vendor_failure_is_503() {
        let state = create_test_state().with_market_data(Arc::new(FailingProvider));
        let (status, json) = get_json(app(state), "/markets/movers").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], "Failed to fetch market movers from Polygon.io");
    }

    #[tokio::test]
    async fn test_indices_skip_failures() {
        let state = create_test_state().with_market_data(Arc::new(PartialProvider));
        let (status, json) = get_json(app(state), "/markets/indices").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["meta"]["count"], 2);
        assert_eq!(json["data"][0]["symbol"], "SPY");
        assert_eq!(json["data"][0]["name"], "S&P 500");
        assert_eq!(json["data"][0]["displayFormat"], "usd");
        assert_eq!(json["data"][1]["name"], "NASDAQ");
    }

    #[tokio::test]
    async fn test_indices_all_failed_is_503_with_details() {
        let state = create_test_state().with_market_data(Arc::new(FailingProvider));
        let (status, json) = get_json(app(state), "/markets/indices").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["details"].as_array().unwrap().len(), INDEX_PROXIES.len());
    }
}
