//! 종목 API.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/tickers` - 종목 목록 또는 검색
//! - `POST /api/v1/tickers` - 종목 등록
//! - `GET /api/v1/tickers/{symbol}` - 종목 조회
//! - `GET /api/v1/tickers/{symbol}/price` - 실시간 가격 (암호화폐는 Redis, 주식은 시세 제공자)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::error::{is_unique_violation, ApiError, ApiErrorResponse, ApiResult};
use crate::repository::tickers::{NewStock, Stock};
use crate::repository::TickerRepository;
use crate::services::crypto;
use crate::state::AppState;
use crate::types::TimestampMeta;
use crate::utils::{in_range_or, parse_query_int};

/// 목록 기본 크기.
const DEFAULT_LIMIT: i64 = 100;
/// 목록 최대 크기.
const MAX_LIMIT: i64 = 1000;

// ================================================================================================
// Request/Response Types
// ================================================================================================

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StockListQuery {
    /// 1~1000 (기본 100)
    pub limit: Option<String>,
    pub offset: Option<String>,
    /// 심볼 또는 이름 검색어
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockListMeta {
    pub count: usize,
    pub limit: i64,
    pub offset: i64,
    /// 검색이 아닐 때만 제공
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockListResponse {
    pub data: Vec<Stock>,
    pub meta: StockListMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockDetail {
    #[serde(flatten)]
    pub stock: Stock,
    pub is_crypto: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockResponse {
    pub data: StockDetail,
    pub meta: TimestampMeta,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedStockResponse {
    pub data: Stock,
    pub meta: TimestampMeta,
}

/// 실시간 가격. 가격 필드는 소수 둘째 자리 문자열입니다.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PriceData {
    pub symbol: String,
    pub price: String,
    pub change: String,
    pub change_percent: String,
    pub volume: f64,
    /// Unix timestamp
    pub timestamp: i64,
    pub last_updated: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PriceMeta {
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PriceResponse {
    pub data: PriceData,
    pub meta: PriceMeta,
}

fn two_decimals(value: f64) -> String {
    format!("{:.2}", value)
}

// ================================================================================================
// Handlers
// ================================================================================================

/// 종목 목록.
///
/// `search`가 있으면 순위 검색 결과를 반환하고 `total`은 생략합니다.
#[utoipa::path(
    get,
    path = "/api/v1/tickers",
    params(StockListQuery),
    responses(
        (status = 200, description = "종목 목록", body = StockListResponse),
        (status = 503, description = "DB 없음", body = ApiErrorResponse)
    ),
    tag = "tickers"
)]
pub async fn list_stocks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StockListQuery>,
) -> ApiResult<Json<StockListResponse>> {
    let pool = state.db()?;
    let limit = in_range_or(query.limit.as_deref(), 1, MAX_LIMIT, DEFAULT_LIMIT);
    let offset = parse_query_int(query.offset.as_deref(), 0);
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let (stocks, total) = match &search {
        Some(term) => {
            let stocks = TickerRepository::search(pool, term, limit)
                .await
                .map_err(|e| ApiError::internal_with("Failed to search stocks", e))?;
            (stocks, None)
        }
        None => {
            let stocks = TickerRepository::list(pool, limit, offset)
                .await
                .map_err(|e| ApiError::internal_with("Failed to fetch stocks", e))?;
            let total = TickerRepository::count(pool).await.unwrap_or_else(|e| {
                warn!(error = %e, "Stock count failed");
                0
            });
            (stocks, Some(total))
        }
    };

    Ok(Json(StockListResponse {
        meta: StockListMeta {
            count: stocks.len(),
            limit,
            offset,
            total,
            search,
            timestamp: Utc::now(),
        },
        data: stocks,
    }))
}

/// 종목 등록.
#[utoipa::path(
    post,
    path = "/api/v1/tickers",
    request_body = NewStock,
    responses(
        (status = 201, description = "등록됨", body = CreatedStockResponse),
        (status = 400, description = "필수 필드 누락", body = ApiErrorResponse),
        (status = 409, description = "중복 심볼", body = ApiErrorResponse)
    ),
    tag = "tickers"
)]
pub async fn create_stock(
    State(state): State<Arc<AppState>>,
    Json(mut input): Json<NewStock>,
) -> ApiResult<(StatusCode, Json<CreatedStockResponse>)> {
    input.symbol = input.symbol.trim().to_uppercase();
    input.name = input.name.trim().to_string();
    if input.symbol.is_empty() || input.name.is_empty() {
        return Err(ApiError::bad_request("Symbol and name are required"));
    }

    let pool = state.db()?;
    let stock = TickerRepository::create(pool, &input).await.map_err(|e| {
        if is_unique_violation(&e) {
            ApiError::conflict("Stock with this symbol already exists")
        } else {
            ApiError::internal_with("Failed to create stock", e)
        }
    })?;

    info!(symbol = %stock.symbol, "Stock created");
    Ok((
        StatusCode::CREATED,
        Json(CreatedStockResponse {
            data: stock,
            meta: TimestampMeta::now(),
        }),
    ))
}

/// 심볼로 종목 조회 (대소문자 무시).
#[utoipa::path(
    get,
    path = "/api/v1/tickers/{symbol}",
    params(("symbol" = String, Path, description = "종목 심볼")),
    responses(
        (status = 200, description = "종목", body = StockResponse),
        (status = 404, description = "없음", body = ApiErrorResponse)
    ),
    tag = "tickers"
)]
pub async fn get_stock(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> ApiResult<Json<StockResponse>> {
    let pool = state.db()?;
    let symbol = symbol.trim().to_uppercase();

    let stock = TickerRepository::find_by_symbol(pool, &symbol)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch stock", e))?
        .ok_or_else(|| {
            ApiError::custom(
                StatusCode::NOT_FOUND,
                ApiErrorResponse::simple("NOT_FOUND", "Stock not found")
                    .with_field("symbol", symbol.clone()),
            )
        })?;

    Ok(Json(StockResponse {
        data: StockDetail {
            is_crypto: stock.is_crypto(),
            stock,
        },
        meta: TimestampMeta::now(),
    }))
}

/// 실시간 가격.
///
/// Redis에 암호화폐 시세가 있으면 그것을, 없으면 시세 제공자의 스냅샷을 사용합니다.
#[utoipa::path(
    get,
    path = "/api/v1/tickers/{symbol}/price",
    params(("symbol" = String, Path, description = "종목 심볼")),
    responses(
        (status = 200, description = "현재 가격", body = PriceResponse),
        (status = 404, description = "추적하지 않는 종목", body = ApiErrorResponse),
        (status = 503, description = "시세 소스 없음", body = ApiErrorResponse)
    ),
    tag = "tickers"
)]
pub async fn get_price(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> ApiResult<Json<PriceResponse>> {
    let symbol = symbol.trim().to_uppercase();

    if let Some(mut conn) = state.redis.clone() {
        match crypto::fetch_quote(&mut conn, &symbol).await {
            Ok(Some(quote)) => {
                debug!(symbol = %symbol, "Serving crypto price from Redis");
                return Ok(Json(PriceResponse {
                    data: PriceData {
                        symbol,
                        price: two_decimals(quote.price),
                        change: two_decimals(quote.change_amount_24h()),
                        change_percent: two_decimals(quote.change_24h),
                        volume: quote.volume_24h,
                        timestamp: Utc::now().timestamp(),
                        last_updated: quote.last_updated,
                        market_status: Some("open".to_string()),
                        asset_type: Some("crypto".to_string()),
                    },
                    meta: PriceMeta {
                        timestamp: Utc::now(),
                        source: "redis".to_string(),
                    },
                }));
            }
            Ok(None) => {}
            Err(e) => warn!(symbol = %symbol, error = %e, "Crypto price lookup failed"),
        }
    }

    let provider = state.market_data()?;
    let quote = provider.quote(&symbol).await.map_err(|e| {
        warn!(symbol = %symbol, error = %e, "Price lookup failed");
        ApiError::custom(
            StatusCode::NOT_FOUND,
            ApiErrorResponse::simple("NOT_FOUND", "Price not available")
                .with_field("symbol", symbol.clone())
                .with_field("message", "This ticker is not currently tracked"),
        )
    })?;

    Ok(Json(PriceResponse {
        data: PriceData {
            symbol,
            price: two_decimals(quote.price),
            change: two_decimals(quote.change),
            change_percent: two_decimals(quote.change_percent),
            volume: quote.volume as f64,
            timestamp: quote.timestamp.timestamp(),
            last_updated: quote.timestamp.to_rfc3339(),
            market_status: None,
            asset_type: None,
        },
        meta: PriceMeta {
            timestamp: Utc::now(),
            source: provider.name().to_string(),
        },
    }))
}

pub fn tickers_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_stocks).post(create_stock))
        .route("/{symbol}", get(get_stock))
        .route("/{symbol}/price", get(get_price))
}
