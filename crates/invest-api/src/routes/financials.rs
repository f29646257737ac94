//! 재무제표 및 재무 지표 API.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/stocks/{ticker}/financials` - 손익/재무상태/현금흐름 요약 (`/all`과 동일)
//! - `GET /api/v1/stocks/{ticker}/financials/income` - 손익계산서
//! - `GET /api/v1/stocks/{ticker}/financials/balance` - 재무상태표
//! - `GET /api/v1/stocks/{ticker}/financials/cashflow` - 현금흐름표 (잉여현금흐름 포함)
//! - `GET /api/v1/stocks/{ticker}/financials/ratios` - 재무 비율
//! - `GET /api/v1/fundamentals/{symbol}` - 계산되어 저장된 재무 지표
//!
//! 쿼리: `timeframe=quarterly|annual|ttm` (기본 quarterly), `limit` (기본 8, 최대 40).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};

use invest_core::{StatementType, Timeframe};

use crate::error::{ApiError, ApiErrorResponse, ApiResult};
use crate::repository::financials::{
    FinancialPeriod, FinancialsMetadata, FinancialsRepository, FinancialsResponse, StoredMetrics,
    FINANCIALS_DEFAULT_LIMIT, FINANCIALS_MAX_LIMIT,
};
use crate::state::AppState;
use crate::types::TimestampMeta;
use crate::utils::capped_or;

// ================================================================================================
// Request/Response Types
// ================================================================================================

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FinancialsQuery {
    /// quarterly | annual | ttm
    pub timeframe: Option<String>,
    /// 1~40 (기본 8)
    pub limit: Option<String>,
}

impl FinancialsQuery {
    fn timeframe(&self) -> Timeframe {
        Timeframe::parse_or_default(self.timeframe.as_deref())
    }

    fn limit(&self) -> i64 {
        capped_or(
            self.limit.as_deref(),
            FINANCIALS_MAX_LIMIT,
            FINANCIALS_DEFAULT_LIMIT,
        )
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatementsResponse {
    pub data: FinancialsResponse,
    pub meta: TimestampMeta,
}

/// 세 재무제표 요약. 없는 제표는 `null`.
#[derive(Debug, Serialize, ToSchema)]
pub struct AllFinancials {
    pub ticker: String,
    pub timeframe: Timeframe,
    pub metadata: FinancialsMetadata,
    pub income: Option<Vec<FinancialPeriod>>,
    pub balance: Option<Vec<FinancialPeriod>>,
    pub cashflow: Option<Vec<FinancialPeriod>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AllFinancialsResponse {
    pub data: AllFinancials,
    pub meta: TimestampMeta,
}

fn financials_not_found(ticker: &str) -> ApiError {
    ApiError::custom(
        StatusCode::NOT_FOUND,
        ApiErrorResponse::simple("NOT_FOUND", "Financial data not found")
            .with_field("ticker", ticker.to_string()),
    )
}

async fn load_statements(
    state: &AppState,
    ticker: &str,
    statement_type: StatementType,
    query: &FinancialsQuery,
) -> ApiResult<Option<FinancialsResponse>> {
    let pool = state.db()?;
    FinancialsRepository::statements(pool, ticker, statement_type, query.timeframe(), query.limit())
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch financial statements", e))
}

async fn statement_response(
    state: &AppState,
    ticker: String,
    statement_type: StatementType,
    query: FinancialsQuery,
) -> ApiResult<Json<StatementsResponse>> {
    let ticker = ticker.trim().to_uppercase();
    let data = load_statements(state, &ticker, statement_type, &query)
        .await?
        .ok_or_else(|| financials_not_found(&ticker))?;
    Ok(Json(StatementsResponse {
        data,
        meta: TimestampMeta::now(),
    }))
}

// ================================================================================================
// Handlers
// ================================================================================================

/// 손익계산서.
#[utoipa::path(
    get,
    path = "/api/v1/stocks/{ticker}/financials/income",
    params(("ticker" = String, Path, description = "종목 심볼"), FinancialsQuery),
    responses(
        (status = 200, description = "기간별 손익계산서", body = StatementsResponse),
        (status = 404, description = "재무 데이터 없음", body = ApiErrorResponse)
    ),
    tag = "financials"
)]
pub async fn get_income_statements(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<FinancialsQuery>,
) -> ApiResult<Json<StatementsResponse>> {
    statement_response(&state, ticker, StatementType::Income, query).await
}

/// 재무상태표.
#[utoipa::path(
    get,
    path = "/api/v1/stocks/{ticker}/financials/balance",
    params(("ticker" = String, Path, description = "종목 심볼"), FinancialsQuery),
    responses(
        (status = 200, description = "기간별 재무상태표", body = StatementsResponse),
        (status = 404, description = "재무 데이터 없음", body = ApiErrorResponse)
    ),
    tag = "financials"
)]
pub async fn get_balance_sheets(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<FinancialsQuery>,
) -> ApiResult<Json<StatementsResponse>> {
    statement_response(&state, ticker, StatementType::BalanceSheet, query).await
}

/// 현금흐름표. 각 기간에 `free_cash_flow`가 추가됩니다.
#[utoipa::path(
    get,
    path = "/api/v1/stocks/{ticker}/financials/cashflow",
    params(("ticker" = String, Path, description = "종목 심볼"), FinancialsQuery),
    responses(
        (status = 200, description = "기간별 현금흐름표", body = StatementsResponse),
        (status = 404, description = "재무 데이터 없음", body = ApiErrorResponse)
    ),
    tag = "financials"
)]
pub async fn get_cash_flow_statements(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<FinancialsQuery>,
) -> ApiResult<Json<StatementsResponse>> {
    statement_response(&state, ticker, StatementType::CashFlow, query).await
}

#[utoipa::path(
    get,
    path = "/api/v1/stocks/{ticker}/financials/ratios",
    params(("ticker" = String, Path, description = "종목 심볼"), FinancialsQuery),
    responses(
        (status = 200, description = "기간별 재무 비율", body = StatementsResponse),
        (status = 404, description = "재무 데이터 없음", body = ApiErrorResponse)
    ),
    tag = "financials"
)]
pub async fn get_ratios(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<FinancialsQuery>,
) -> ApiResult<Json<StatementsResponse>> {
    statement_response(&state, ticker, StatementType::Ratios, query).await
}

/// 세 재무제표를 한 번에 조회합니다. 하나라도 있으면 200.
#[utoipa::path(
    get,
    path = "/api/v1/stocks/{ticker}/financials/all",
    params(("ticker" = String, Path, description = "종목 심볼"), FinancialsQuery),
    responses(
        (status = 200, description = "재무제표 요약", body = AllFinancialsResponse),
        (status = 404, description = "재무 데이터 없음", body = ApiErrorResponse)
    ),
    tag = "financials"
)]
pub async fn get_all_financials(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<FinancialsQuery>,
) -> ApiResult<Json<AllFinancialsResponse>> {
    let ticker = ticker.trim().to_uppercase();
    let income = load_statements(&state, &ticker, StatementType::Income, &query).await?;
    let balance = load_statements(&state, &ticker, StatementType::BalanceSheet, &query).await?;
    let cashflow = load_statements(&state, &ticker, StatementType::CashFlow, &query).await?;

    let metadata = [&income, &balance, &cashflow]
        .into_iter()
        .flatten()
        .map(|r| r.metadata.clone())
        .next()
        .ok_or_else(|| financials_not_found(&ticker))?;

    debug!(ticker = %ticker, "Serving financial statements summary");
    Ok(Json(AllFinancialsResponse {
        data: AllFinancials {
            timeframe: query.timeframe(),
            metadata,
            income: income.map(|r| r.periods),
            balance: balance.map(|r| r.periods),
            cashflow: cashflow.map(|r| r.periods),
            ticker,
        },
        meta: TimestampMeta::now(),
    }))
}

/// 저장된 재무 지표.
#[utoipa::path(
    get,
    path = "/api/v1/fundamentals/{symbol}",
    params(("symbol" = String, Path, description = "종목 심볼")),
    responses(
        (status = 200, description = "재무 지표", body = StoredMetrics),
        (status = 404, description = "계산된 지표 없음", body = ApiErrorResponse)
    ),
    tag = "financials"
)]
pub async fn get_fundamentals(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> ApiResult<Json<StoredMetrics>> {
    let symbol = symbol.trim().to_uppercase();
    let pool = state.db()?;
    FinancialsRepository::stored_metrics(pool, &symbol)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch fundamental metrics", e))?
        .map(Json)
        .ok_or_else(|| {
            ApiError::custom(
                StatusCode::NOT_FOUND,
                ApiErrorResponse::simple("NOT_FOUND", "No fundamental metrics found")
                    .with_field("symbol", symbol.clone()),
            )
        })
}

/// `/api/v1/stocks` 하위 라우터.
pub fn financials_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{ticker}/financials", get(get_all_financials))
        .route("/{ticker}/financials/all", get(get_all_financials))
        .route("/{ticker}/financials/income", get(get_income_statements))
        .route("/{ticker}/financials/balance", get(get_balance_sheets))
        .route("/{ticker}/financials/cashflow", get(get_cash_flow_statements))
        .route("/{ticker}/financials/ratios", get(get_ratios))
}

/// `/api/v1/fundamentals` 하위 라우터.
pub fn fundamentals_router() -> Router<Arc<AppState>> {
    Router::new().route("/{symbol}", get(get_fundamentals))
}
