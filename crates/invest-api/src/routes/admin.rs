//! 관리자 데이터 조회 API.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/admin/stocks` - 종목 목록 (검색, 정렬)
//! - `GET /api/v1/admin/users` - 사용자 목록
//! - `GET /api/v1/admin/news` - 뉴스 목록
//! - `GET /api/v1/admin/fundamentals` - 재무 지표 목록
//! - `GET /api/v1/admin/sec-financials` - SEC 공시 재무
//! - `GET /api/v1/admin/ttm-financials` - TTM 재무
//! - `GET /api/v1/admin/valuation-ratios` - 밸류에이션 비율
//! - `GET /api/v1/admin/alerts` - 알림 규칙 목록
//! - `GET /api/v1/admin/watchlists` - 전체 관심 목록
//! - `GET /api/v1/admin/stats` - 테이블별 행 수

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use crate::auth::AdminUser;
use crate::error::{ApiError, ApiResult};
use crate::repository::admin::{
    AdminAlertRule, AdminFundamental, AdminNewsArticle, AdminPage, AdminSecFinancial, AdminStock,
    AdminTtmFinancial, AdminUser as AdminUserRow, AdminValuationRatio, AdminWatchList,
    STOCK_SORT_COLUMNS,
};
use crate::repository::AdminRepository;
use crate::state::AppState;
use crate::utils::{resolve_sort_column, AdminListQuery, SortOrder};

// ================================================================================================
// Response Types
// ================================================================================================

#[derive(Debug, Serialize)]
pub struct PageMeta {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// 관리자 목록 응답.
#[derive(Debug, Serialize)]
pub struct AdminListResponse<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

fn to_page(query: &AdminListQuery) -> AdminPage {
    AdminPage {
        limit: query.limit(),
        offset: query.offset(),
        search: query.search_pattern(),
    }
}

fn respond<T>(data: Vec<T>, total: i64, page: &AdminPage) -> Json<AdminListResponse<T>> {
    Json(AdminListResponse {
        data,
        meta: PageMeta {
            total,
            limit: page.limit,
            offset: page.offset,
        },
    })
}

// ================================================================================================
// Handlers
// ================================================================================================

async fn list_stocks(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> ApiResult<Json<AdminListResponse<AdminStock>>> {
    let pool = state.db()?;
    let page = to_page(&query);
    let column = resolve_sort_column(query.sort.as_deref(), STOCK_SORT_COLUMNS, "symbol");
    let order = SortOrder::parse_or(query.order.as_deref(), SortOrder::Asc);

    let (stocks, total) = AdminRepository::list_stocks(pool, &page, column, order)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch stocks", e))?;
    Ok(respond(stocks, total, &page))
}

async fn list_users(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> ApiResult<Json<AdminListResponse<AdminUserRow>>> {
    let pool = state.db()?;
    let page = to_page(&query);
    let (users, total) = AdminRepository::list_users(pool, &page)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch users", e))?;
    Ok(respond(users, total, &page))
}

async fn list_news(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> ApiResult<Json<AdminListResponse<AdminNewsArticle>>> {
    let pool = state.db()?;
    let page = to_page(&query);
    let (news, total) = AdminRepository::list_news(pool, &page)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch news", e))?;
    Ok(respond(news, total, &page))
}

async fn list_fundamentals(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> ApiResult<Json<AdminListResponse<AdminFundamental>>> {
    let pool = state.db()?;
    let page = to_page(&query);
    let (rows, total) = AdminRepository::list_fundamentals(pool, &page)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch fundamentals", e))?;
    Ok(respond(rows, total, &page))
}

async fn list_sec_financials(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> ApiResult<Json<AdminListResponse<AdminSecFinancial>>> {
    let pool = state.db()?;
    let page = to_page(&query);
    let (rows, total) = AdminRepository::list_sec_financials(pool, &page)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch SEC financials", e))?;
    Ok(respond(rows, total, &page))
}

async fn list_ttm_financials(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> ApiResult<Json<AdminListResponse<AdminTtmFinancial>>> {
    let pool = state.db()?;
    let page = to_page(&query);
    let (rows, total) = AdminRepository::list_ttm_financials(pool, &page)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch TTM financials", e))?;
    Ok(respond(rows, total, &page))
}

async fn list_valuation_ratios(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> ApiResult<Json<AdminListResponse<AdminValuationRatio>>> {
    let pool = state.db()?;
    let page = to_page(&query);
    let (rows, total) = AdminRepository::list_valuation_ratios(pool, &page)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch valuation ratios", e))?;
    Ok(respond(rows, total, &page))
}

async fn list_alerts(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> ApiResult<Json<AdminListResponse<AdminAlertRule>>> {
    let pool = state.db()?;
    let page = to_page(&query);
    let (alerts, total) = AdminRepository::list_alerts(pool, &page)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch alerts", e))?;
    Ok(respond(alerts, total, &page))
}

async fn list_watch_lists(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminListQuery>,
) -> ApiResult<Json<AdminListResponse<AdminWatchList>>> {
    let pool = state.db()?;
    let page = to_page(&query);
    let (lists, total) = AdminRepository::list_watch_lists(pool, &page)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch watch lists", e))?;
    Ok(respond(lists, total, &page))
}

/// 테이블별 행 수. 조회에 실패한 테이블은 0.
async fn database_stats(
    AdminUser(_): AdminUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<serde_json::Value>> {
    let pool = state.db()?;
    let stats = AdminRepository::table_counts(pool).await;
    Ok(Json(json!({ "stats": stats })))
}

pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stocks", get(list_stocks))
        .route("/users", get(list_users))
        .route("/news", get(list_news))
        .route("/fundamentals", get(list_fundamentals))
        .route("/sec-financials", get(list_sec_financials))
        .route("/ttm-financials", get(list_ttm_financials))
        .route("/valuation-ratios", get(list_valuation_ratios))
        .route("/alerts", get(list_alerts))
        .route("/watchlists", get(list_watch_lists))
        .route("/stats", get(database_stats))
}
