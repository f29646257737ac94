//! 관심 목록 API.
//!
//! 모든 엔드포인트는 로그인 사용자 전용이며, 다른 사용자의 목록에는 접근할 수 없습니다.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/watchlists` - 내 목록 (종목 수 포함)
//! - `POST /api/v1/watchlists` - 목록 생성 (최대 3개)
//! - `GET /api/v1/watchlists/tags` - 사용 중인 태그
//! - `GET /api/v1/watchlists/{id}` - 목록 상세 (시세, 요약 지표)
//! - `PUT /api/v1/watchlists/{id}` - 이름/설명 수정
//! - `DELETE /api/v1/watchlists/{id}` - 삭제 (기본 목록 제외)
//! - `POST /api/v1/watchlists/{id}/items` - 종목 추가 (최대 10개)
//! - `POST /api/v1/watchlists/{id}/bulk` - 여러 종목 추가
//! - `POST /api/v1/watchlists/{id}/reorder` - 표시 순서 변경
//! - `PUT /api/v1/watchlists/{id}/items/{symbol}` - 종목 메모/태그/목표가 수정
//! - `DELETE /api/v1/watchlists/{id}/items/{symbol}` - 종목 제거

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::repository::alerts::AlertRule;
use crate::repository::watchlists::{
    AddItemError, ItemFields, WatchList, WatchListItem, WatchListItemDetail,
    WatchListSummary, MAX_ITEMS_PER_WATCH_LIST, MAX_WATCH_LISTS_PER_USER,
};
use crate::repository::{AlertRepository, WatchlistRepository};
use crate::services::watchlist::{attach_quotes, summarize, WatchListSummaryMetrics};
use crate::state::AppState;
use crate::types::StatusMessage;

// ==================== Request/Response Types ====================

#[derive(Debug, Deserialize, Validate)]
pub struct WatchListRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    #[validate(length(min = 1, max = 20, message = "Symbol is required"))]
    pub symbol: String,
    #[serde(flatten)]
    pub fields: ItemFields,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkAddRequest {
    #[validate(length(min = 1, message = "At least one symbol is required"))]
    pub symbols: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ItemOrder {
    pub item_id: Uuid,
    pub display_order: i32,
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub item_orders: Vec<ItemOrder>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailQuery {
    pub include_alerts: Option<String>,
}

impl DetailQuery {
    /// 정확히 `true`일 때만 알림을 포함합니다. 그 외 값은 모두 false.
    pub fn include_alerts(&self) -> bool {
        self.include_alerts.as_deref() == Some("true")
    }
}

#[derive(Debug, Serialize)]
pub struct WatchListsResponse {
    pub watch_lists: Vec<WatchListSummary>,
}

#[derive(Debug, Serialize)]
pub struct WatchListDetailResponse {
    #[serde(flatten)]
    pub watch_list: WatchList,
    pub item_count: usize,
    pub items: Vec<WatchListItemDetail>,
    pub summary: WatchListSummaryMetrics,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub alerts_fetch_failed: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkAddResponse {
    pub added: Vec<String>,
    pub failed: Vec<String>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct TagsResponse {
    pub tags: Vec<String>,
}

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// 심볼별 최신 알림 규칙. 입력은 생성 시각 내림차순입니다.
fn latest_alert_by_symbol(alerts: Vec<AlertRule>) -> HashMap<String, AlertRule> {
    let mut map = HashMap::new();
    for alert in alerts {
        map.entry(alert.symbol.clone()).or_insert(alert);
    }
    map
}

/// 목록 소유 여부를 확인합니다. 남의 목록이면 403.
async fn owned_list(state: &AppState, id: Uuid, user_id: Uuid) -> ApiResult<WatchList> {
    let pool = state.db()?;
    WatchlistRepository::find_owned(pool, id, user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch watch list", e))?
        .ok_or_else(|| ApiError::forbidden("Unauthorized access to watch list"))
}

// ==================== Handlers ====================

pub async fn list_watch_lists(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<WatchListsResponse>> {
    let pool = state.db()?;
    let watch_lists = WatchlistRepository::list_for_user(pool, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch watch lists", e))?;
    Ok(Json(WatchListsResponse { watch_lists }))
}

pub async fn create_watch_list(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<WatchListRequest>,
) -> ApiResult<(StatusCode, Json<WatchList>)> {
    req.validate()?;
    let pool = state.db()?;

    let created = WatchlistRepository::create_within_limit(
        pool,
        user.user_id,
        req.name.trim(),
        req.description.as_deref(),
    )
    .await
    .map_err(|e| ApiError::internal_with("Failed to create watch list", e))?
    .ok_or_else(|| {
        ApiError::forbidden(format!(
            "Watch list limit reached. Maximum {} watch lists allowed",
            MAX_WATCH_LISTS_PER_USER
        ))
    })?;

    info!(user_id = %user.user_id, watch_list_id = %created.id, "Watch list created");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_watch_list(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<DetailQuery>,
) -> ApiResult<Json<WatchListDetailResponse>> {
    let pool = state.db()?;
    let watch_list = WatchlistRepository::find_owned(pool, id, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch watch list", e))?
        .ok_or_else(|| ApiError::not_found("Watch list not found"))?;

    let mut items = WatchlistRepository::list_item_details(pool, id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch watch list items", e))?;

    if let Some(provider) = state.market_data.clone() {
        attach_quotes(provider, &mut items).await;
    }

    let mut alerts_fetch_failed = false;
    if query.include_alerts() {
        match AlertRepository::for_watch_list(pool, id, user.user_id).await {
            Ok(alerts) => {
                let by_symbol = latest_alert_by_symbol(alerts);
                for item in items.iter_mut() {
                    item.alert = by_symbol.get(&item.item.symbol).cloned();
                }
            }
            Err(e) => {
                warn!(watch_list_id = %id, error = %e, "Failed to fetch alerts for watch list");
                alerts_fetch_failed = true;
            }
        }
    }

    let summary = summarize(&items);
    Ok(Json(WatchListDetailResponse {
        watch_list,
        item_count: items.len(),
        items,
        summary,
        alerts_fetch_failed,
    }))
}

pub async fn update_watch_list(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<WatchListRequest>,
) -> ApiResult<Json<StatusMessage>> {
    req.validate()?;
    let pool = state.db()?;

    let updated = WatchlistRepository::update(
        pool,
        id,
        user.user_id,
        req.name.trim(),
        req.description.as_deref(),
    )
    .await
    .map_err(|e| ApiError::internal_with("Failed to update watch list", e))?;

    if !updated {
        return Err(ApiError::not_found("Watch list not found"));
    }
    Ok(StatusMessage::new("Watch list updated successfully"))
}

pub async fn delete_watch_list(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<StatusMessage>> {
    let pool = state.db()?;
    let watch_list = WatchlistRepository::find_owned(pool, id, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch watch list", e))?
        .ok_or_else(|| ApiError::not_found("Watch list not found"))?;

    if watch_list.is_default {
        return Err(ApiError::forbidden("Cannot delete the default watch list"));
    }

    let deleted = WatchlistRepository::delete(pool, id, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to delete watch list", e))?;
    if !deleted {
        return Err(ApiError::not_found("Watch list not found"));
    }

    info!(user_id = %user.user_id, watch_list_id = %id, "Watch list deleted");
    Ok(StatusMessage::new("Watch list deleted successfully"))
}

pub async fn add_item(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddItemRequest>,
) -> ApiResult<(StatusCode, Json<WatchListItem>)> {
    // 소유권을 먼저 확인해 남의 목록에는 본문과 무관하게 403
    owned_list(&state, id, user.user_id).await?;
    req.validate()?;
    let pool = state.db()?;

    let symbol = normalize_symbol(&req.symbol);
    match WatchlistRepository::add_item(pool, id, &symbol, &req.fields).await {
        Ok(item) => Ok((StatusCode::CREATED, Json(item))),
        Err(AddItemError::AlreadyExists) => Err(ApiError::conflict(
            AddItemError::AlreadyExists.to_string(),
        )),
        Err(AddItemError::TickerNotFound) => Err(ApiError::bad_request(
            AddItemError::TickerNotFound.to_string(),
        )),
        Err(AddItemError::LimitReached) => Err(ApiError::forbidden(format!(
            "Watch list item limit reached. Maximum {} tickers per watch list",
            MAX_ITEMS_PER_WATCH_LIST
        ))),
        Err(AddItemError::Database(e)) => Err(ApiError::internal_with(
            "Failed to add ticker to watch list",
            e,
        )),
    }
}

pub async fn bulk_add_items(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<BulkAddRequest>,
) -> ApiResult<Json<BulkAddResponse>> {
    owned_list(&state, id, user.user_id).await?;
    req.validate()?;
    let pool = state.db()?;

    let symbols: Vec<String> = req
        .symbols
        .iter()
        .map(|s| normalize_symbol(s))
        .filter(|s| !s.is_empty())
        .collect();
    let (added, failed) = WatchlistRepository::bulk_add(pool, id, &symbols).await;

    Ok(Json(BulkAddResponse {
        total: symbols.len(),
        added,
        failed,
    }))
}

pub async fn update_item(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, symbol)): Path<(Uuid, String)>,
    Json(fields): Json<ItemFields>,
) -> ApiResult<Json<WatchListItem>> {
    owned_list(&state, id, user.user_id).await?;
    let pool = state.db()?;

    WatchlistRepository::update_item(pool, id, &normalize_symbol(&symbol), &fields)
        .await
        .map_err(|e| ApiError::internal_with("Failed to update ticker", e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Ticker not found in watch list"))
}

pub async fn remove_item(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path((id, symbol)): Path<(Uuid, String)>,
) -> ApiResult<Json<StatusMessage>> {
    owned_list(&state, id, user.user_id).await?;
    let pool = state.db()?;

    let removed = WatchlistRepository::remove_item(pool, id, &normalize_symbol(&symbol))
        .await
        .map_err(|e| ApiError::internal_with("Failed to remove ticker", e))?;
    if !removed {
        return Err(ApiError::not_found("Ticker not found in watch list"));
    }
    Ok(StatusMessage::new("Ticker removed successfully"))
}

pub async fn reorder_items(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReorderRequest>,
) -> ApiResult<Json<StatusMessage>> {
    owned_list(&state, id, user.user_id).await?;
    let pool = state.db()?;

    let item_ids: Vec<Uuid> = req.item_orders.iter().map(|o| o.item_id).collect();
    let belongs = WatchlistRepository::items_belong_to(pool, id, &item_ids)
        .await
        .map_err(|e| ApiError::internal_with("Failed to verify items", e))?;
    if !belongs {
        return Err(ApiError::forbidden(
            "One or more items do not belong to this watch list",
        ));
    }

    let orders: Vec<(Uuid, i32)> = req
        .item_orders
        .iter()
        .map(|o| (o.item_id, o.display_order))
        .collect();
    WatchlistRepository::reorder(pool, id, &orders)
        .await
        .map_err(|e| ApiError::internal_with("Failed to update item order", e))?;

    Ok(StatusMessage::new("Items reordered successfully"))
}

pub async fn list_tags(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<TagsResponse>> {
    let pool = state.db()?;
    let tags = WatchlistRepository::user_tags(pool, user.user_id)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch tags", e))?;
    Ok(Json(TagsResponse { tags }))
}

pub fn watchlists_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_watch_lists).post(create_watch_list))
        .route("/tags", get(list_tags))
        .route(
            "/{id}",
            get(get_watch_list)
                .put(update_watch_list)
                .delete(delete_watch_list),
        )
        .route("/{id}/items", post(add_item))
        .route("/{id}/bulk", post(bulk_add_items))
        .route("/{id}/reorder", post(reorder_items))
        .route("/{id}/items/{symbol}", put(update_item).delete(remove_item))
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
    use chrono::Utc;
    use tower::ServiceExt;

    const LIST_ID: &str = "0b7a4f0e-31c8-4c64-93f4-6f9d9e0a2c55";

    fn app() -> Router {
        Router::new()
            .nest("/watchlists", watchlists_router())
            .with_state(Arc::new(create_test_state()))
    }

    fn bearer() -> String {
        let claims = Claims::new(
            "5a4e9b1d-2c3f-4e5a-8b6c-7d8e9f0a1b2c",
            "user@example.com",
            false,
            60,
        );
        format!("Bearer {}", create_token(&claims, TEST_JWT_SECRET).unwrap())
    }

    async fn send(method: Method, uri: &str, body: Option<&str>, auth: bool) -> (StatusCode, String) {
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
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    #[tokio::test]
    async fn test_requires_login() {
        let (status, _) = send(Method::GET, "/watchlists", None, false).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_without_database_is_503() {
        let (status, _) = send(Method::GET, "/watchlists", None, true).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = send(Method::GET, "/watchlists/tags", None, true).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let uri = format!("/watchlists/{LIST_ID}/items/AAPL");
        let (status, _) = send(Method::DELETE, &uri, None, true).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_create_validates_name_before_database() {
        let (status, body) = send(Method::POST, "/watchlists", Some(r#"{"name":""}"#), true).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Name must be between 1 and 255 characters"));
    }

    #[tokio::test]
    async fn test_item_ownership_is_checked_before_body() {
        // 소유권 확인이 먼저라 DB가 없으면 본문이 잘못돼도 503
        let uri = format!("/watchlists/{LIST_ID}/bulk");
        let (status, _) = send(Method::POST, &uri, Some(r#"{"symbols":[]}"#), true).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let uri = format!("/watchlists/{LIST_ID}/items");
        let (status, _) = send(Method::POST, &uri, Some(r#"{"symbol":""}"#), true).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_bulk_add_requires_symbols() {
        let req: BulkAddRequest = serde_json::from_str(r#"{"symbols":[]}"#).unwrap();
        let err = ApiError::from(req.validate().unwrap_err());
        assert_eq!(err.to_string(), "At least one symbol is required");
    }

    #[test]
    fn test_include_alerts_only_for_true() {
        let parse = |qs: &str| {
            let uri: axum::http::Uri = format!("/watchlists/x{qs}").parse().unwrap();
            Query::<DetailQuery>::try_from_uri(&uri).unwrap().0.include_alerts()
        };
        assert!(parse("?include_alerts=true"));
        assert!(!parse("?include_alerts=1"));
        assert!(!parse("?include_alerts=TRUE"));
        assert!(!parse("?include_alerts="));
        assert!(!parse(""));
    }

    fn alert(symbol: &str, name: &str) -> AlertRule {
        AlertRule {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            watch_list_id: None,
            watch_list_item_id: None,
            symbol: symbol.to_string(),
            alert_type: "price_above".to_string(),
            conditions: serde_json::json!({ "threshold": 200 }),
            is_active: true,
            frequency: "once".to_string(),
            notify_email: false,
            notify_in_app: true,
            name: Some(name.to_string()),
            description: None,
            last_triggered_at: None,
            trigger_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_latest_alert_wins() {
        let map = latest_alert_by_symbol(vec![
            alert("AAPL", "newest"),
            alert("AAPL", "older"),
            alert("MSFT", "only"),
        ]);
        assert_eq!(map.len(), 2);
        assert_eq!(map["AAPL"].name.as_deref(), Some("newest"));
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" aapl "), "AAPL");
    }
}
