//! 소셜 감성 API.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/sentiment/trending?period=24h|7d&limit=` - 트렌딩 티커
//! - `GET /api/v1/sentiment/{ticker}` - 티커 감성 요약
//! - `GET /api/v1/sentiment/{ticker}/history?days=` - 일별 감성 히스토리
//! - `GET /api/v1/sentiment/{ticker}/posts?limit=&sort=` - 대표 게시물

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use utoipa::{IntoParams, ToSchema};

use invest_core::{PostSort, SentimentPeriod};

use crate::error::{ApiError, ApiErrorResponse, ApiResult};
use crate::repository::sentiment::RepresentativePost;
use crate::repository::{SentimentRepository, TickerRepository};
use crate::services::{group_history_by_day, top_subreddits, SentimentHistoryPoint, SubredditCount};
use crate::state::AppState;
use crate::utils::capped_or;

const DEFAULT_TRENDING_LIMIT: i64 = 20;
const MAX_TRENDING_LIMIT: i64 = 50;
const DEFAULT_HISTORY_DAYS: i64 = 7;
const MAX_HISTORY_DAYS: i64 = 90;
const DEFAULT_POSTS_LIMIT: i64 = 10;
const MAX_POSTS_LIMIT: i64 = 20;
const TOP_SUBREDDITS: usize = 5;

// ================================================================================================
// Request/Response Types
// ================================================================================================

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TrendingQuery {
    /// "24h" | "7d"
    pub period: Option<String>,
    /// 기본 20, 최대 50
    pub limit: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrendingTicker {
    pub ticker: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub company_name: String,
    pub score: f64,
    pub label: String,
    pub post_count: i64,
    pub mention_delta: f64,
    pub rank: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrendingResponse {
    pub period: String,
    pub tickers: Vec<TrendingTicker>,
    pub updated_at: DateTime<Utc>,
}

/// 백분율 (0~100).
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct SentimentBreakdown {
    pub bullish: f64,
    pub bearish: f64,
    pub neutral: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SentimentResponse {
    pub ticker: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub company_name: String,
    pub score: f64,
    pub label: String,
    pub breakdown: SentimentBreakdown,
    pub post_count_24h: i64,
    pub post_count_7d: i64,
    pub rank: i32,
    pub rank_change: i32,
    pub top_subreddits: Vec<SubredditCount>,
    pub last_updated: DateTime<Utc>,
}

impl SentimentResponse {
    /// 스냅샷이 없는 티커의 중립 응답.
    fn neutral(ticker: String) -> Self {
        Self {
            ticker,
            company_name: String::new(),
            score: 0.0,
            label: "neutral".to_string(),
            breakdown: SentimentBreakdown::default(),
            post_count_24h: 0,
            post_count_7d: 0,
            rank: 0,
            rank_change: 0,
            top_subreddits: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// 1~90 (기본 7)
    pub days: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SentimentHistoryResponse {
    pub ticker: String,
    /// 예: "7d"
    pub period: String,
    pub history: Vec<SentimentHistoryPoint>,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PostsQuery {
    /// 기본 10, 최대 20
    pub limit: Option<String>,
    /// recent | engagement | bullish | bearish
    pub sort: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PostsResponse {
    pub ticker: String,
    pub posts: Vec<RepresentativePost>,
    pub total: i64,
    pub sort: String,
}

/// 히스토리 기간: 1 미만이거나 숫자가 아니면 7, 90 초과는 90.
fn history_days(raw: Option<&str>) -> i64 {
    match raw.map(str::trim).and_then(|v| v.parse::<i64>().ok()) {
        Some(days) if days >= 1 => days.min(MAX_HISTORY_DAYS),
        _ => DEFAULT_HISTORY_DAYS,
    }
}

async fn company_names(state: &AppState, symbols: &[String]) -> HashMap<String, String> {
    let Some(pool) = &state.db_pool else {
        return HashMap::new();
    };
    TickerRepository::names_for(pool, symbols)
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "Company name lookup failed");
            HashMap::new()
        })
}

// ================================================================================================
// Handlers
// ================================================================================================

/// 트렌딩 티커. 티커별 최신 스냅샷을 순위 순으로 반환합니다.
#[utoipa::path(
    get,
    path = "/api/v1/sentiment/trending",
    params(TrendingQuery),
    responses(
        (status = 200, description = "트렌딩 티커", body = TrendingResponse),
        (status = 503, description = "DB 없음", body = ApiErrorResponse)
    ),
    tag = "sentiment"
)]
pub async fn get_trending(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrendingQuery>,
) -> ApiResult<Json<TrendingResponse>> {
    let pool = state.db()?;
    let period = SentimentPeriod::parse_or_default(query.period.as_deref());
    let limit = capped_or(
        query.limit.as_deref(),
        MAX_TRENDING_LIMIT,
        DEFAULT_TRENDING_LIMIT,
    );

    let snapshots = SentimentRepository::latest_snapshots(pool, period.time_range(), limit)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch trending sentiment", e))?;

    let symbols: Vec<String> = snapshots.iter().map(|s| s.ticker.clone()).collect();
    let names = company_names(&state, &symbols).await;

    let tickers = snapshots
        .into_iter()
        .map(|s| TrendingTicker {
            company_name: names.get(&s.ticker).cloned().unwrap_or_default(),
            ticker: s.ticker,
            score: s.sentiment_score,
            label: s.sentiment_label,
            post_count: s.mention_count,
            mention_delta: s.mention_velocity_1h.unwrap_or_default(),
            rank: s.rank.unwrap_or_default(),
        })
        .collect();

    Ok(Json(TrendingResponse {
        period: period.as_str().to_string(),
        tickers,
        updated_at: Utc::now(),
    }))
}

/// 티커 감성 요약 (7일 스냅샷 기준, 24시간 게시물 수는 1일 스냅샷).
#[utoipa::path(
    get,
    path = "/api/v1/sentiment/{ticker}",
    params(("ticker" = String, Path, description = "티커")),
    responses(
        (status = 200, description = "감성 요약", body = SentimentResponse),
        (status = 503, description = "DB 없음", body = ApiErrorResponse)
    ),
    tag = "sentiment"
)]
pub async fn get_ticker_sentiment(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
) -> ApiResult<Json<SentimentResponse>> {
    let pool = state.db()?;
    let ticker = ticker.trim().to_uppercase();

    let Some(snapshot) = SentimentRepository::ticker_snapshot(pool, &ticker, "7d")
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch ticker sentiment", e))?
    else {
        return Ok(Json(SentimentResponse::neutral(ticker)));
    };

    let post_count_24h = match SentimentRepository::ticker_snapshot(pool, &ticker, "1d").await {
        Ok(Some(day)) => day.mention_count,
        Ok(None) => 0,
        Err(e) => {
            warn!(ticker = %ticker, error = %e, "1d snapshot lookup failed");
            0
        }
    };

    let company_name = company_names(&state, std::slice::from_ref(&ticker))
        .await
        .remove(&ticker)
        .unwrap_or_default();

    Ok(Json(SentimentResponse {
        company_name,
        score: snapshot.sentiment_score,
        label: snapshot.sentiment_label,
        breakdown: SentimentBreakdown {
            bullish: snapshot.bullish_pct * 100.0,
            bearish: snapshot.bearish_pct * 100.0,
            neutral: snapshot.neutral_pct * 100.0,
        },
        post_count_24h,
        post_count_7d: snapshot.mention_count,
        rank: snapshot.rank.unwrap_or_default(),
        rank_change: snapshot.rank_change.unwrap_or_default(),
        top_subreddits: top_subreddits(snapshot.subreddit_distribution.as_ref(), TOP_SUBREDDITS),
        last_updated: snapshot.snapshot_time,
        ticker,
    }))
}

/// 일별 감성 히스토리.
#[utoipa::path(
    get,
    path = "/api/v1/sentiment/{ticker}/history",
    params(("ticker" = String, Path, description = "티커"), HistoryQuery),
    responses(
        (status = 200, description = "일별 히스토리", body = SentimentHistoryResponse),
        (status = 503, description = "DB 없음", body = ApiErrorResponse)
    ),
    tag = "sentiment"
)]
pub async fn get_sentiment_history(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<SentimentHistoryResponse>> {
    let pool = state.db()?;
    let ticker = ticker.trim().to_uppercase();
    let days = history_days(query.days.as_deref());

    let points = SentimentRepository::time_series(pool, &ticker, days)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch sentiment history", e))?;

    Ok(Json(SentimentHistoryResponse {
        history: group_history_by_day(&points),
        period: format!("{}d", days),
        ticker,
    }))
}

/// 최근 7일 대표 게시물.
#[utoipa::path(
    get,
    path = "/api/v1/sentiment/{ticker}/posts",
    params(("ticker" = String, Path, description = "티커"), PostsQuery),
    responses(
        (status = 200, description = "대표 게시물", body = PostsResponse),
        (status = 503, description = "DB 없음", body = ApiErrorResponse)
    ),
    tag = "sentiment"
)]
pub async fn get_ticker_posts(
    State(state): State<Arc<AppState>>,
    Path(ticker): Path<String>,
    Query(query): Query<PostsQuery>,
) -> ApiResult<Json<PostsResponse>> {
    let pool = state.db()?;
    let ticker = ticker.trim().to_uppercase();
    let limit = capped_or(query.limit.as_deref(), MAX_POSTS_LIMIT, DEFAULT_POSTS_LIMIT);
    let sort = PostSort::parse_or_default(query.sort.as_deref());

    let (posts, total) = SentimentRepository::representative_posts(pool, &ticker, sort, limit)
        .await
        .map_err(|e| ApiError::internal_with("Failed to fetch posts", e))?;

    Ok(Json(PostsResponse {
        ticker,
        posts,
        total,
        sort: sort.as_str().to_string(),
    }))
}

/// `/trending`은 `/{ticker}`보다 먼저 매칭됩니다 (axum은 정적 경로를 우선).
pub fn sentiment_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trending", get(get_trending))
        .route("/{ticker}", get(get_ticker_sentiment))
        .route("/{ticker}/history", get(get_sentiment_history))
        .route("/{ticker}/posts", get(get_ticker_posts))
}
