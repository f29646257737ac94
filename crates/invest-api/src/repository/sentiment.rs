//! 소셜 감성 스냅샷/게시물 Repository.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use utoipa::ToSchema;

use invest_core::PostSort;

use super::decode_rows;

/// 티커별 감성 스냅샷.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct SentimentSnapshot {
    pub id: i64,
    pub ticker: String,
    pub snapshot_time: DateTime<Utc>,
    pub time_range: String,
    pub mention_count: i64,
    pub bullish_pct: f64,
    pub neutral_pct: f64,
    pub bearish_pct: f64,
    pub sentiment_score: f64,
    pub sentiment_label: String,
    pub mention_velocity_1h: Option<f64>,
    pub composite_score: f64,
    #[schema(value_type = Option<Object>)]
    pub subreddit_distribution: Option<serde_json::Value>,
    pub rank: Option<i32>,
    pub rank_change: Option<i32>,
}

/// 감성 시계열 한 점.
#[derive(Debug, Clone, FromRow)]
pub struct SentimentPoint {
    pub time: DateTime<Utc>,
    pub sentiment_score: f64,
    pub bullish_pct: f64,
    pub bearish_pct: Option<f64>,
    pub neutral_pct: Option<f64>,
    pub mention_count: i64,
}

/// 대표 게시물.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct RepresentativePost {
    pub id: i64,
    pub title: String,
    pub body_preview: Option<String>,
    pub url: Option<String>,
    pub source: String,
    pub subreddit: String,
    pub upvotes: i64,
    pub comment_count: i64,
    pub award_count: i64,
    pub sentiment: String,
    #[serde(rename = "sentiment_confidence")]
    pub confidence: Option<f64>,
    pub flair: Option<String>,
    pub posted_at: DateTime<Utc>,
}

const SNAPSHOT_COLUMNS: &str = "id::bigint AS id, ticker, snapshot_time, time_range, \
    mention_count::bigint AS mention_count, \
    bullish_pct::float8 AS bullish_pct, neutral_pct::float8 AS neutral_pct, \
    bearish_pct::float8 AS bearish_pct, sentiment_score::float8 AS sentiment_score, \
    sentiment_label, mention_velocity_1h::float8 AS mention_velocity_1h, \
    composite_score::float8 AS composite_score, subreddit_distribution, rank, rank_change";

/// 처리 완료, 금융 관련, 스팸 아님.
const POST_BASE_FILTER: &str = "r.processed_at IS NOT NULL \
    AND r.is_finance_related = TRUE \
    AND COALESCE(r.spam_score, 0) < 0.5";

pub struct SentimentRepository;

impl SentimentRepository {
    /// 티커별 최신 스냅샷을 순위 순으로 조회합니다.
    pub async fn latest_snapshots(
        pool: &PgPool,
        time_range: &str,
        limit: i64,
    ) -> Result<Vec<SentimentSnapshot>, sqlx::Error> {
        let sql = format!(
            "WITH latest AS ( \
                SELECT DISTINCT ON (ticker) {SNAPSHOT_COLUMNS} \
                FROM ticker_sentiment_snapshots \
                WHERE time_range = $1 \
                ORDER BY ticker, snapshot_time DESC \
             ) \
             SELECT * FROM latest \
             ORDER BY COALESCE(rank, 999999) ASC, composite_score DESC \
             LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(time_range)
            .bind(limit)
            .fetch_all(pool)
            .await?;
        Ok(decode_rows(rows, "sentiment snapshot"))
    }

    pub async fn ticker_snapshot(
        pool: &PgPool,
        ticker: &str,
        time_range: &str,
    ) -> Result<Option<SentimentSnapshot>, sqlx::Error> {
        let sql = format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM ticker_sentiment_snapshots \
             WHERE ticker = $1 AND time_range = $2 \
             ORDER BY snapshot_time DESC LIMIT 1"
        );
        sqlx::query_as::<_, SentimentSnapshot>(&sql)
            .bind(ticker)
            .bind(time_range)
            .fetch_optional(pool)
            .await
    }

    /// 최근 `days`일 시계열 (시간 오름차순).
    pub async fn time_series(
        pool: &PgPool,
        ticker: &str,
        days: i64,
    ) -> Result<Vec<SentimentPoint>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT time, sentiment_score::float8 AS sentiment_score, \
             bullish_pct::float8 AS bullish_pct, bearish_pct::float8 AS bearish_pct, \
             neutral_pct::float8 AS neutral_pct, mention_count::bigint AS mention_count \
             FROM ticker_sentiment_history \
             WHERE ticker = $1 AND time > NOW() - $2::INTEGER * INTERVAL '1 day' \
             ORDER BY time ASC",
        )
        .bind(ticker)
        .bind(days as i32)
        .fetch_all(pool)
        .await?;
        Ok(decode_rows(rows, "sentiment point"))
    }

    /// 최근 7일 대표 게시물과 전체 게시물 수.
    pub async fn representative_posts(
        pool: &PgPool,
        ticker: &str,
        sort: PostSort,
        limit: i64,
    ) -> Result<(Vec<RepresentativePost>, i64), sqlx::Error> {
        let sentiment_clause = match sort.sentiment_filter() {
            Some(label) => format!("AND t.sentiment = '{}'", label),
            None => String::new(),
        };
        let sql = format!(
            "SELECT t.id::bigint AS id, r.title, LEFT(r.body, 500) AS body_preview, \
             r.url, 'reddit' AS source, r.subreddit, \
             r.upvotes::bigint AS upvotes, r.comment_count::bigint AS comment_count, \
             COALESCE(r.award_count, 0)::bigint AS award_count, \
             COALESCE(t.sentiment, 'neutral') AS sentiment, \
             t.confidence::float8 AS confidence, r.flair, r.posted_at \
             FROM reddit_post_tickers t \
             JOIN reddit_posts_raw r ON t.post_id = r.id \
             WHERE t.ticker = $1 \
               AND r.posted_at > NOW() - INTERVAL '7 days' \
               AND {POST_BASE_FILTER} \
               {sentiment_clause} \
             ORDER BY {order} \
             LIMIT $2",
            order = sort.order_by(),
        );
        let rows = sqlx::query(&sql)
            .bind(ticker)
            .bind(limit)
            .fetch_all(pool)
            .await?;
        let posts = decode_rows(rows, "representative post");

        let count_sql = format!(
            "SELECT COUNT(*) FROM reddit_post_tickers t \
             JOIN reddit_posts_raw r ON t.post_id = r.id \
             WHERE t.ticker = $1 \
               AND r.posted_at > NOW() - INTERVAL '7 days' \
               AND {POST_BASE_FILTER}"
        );
        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(ticker)
            .fetch_one(pool)
            .await
            .unwrap_or(0);

        Ok((posts, total))
    }
}
