//! 관심 목록 Repository.
//!
//! 목록 수 제한은 INSERT ... SELECT ... WHERE 조건으로 원자적으로 검사합니다.
//! 종목 수 제한은 DB 트리거(`check_watch_list_item_limit`)가 강제합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use utoipa::ToSchema;
use uuid::Uuid;

use super::alerts::AlertRule;
use super::decode_rows;

/// 사용자당 최대 관심 목록 수.
pub const MAX_WATCH_LISTS_PER_USER: i64 = 3;
/// 관심 목록당 최대 종목 수.
pub const MAX_ITEMS_PER_WATCH_LIST: i64 = 10;

/// 종목 수 제한 트리거의 에러 메시지 일부.
const ITEM_LIMIT_TRIGGER_MESSAGE: &str = "Watch list limit reached";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WatchList {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub display_order: i32,
    pub is_public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_slug: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WatchListSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub item_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct WatchListItem {
    pub id: Uuid,
    pub watch_list_id: Uuid,
    pub symbol: String,
    pub notes: Option<String>,
    pub tags: Vec<String>,
    pub target_buy_price: Option<f64>,
    pub target_sell_price: Option<f64>,
    pub added_at: DateTime<Utc>,
    pub display_order: i32,
}

/// 종목 메타데이터와 스크리너 지표를 포함한 항목.
///
/// 가격 필드는 조회 후 시세 제공자에서 채웁니다.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct WatchListItemDetail {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub item: WatchListItem,
    pub name: String,
    pub exchange: String,
    pub asset_type: String,
    pub logo_url: Option<String>,

    pub reddit_rank: Option<f64>,
    pub reddit_mentions: Option<i64>,
    pub reddit_trend: Option<String>,

    pub ic_score: Option<f64>,
    pub ic_rating: Option<String>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub ps_ratio: Option<f64>,
    pub roe: Option<f64>,
    pub gross_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub dividend_yield: Option<f64>,

    pub alert_count: i64,

    #[sqlx(skip)]
    pub current_price: Option<f64>,
    #[sqlx(skip)]
    pub price_change: Option<f64>,
    #[sqlx(skip)]
    pub price_change_pct: Option<f64>,
    #[sqlx(skip)]
    pub prev_close: Option<f64>,
    #[sqlx(skip)]
    pub volume: Option<i64>,
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub alert: Option<AlertRule>,
}

/// 종목 추가/수정 입력.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ItemFields {
    pub notes: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub target_buy_price: Option<f64>,
    pub target_sell_price: Option<f64>,
}

/// 종목 추가 실패 사유.
#[derive(Debug, thiserror::Error)]
pub enum AddItemError {
    #[error("ticker not found in database")]
    TickerNotFound,
    #[error("ticker already exists in this watch list")]
    AlreadyExists,
    #[error("watch list item limit reached")]
    LimitReached,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

const WATCH_LIST_COLUMNS: &str = "id, user_id, name, description, is_default, display_order, \
    is_public, public_slug, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, watch_list_id, symbol, notes, COALESCE(tags, '{}') AS tags, \
    target_buy_price::float8 AS target_buy_price, target_sell_price::float8 AS target_sell_price, \
    added_at, display_order";

pub struct WatchlistRepository;

impl WatchlistRepository {
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<WatchListSummary>, sqlx::Error> {
        sqlx::query_as::<_, WatchListSummary>(
            r#"
            SELECT wl.id, wl.name, wl.description, wl.is_default, wl.created_at, wl.updated_at,
                   COUNT(wli.id) AS item_count
            FROM watch_lists wl
            LEFT JOIN watch_list_items wli ON wl.id = wli.watch_list_id
            WHERE wl.user_id = $1
            GROUP BY wl.id
            ORDER BY wl.display_order ASC, wl.created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// 목록 수 제한 안에서만 생성합니다. 제한에 걸리면 `None`.
    pub async fn create_within_limit(
        pool: &PgPool,
        user_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Option<WatchList>, sqlx::Error> {
        let sql = format!(
            "INSERT INTO watch_lists (user_id, name, description, is_default, display_order) \
             SELECT $1, $2, $3, FALSE, \
                    COALESCE((SELECT MAX(display_order) + 1 FROM watch_lists WHERE user_id = $1), 0) \
             WHERE (SELECT COUNT(*) FROM watch_lists WHERE user_id = $1) < $4 \
             RETURNING {WATCH_LIST_COLUMNS}"
        );
        sqlx::query_as::<_, WatchList>(&sql)
            .bind(user_id)
            .bind(name)
            .bind(description)
            .bind(MAX_WATCH_LISTS_PER_USER)
            .fetch_optional(pool)
            .await
    }

    /// 소유자 조건으로 조회합니다.
    pub async fn find_owned(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<WatchList>, sqlx::Error> {
        let sql = format!("SELECT {WATCH_LIST_COLUMNS} FROM watch_lists WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, WatchList>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// 수정된 행이 없으면 `false`.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE watch_lists SET name = $1, description = $2, updated_at = NOW() \
             WHERE id = $3 AND user_id = $4",
        )
        .bind(name)
        .bind(description)
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM watch_lists WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 목록에 해당 심볼이 있는지.
    pub async fn has_symbol(
        pool: &PgPool,
        watch_list_id: Uuid,
        symbol: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM watch_list_items WHERE watch_list_id = $1 AND symbol = $2)",
        )
        .bind(watch_list_id)
        .bind(symbol)
        .fetch_one(pool)
        .await
    }

    /// 종목 메타데이터, 레딧 지표, 스크리너 지표, 활성 알림 수를 함께 조회합니다.
    pub async fn list_item_details(
        pool: &PgPool,
        watch_list_id: Uuid,
    ) -> Result<Vec<WatchListItemDetail>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT
                wli.id, wli.watch_list_id, wli.symbol, wli.notes, COALESCE(wli.tags, '{}') AS tags,
                wli.target_buy_price::float8 AS target_buy_price,
                wli.target_sell_price::float8 AS target_sell_price,
                wli.added_at, wli.display_order,
                COALESCE(t.name, wli.symbol) AS name,
                COALESCE(t.exchange, '') AS exchange,
                COALESCE(t.asset_type, 'stock') AS asset_type,
                t.logo_url,
                rhd.avg_rank::float8 AS reddit_rank,
                rhd.total_mentions::bigint AS reddit_mentions,
                rhd.trend_direction AS reddit_trend,
                sd.ic_score::float8 AS ic_score, sd.ic_rating,
                sd.pe_ratio::float8 AS pe_ratio, sd.pb_ratio::float8 AS pb_ratio,
                sd.ps_ratio::float8 AS ps_ratio, sd.roe::float8 AS roe,
                sd.gross_margin::float8 AS gross_margin, sd.net_margin::float8 AS net_margin,
                sd.debt_to_equity::float8 AS debt_to_equity,
                sd.revenue_growth::float8 AS revenue_growth,
                sd.dividend_yield::float8 AS dividend_yield,
                COALESCE(ac.alert_count, 0) AS alert_count
            FROM watch_list_items wli
            LEFT JOIN tickers t ON wli.symbol = t.symbol
            LEFT JOIN LATERAL (
                SELECT avg_rank, total_mentions, trend_direction
                FROM reddit_heatmap_daily
                WHERE ticker_symbol = wli.symbol
                ORDER BY date DESC
                LIMIT 1
            ) rhd ON TRUE
            LEFT JOIN screener_data sd ON wli.symbol = sd.symbol
            LEFT JOIN LATERAL (
                SELECT COUNT(*) AS alert_count
                FROM alert_rules
                WHERE watch_list_id = wli.watch_list_id
                  AND symbol = wli.symbol
                  AND is_active = TRUE
            ) ac ON TRUE
            WHERE wli.watch_list_id = $1
            ORDER BY wli.display_order ASC, wli.added_at DESC
            "#,
        )
        .bind(watch_list_id)
        .fetch_all(pool)
        .await?;
        Ok(decode_rows(rows, "watch list item"))
    }

    /// 종목을 추가합니다. 종목 존재 여부를 먼저 확인합니다.
    pub async fn add_item(
        pool: &PgPool,
        watch_list_id: Uuid,
        symbol: &str,
        fields: &ItemFields,
    ) -> Result<WatchListItem, AddItemError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tickers WHERE symbol = $1)")
                .bind(symbol)
                .fetch_one(pool)
                .await?;
        if !exists {
            return Err(AddItemError::TickerNotFound);
        }

        let sql = format!(
            "INSERT INTO watch_list_items \
             (watch_list_id, symbol, notes, tags, target_buy_price, target_sell_price, display_order) \
             VALUES ($1, $2, $3, $4, $5, $6, \
                     COALESCE((SELECT MAX(display_order) + 1 FROM watch_list_items WHERE watch_list_id = $1), 0)) \
             RETURNING {ITEM_COLUMNS}"
        );
        sqlx::query_as::<_, WatchListItem>(&sql)
            .bind(watch_list_id)
            .bind(symbol)
            .bind(&fields.notes)
            .bind(&fields.tags)
            .bind(fields.target_buy_price)
            .bind(fields.target_sell_price)
            .fetch_one(pool)
            .await
            .map_err(classify_add_error)
    }

    /// 여러 종목을 추가합니다. `(added, failed)`.
    pub async fn bulk_add(
        pool: &PgPool,
        watch_list_id: Uuid,
        symbols: &[String],
    ) -> (Vec<String>, Vec<String>) {
        let mut added = Vec::new();
        let mut failed = Vec::new();
        let fields = ItemFields::default();

        for symbol in symbols {
            match Self::add_item(pool, watch_list_id, symbol, &fields).await {
                Ok(_) => added.push(symbol.clone()),
                Err(e) => {
                    tracing::debug!(symbol = %symbol, error = %e, "Bulk add skipped ticker");
                    failed.push(symbol.clone());
                }
            }
        }
        (added, failed)
    }

    /// 심볼로 항목을 수정합니다. 없으면 `None`.
    pub async fn update_item(
        pool: &PgPool,
        watch_list_id: Uuid,
        symbol: &str,
        fields: &ItemFields,
    ) -> Result<Option<WatchListItem>, sqlx::Error> {
        let sql = format!(
            "UPDATE watch_list_items \
             SET notes = $1, tags = $2, target_buy_price = $3, target_sell_price = $4 \
             WHERE watch_list_id = $5 AND symbol = $6 \
             RETURNING {ITEM_COLUMNS}"
        );
        sqlx::query_as::<_, WatchListItem>(&sql)
            .bind(&fields.notes)
            .bind(&fields.tags)
            .bind(fields.target_buy_price)
            .bind(fields.target_sell_price)
            .bind(watch_list_id)
            .bind(symbol)
            .fetch_optional(pool)
            .await
    }

    pub async fn remove_item(
        pool: &PgPool,
        watch_list_id: Uuid,
        symbol: &str,
    ) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM watch_list_items WHERE watch_list_id = $1 AND symbol = $2")
                .bind(watch_list_id)
                .bind(symbol)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 모든 항목이 해당 목록에 속하는지 확인합니다.
    pub async fn items_belong_to(
        pool: &PgPool,
        watch_list_id: Uuid,
        item_ids: &[Uuid],
    ) -> Result<bool, sqlx::Error> {
        if item_ids.is_empty() {
            return Ok(true);
        }
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT id) FROM watch_list_items \
             WHERE watch_list_id = $1 AND id = ANY($2)",
        )
        .bind(watch_list_id)
        .bind(item_ids)
        .fetch_one(pool)
        .await?;

        let mut unique = item_ids.to_vec();
        unique.sort_unstable();
        unique.dedup();
        Ok(count == unique.len() as i64)
    }

    /// 표시 순서를 한 트랜잭션으로 갱신합니다.
    pub async fn reorder(
        pool: &PgPool,
        watch_list_id: Uuid,
        orders: &[(Uuid, i32)],
    ) -> Result<(), sqlx::Error> {
        let mut tx = pool.begin().await?;
        for (item_id, display_order) in orders {
            sqlx::query(
                "UPDATE watch_list_items SET display_order = $1 \
                 WHERE id = $2 AND watch_list_id = $3",
            )
            .bind(display_order)
            .bind(item_id)
            .bind(watch_list_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await
    }

    /// 사용자의 모든 항목에서 사용된 태그.
    pub async fn user_tags(pool: &PgPool, user_id: Uuid) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT DISTINCT tag
            FROM watch_list_items wli
            JOIN watch_lists wl ON wl.id = wli.watch_list_id
            CROSS JOIN LATERAL unnest(wli.tags) AS tag
            WHERE wl.user_id = $1 AND tag <> ''
            ORDER BY tag
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }
}

fn classify_add_error(err: sqlx::Error) -> AddItemError {
    if crate::error::is_unique_violation(&err) {
        return AddItemError::AlreadyExists;
    }
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.message().contains(ITEM_LIMIT_TRIGGER_MESSAGE) {
            return AddItemError::LimitReached;
        }
    }
    AddItemError::Database(err)
}
