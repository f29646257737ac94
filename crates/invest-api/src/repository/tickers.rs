//! 종목(tickers) Repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use utoipa::ToSchema;

use super::decode_rows;

/// 종목 레코드.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Stock {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub exchange: Option<String>,
    pub sector: String,
    pub industry: String,
    pub country: String,
    pub currency: String,
    pub market_cap: Option<f64>,
    pub description: String,
    pub website: String,
    pub asset_type: String,
    pub logo_url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Stock {
    pub fn is_crypto(&self) -> bool {
        self.asset_type.eq_ignore_ascii_case("crypto")
    }
}

/// 종목 생성 입력.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct NewStock {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub exchange: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub country: Option<String>,
    pub currency: Option<String>,
    pub market_cap: Option<f64>,
    pub description: Option<String>,
    pub website: Option<String>,
    pub asset_type: Option<String>,
}

const STOCK_COLUMNS: &str = "id::bigint AS id, symbol, name, exchange, \
    COALESCE(sector, '') AS sector, \
    COALESCE(industry, '') AS industry, \
    COALESCE(country, 'US') AS country, \
    COALESCE(currency, 'USD') AS currency, \
    market_cap::float8 AS market_cap, \
    COALESCE(description, '') AS description, \
    COALESCE(website, '') AS website, \
    COALESCE(asset_type, 'stock') AS asset_type, \
    COALESCE(logo_url, '') AS logo_url, \
    created_at, updated_at";

/// 자산 유형 우선순위: stock > etf > index > 그 외(crypto).
const ASSET_TYPE_PRIORITY: &str = "CASE asset_type \
    WHEN 'stock' THEN 0 WHEN 'etf' THEN 1 WHEN 'index' THEN 2 ELSE 3 END";

pub struct TickerRepository;

impl TickerRepository {
    /// 심볼로 종목을 조회합니다 (대소문자 무시).
    ///
    /// 같은 심볼이 여러 자산 유형에 있으면 주식이 우선합니다.
    pub async fn find_by_symbol(pool: &PgPool, symbol: &str) -> Result<Option<Stock>, sqlx::Error> {
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM tickers WHERE UPPER(symbol) = UPPER($1) \
             ORDER BY {ASSET_TYPE_PRIORITY} LIMIT 1"
        );
        sqlx::query_as::<_, Stock>(&sql)
            .bind(symbol)
            .fetch_optional(pool)
            .await
    }

    /// 순위 검색.
    ///
    /// 정확한 심볼 일치, 심볼 접두사, 이름 포함 순으로 정렬한 뒤
    /// 자산 유형과 심볼 순으로 정렬합니다.
    pub async fn search(pool: &PgPool, query: &str, limit: i64) -> Result<Vec<Stock>, sqlx::Error> {
        let sql = format!(
            "SELECT {STOCK_COLUMNS} FROM tickers \
             WHERE UPPER(symbol) LIKE UPPER($1) OR UPPER(name) LIKE UPPER($1) \
             ORDER BY \
               CASE \
                 WHEN UPPER(symbol) = UPPER($2) THEN 1 \
                 WHEN UPPER(symbol) LIKE UPPER($3) THEN 2 \
                 WHEN UPPER(name) LIKE UPPER($1) THEN 3 \
                 ELSE 4 \
               END, \
               {ASSET_TYPE_PRIORITY}, \
               symbol \
             LIMIT $4"
        );
        let contains = format!("%{}%", query);
        let prefix = format!("{}%", query);

        let rows = sqlx::query(&sql)
            .bind(&contains)
            .bind(query)
            .bind(&prefix)
            .bind(limit)
            .fetch_all(pool)
            .await?;
        Ok(decode_rows(rows, "stock"))
    }

    pub async fn list(pool: &PgPool, limit: i64, offset: i64) -> Result<Vec<Stock>, sqlx::Error> {
        let sql = format!("SELECT {STOCK_COLUMNS} FROM tickers ORDER BY symbol LIMIT $1 OFFSET $2");
        let rows = sqlx::query(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;
        Ok(decode_rows(rows, "stock"))
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tickers")
            .fetch_one(pool)
            .await
    }

    /// 종목을 생성합니다. 심볼 중복은 unique violation으로 반환됩니다.
    pub async fn create(pool: &PgPool, input: &NewStock) -> Result<Stock, sqlx::Error> {
        let sql = format!(
            "INSERT INTO tickers (symbol, name, exchange, sector, industry, country, currency, \
             market_cap, description, website, asset_type) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, COALESCE($11, 'stock')) \
             RETURNING {STOCK_COLUMNS}"
        );
        sqlx::query_as::<_, Stock>(&sql)
            .bind(&input.symbol)
            .bind(&input.name)
            .bind(&input.exchange)
            .bind(&input.sector)
            .bind(&input.industry)
            .bind(&input.country)
            .bind(&input.currency)
            .bind(input.market_cap)
            .bind(&input.description)
            .bind(&input.website)
            .bind(&input.asset_type)
            .fetch_one(pool)
            .await
    }

    pub async fn exists(pool: &PgPool, symbol: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tickers WHERE symbol = $1)")
            .bind(symbol)
            .fetch_one(pool)
            .await
    }

    /// 심볼 → 회사명 맵.
    pub async fn names_for(
        pool: &PgPool,
        symbols: &[String],
    ) -> Result<HashMap<String, String>, sqlx::Error> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT symbol, name FROM tickers WHERE symbol = ANY($1) AND name IS NOT NULL",
        )
        .bind(symbols)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}
