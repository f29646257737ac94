//! 관리자 데이터 조회 Repository.
//!
//! 모든 목록은 `(rows, total)`을 반환합니다. 건수 조회 실패는 0으로 처리합니다.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

use super::decode_rows;
use crate::utils::SortOrder;

/// 통계 대상 테이블.
pub const STATS_TABLES: &[&str] = &[
    "tickers",
    "stock_prices",
    "fundamentals",
    "ic_scores",
    "news_articles",
    "insider_trading",
    "analyst_ratings",
    "technical_indicators",
    "users",
    "watch_lists",
    "alert_rules",
    "user_subscriptions",
    "reddit_heatmap_daily",
];

/// 종목 정렬 허용 목록.
pub const STOCK_SORT_COLUMNS: &[(&str, &str)] = &[
    ("symbol", "symbol"),
    ("name", "name"),
    ("exchange", "exchange"),
    ("sector", "sector"),
    ("market_cap", "market_cap"),
    ("created_at", "created_at"),
];

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AdminStock {
    pub symbol: String,
    pub name: Option<String>,
    pub exchange: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub description: Option<String>,
    pub country: Option<String>,
    pub currency: Option<String>,
    pub active: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AdminUser {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub timezone: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub email_verified: bool,
    pub is_premium: bool,
    pub is_active: bool,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AdminNewsArticle {
    pub id: i64,
    pub tickers: Option<Vec<String>>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub source: Option<String>,
    pub url: Option<String>,
    #[serde(rename = "sentiment")]
    pub sentiment_label: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AdminFundamental {
    pub ticker: Option<String>,
    pub calculation_date: Option<NaiveDate>,
    pub ttm_period_start: Option<NaiveDate>,
    pub ttm_period_end: Option<NaiveDate>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub ps_ratio: Option<f64>,
    pub revenue: Option<i64>,
    pub eps: Option<f64>,
    pub market_cap: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AdminAlertRule {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub watch_list_id: Option<Uuid>,
    pub symbol: Option<String>,
    pub alert_type: Option<String>,
    pub frequency: Option<String>,
    pub notify_email: Option<bool>,
    pub notify_in_app: Option<bool>,
    pub is_active: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AdminWatchList {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_default: Option<bool>,
    pub is_public: Option<bool>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// SEC 공시 기반 분기/연간 재무.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AdminSecFinancial {
    pub id: i64,
    pub ticker: Option<String>,
    pub period_end_date: Option<NaiveDate>,
    pub fiscal_year: Option<i32>,
    pub fiscal_quarter: Option<i32>,
    pub revenue: Option<i64>,
    pub gross_profit: Option<i64>,
    pub operating_income: Option<i64>,
    pub net_income: Option<i64>,
    pub eps_diluted: Option<f64>,
    pub total_assets: Option<i64>,
    pub total_liabilities: Option<i64>,
    pub shareholders_equity: Option<i64>,
    pub roe: Option<f64>,
    pub gross_margin: Option<f64>,
    pub operating_margin: Option<f64>,
    pub net_margin: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// 최근 4분기 합산(TTM) 재무.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AdminTtmFinancial {
    pub id: i64,
    pub ticker: Option<String>,
    pub calculation_date: Option<NaiveDate>,
    pub ttm_period_start: Option<NaiveDate>,
    pub ttm_period_end: Option<NaiveDate>,
    pub revenue: Option<i64>,
    pub net_income: Option<i64>,
    pub eps_diluted: Option<f64>,
    pub shareholders_equity: Option<i64>,
    pub operating_cash_flow: Option<i64>,
    pub free_cash_flow: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AdminValuationRatio {
    pub id: i64,
    pub ticker: Option<String>,
    pub calculation_date: Option<NaiveDate>,
    pub stock_price: Option<f64>,
    pub ttm_market_cap: Option<i64>,
    pub ttm_pe_ratio: Option<f64>,
    pub ttm_pb_ratio: Option<f64>,
    pub ttm_ps_ratio: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// 관리자 목록 조회 조건.
#[derive(Debug, Clone)]
pub struct AdminPage {
    pub limit: i64,
    pub offset: i64,
    pub search: Option<String>,
}

const FUNDAMENTALS_FROM: &str = " FROM ttm_financials t \
    FULL OUTER JOIN valuation_ratios v \
    ON t.ticker = v.ticker AND t.calculation_date = v.calculation_date";

/// 관리자 조회 Repository.
pub struct AdminRepository;

impl AdminRepository {
    /// `SELECT COUNT(*)` 결과. 실패하면 0.
    async fn count(pool: &PgPool, mut builder: QueryBuilder<'_, Postgres>) -> i64 {
        match builder.build_query_scalar::<i64>().fetch_one(pool).await {
            Ok(total) => total,
            Err(e) => {
                tracing::warn!(error = %e, "Admin count query failed");
                0
            }
        }
    }

    /// 검색 조건을 붙입니다. `columns` 중 하나라도 ILIKE에 걸리면 포함.
    fn push_search(builder: &mut QueryBuilder<'_, Postgres>, columns: &[&str], pattern: &str) {
        builder.push(" WHERE (");
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                builder.push(" OR ");
            }
            builder.push(*column).push(" ILIKE ").push_bind(pattern.to_string());
        }
        builder.push(")");
    }

    fn push_page(builder: &mut QueryBuilder<'_, Postgres>, page: &AdminPage) {
        builder
            .push(" LIMIT ")
            .push_bind(page.limit)
            .push(" OFFSET ")
            .push_bind(page.offset);
    }

    pub async fn list_stocks(
        pool: &PgPool,
        page: &AdminPage,
        sort_column: &'static str,
        order: SortOrder,
    ) -> Result<(Vec<AdminStock>, i64), sqlx::Error> {
        const SEARCH: &[&str] = &["symbol", "name"];

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM tickers");
        let mut query = QueryBuilder::new(
            "SELECT symbol, name, exchange, sector, industry, market_cap::float8 AS market_cap, \
             description, country, currency, active, created_at, updated_at FROM tickers",
        );
        if let Some(pattern) = &page.search {
            Self::push_search(&mut count, SEARCH, pattern);
            Self::push_search(&mut query, SEARCH, pattern);
        }
        query
            .push(" ORDER BY ")
            .push(sort_column)
            .push(" ")
            .push(order.as_sql());
        Self::push_page(&mut query, page);

        let total = Self::count(pool, count).await;
        let rows = query.build().fetch_all(pool).await?;
        Ok((decode_rows(rows, "stock"), total))
    }

    pub async fn list_users(
        pool: &PgPool,
        page: &AdminPage,
    ) -> Result<(Vec<AdminUser>, i64), sqlx::Error> {
        const SEARCH: &[&str] = &["email", "full_name"];

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM users");
        let mut query = QueryBuilder::new(
            "SELECT id, email, full_name, timezone, created_at, updated_at, last_login_at, \
             email_verified, is_premium, is_active, is_admin FROM users",
        );
        if let Some(pattern) = &page.search {
            Self::push_search(&mut count, SEARCH, pattern);
            Self::push_search(&mut query, SEARCH, pattern);
        }
        query.push(" ORDER BY created_at DESC");
        Self::push_page(&mut query, page);

        let total = Self::count(pool, count).await;
        let rows = query.build().fetch_all(pool).await?;
        Ok((decode_rows(rows, "user"), total))
    }

    pub async fn list_news(
        pool: &PgPool,
        page: &AdminPage,
    ) -> Result<(Vec<AdminNewsArticle>, i64), sqlx::Error> {
        const SEARCH: &[&str] = &["title"];

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM news_articles");
        let mut query = QueryBuilder::new(
            "SELECT id::bigint AS id, tickers, title, summary, source, url, sentiment_label, \
             author, published_at, created_at FROM news_articles",
        );
        if let Some(pattern) = &page.search {
            Self::push_search(&mut count, SEARCH, pattern);
            Self::push_search(&mut query, SEARCH, pattern);
        }
        query.push(" ORDER BY published_at DESC");
        Self::push_page(&mut query, page);

        let total = Self::count(pool, count).await;
        let rows = query.build().fetch_all(pool).await?;
        Ok((decode_rows(rows, "news article"), total))
    }

    /// TTM 재무와 밸류에이션 비율을 합쳐 조회합니다.
    pub async fn list_fundamentals(
        pool: &PgPool,
        page: &AdminPage,
    ) -> Result<(Vec<AdminFundamental>, i64), sqlx::Error> {
        const SEARCH: &[&str] = &["COALESCE(t.ticker, v.ticker)"];

        let mut count = QueryBuilder::new("SELECT COUNT(*)");
        count.push(FUNDAMENTALS_FROM);
        let mut query = QueryBuilder::new(
            "SELECT COALESCE(t.ticker, v.ticker) AS ticker, \
             COALESCE(t.calculation_date, v.calculation_date) AS calculation_date, \
             t.ttm_period_start, t.ttm_period_end, \
             v.ttm_pe_ratio::float8 AS pe_ratio, v.ttm_pb_ratio::float8 AS pb_ratio, \
             v.ttm_ps_ratio::float8 AS ps_ratio, t.revenue::bigint AS revenue, \
             t.eps_diluted::float8 AS eps, v.ttm_market_cap::bigint AS market_cap, \
             COALESCE(t.created_at, v.created_at) AS created_at",
        );
        query.push(FUNDAMENTALS_FROM);

        if let Some(pattern) = &page.search {
            Self::push_search(&mut count, SEARCH, pattern);
            Self::push_search(&mut query, SEARCH, pattern);
        }
        query.push(
            " ORDER BY COALESCE(t.ticker, v.ticker), COALESCE(t.created_at, v.created_at) DESC",
        );
        Self::push_page(&mut query, page);

        let total = Self::count(pool, count).await;
        let rows = query.build().fetch_all(pool).await?;
        Ok((decode_rows(rows, "fundamental"), total))
    }

    /// 종목 코드로 검색하는 단일 테이블 목록. 최신 순.
    async fn list_by_ticker<T>(
        pool: &PgPool,
        page: &AdminPage,
        table: &'static str,
        columns: &'static str,
        order_by: &'static str,
        entity: &'static str,
    ) -> Result<(Vec<T>, i64), sqlx::Error>
    where
        T: for<'r> FromRow<'r, sqlx::postgres::PgRow>,
    {
        const SEARCH: &[&str] = &["ticker"];

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM ");
        count.push(table);
        let mut query = QueryBuilder::new("SELECT ");
        query.push(columns).push(" FROM ").push(table);
        if let Some(pattern) = &page.search {
            Self::push_search(&mut count, SEARCH, pattern);
            Self::push_search(&mut query, SEARCH, pattern);
        }
        query.push(" ORDER BY ").push(order_by);
        Self::push_page(&mut query, page);

        let total = Self::count(pool, count).await;
        let rows = query.build().fetch_all(pool).await?;
        Ok((decode_rows(rows, entity), total))
    }

    pub async fn list_sec_financials(
        pool: &PgPool,
        page: &AdminPage,
    ) -> Result<(Vec<AdminSecFinancial>, i64), sqlx::Error> {
        Self::list_by_ticker(
            pool,
            page,
            "financials",
            "id::bigint AS id, ticker, period_end_date, fiscal_year::int AS fiscal_year, \
             fiscal_quarter::int AS fiscal_quarter, revenue::bigint AS revenue, \
             gross_profit::bigint AS gross_profit, operating_income::bigint AS operating_income, \
             net_income::bigint AS net_income, eps_diluted::float8 AS eps_diluted, \
             total_assets::bigint AS total_assets, total_liabilities::bigint AS total_liabilities, \
             shareholders_equity::bigint AS shareholders_equity, roe::float8 AS roe, \
             gross_margin::float8 AS gross_margin, operating_margin::float8 AS operating_margin, \
             net_margin::float8 AS net_margin, created_at",
            "period_end_date DESC, ticker",
            "sec financial",
        )
        .await
    }

    pub async fn list_ttm_financials(
        pool: &PgPool,
        page: &AdminPage,
    ) -> Result<(Vec<AdminTtmFinancial>, i64), sqlx::Error> {
        Self::list_by_ticker(
            pool,
            page,
            "ttm_financials",
            "id::bigint AS id, ticker, calculation_date, ttm_period_start, ttm_period_end, \
             revenue::bigint AS revenue, net_income::bigint AS net_income, \
             eps_diluted::float8 AS eps_diluted, shareholders_equity::bigint AS shareholders_equity, \
             operating_cash_flow::bigint AS operating_cash_flow, \
             free_cash_flow::bigint AS free_cash_flow, created_at",
            "calculation_date DESC, ticker",
            "ttm financial",
        )
        .await
    }

    pub async fn list_valuation_ratios(
        pool: &PgPool,
        page: &AdminPage,
    ) -> Result<(Vec<AdminValuationRatio>, i64), sqlx::Error> {
        Self::list_by_ticker(
            pool,
            page,
            "valuation_ratios",
            "id::bigint AS id, ticker, calculation_date, stock_price::float8 AS stock_price, \
             ttm_market_cap::bigint AS ttm_market_cap, ttm_pe_ratio::float8 AS ttm_pe_ratio, \
             ttm_pb_ratio::float8 AS ttm_pb_ratio, ttm_ps_ratio::float8 AS ttm_ps_ratio, created_at",
            "calculation_date DESC, ticker",
            "valuation ratio",
        )
        .await
    }

    pub async fn list_alerts(
        pool: &PgPool,
        page: &AdminPage,
    ) -> Result<(Vec<AdminAlertRule>, i64), sqlx::Error> {
        let total = Self::count(pool, QueryBuilder::new("SELECT COUNT(*) FROM alert_rules")).await;
        let rows = sqlx::query(
            "SELECT id, user_id, watch_list_id, symbol, alert_type, frequency, \
             notify_email, notify_in_app, is_active, created_at \
             FROM alert_rules ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;
        Ok((decode_rows(rows, "alert rule"), total))
    }

    pub async fn list_watch_lists(
        pool: &PgPool,
        page: &AdminPage,
    ) -> Result<(Vec<AdminWatchList>, i64), sqlx::Error> {
        let total = Self::count(pool, QueryBuilder::new("SELECT COUNT(*) FROM watch_lists")).await;
        let rows = sqlx::query(
            "SELECT id, user_id, name, description, is_default, is_public, created_at, updated_at \
             FROM watch_lists ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;
        Ok((decode_rows(rows, "watch list"), total))
    }

    /// 테이블별 행 수. 조회에 실패한 테이블은 0.
    pub async fn table_counts(pool: &PgPool) -> BTreeMap<&'static str, i64> {
        let mut stats = BTreeMap::new();
        for table in STATS_TABLES {
            // 테이블 이름은 고정 목록에서만 온다
            let sql = format!("SELECT COUNT(*) FROM {}", table);
            let count = sqlx::query_scalar::<_, i64>(&sql)
                .fetch_one(pool)
                .await
                .unwrap_or_else(|e| {
                    tracing::debug!(table, error = %e, "Table count failed");
                    0
                });
            stats.insert(*table, count);
        }
        stats
    }
}
