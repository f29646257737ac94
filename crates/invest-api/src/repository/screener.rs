//! 종목 스크리너 Repository.
//!
//! `screener_data` materialized view 단일 테이블을 조회합니다.
//! 범위 필터는 [`RANGE_FILTERS`] 레지스트리로 선언하며, 항목마다
//! `<param>_min` / `<param>_max` 쿼리 파라미터가 대응됩니다.

use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use std::collections::HashMap;
use utoipa::ToSchema;

use super::decode_rows;
use crate::utils::{capped_or, resolve_sort_column, split_csv, SortOrder};

/// 스크리너 기본/최대 페이지 크기.
pub const SCREENER_MAX_LIMIT: i64 = 20_000;
/// OFFSET 계산이 넘치지 않는 최대 페이지.
pub const SCREENER_MAX_PAGE: i64 = i64::MAX / SCREENER_MAX_LIMIT;
const DEFAULT_SORT_COLUMN: &str = "market_cap";

/// 범위 필터 정의.
#[derive(Debug, Clone, Copy)]
pub struct RangeFilterDef {
    /// 쿼리 파라미터 접두어
    pub param: &'static str,
    /// `screener_data` 컬럼
    pub column: &'static str,
    /// `_max` 지원 여부
    pub has_max: bool,
}

const fn range(param: &'static str, column: &'static str) -> RangeFilterDef {
    RangeFilterDef { param, column, has_max: true }
}

/// 지원하는 범위 필터.
pub const RANGE_FILTERS: &[RangeFilterDef] = &[
    range("market_cap", "market_cap"),
    range("pe", "pe_ratio"),
    range("pb", "price_to_book"),
    range("ps", "price_to_sales"),
    range("roe", "roe"),
    range("roa", "roa"),
    range("gross_margin", "gross_margin"),
    range("net_margin", "net_margin"),
    range("debt_to_equity", "debt_to_equity"),
    range("current_ratio", "current_ratio"),
    range("revenue_growth", "revenue_growth"),
    range("eps_growth", "eps_growth_yoy"),
    range("dividend_yield", "dividend_yield"),
    range("payout_ratio", "payout_ratio"),
    // 연속 배당 연수는 하한만 의미가 있다
    RangeFilterDef { param: "consecutive_div_years", column: "consecutive_dividend_years", has_max: false },
    range("beta", "beta"),
    range("dcf_upside", "dcf_upside_percent"),
    range("ic_score", "ic_score"),
    range("value_score", "value_score"),
    range("growth_score", "growth_score"),
    range("profitability_score", "profitability_score"),
    range("financial_health_score", "financial_health_score"),
    range("momentum_score", "momentum_score"),
    range("analyst_score", "analyst_consensus_score"),
    range("insider_score", "insider_activity_score"),
    range("institutional_score", "institutional_score"),
    range("sentiment_score", "news_sentiment_score"),
    range("technical_score", "technical_score"),
];

/// 정렬 허용 목록 (API 이름, 컬럼).
pub const SCREENER_SORT_COLUMNS: &[(&str, &str)] = &[
    ("symbol", "symbol"),
    ("name", "name"),
    ("market_cap", "market_cap"),
    ("price", "current_price"),
    ("pe_ratio", "pe_ratio"),
    ("pb_ratio", "price_to_book"),
    ("ps_ratio", "price_to_sales"),
    ("roe", "roe"),
    ("revenue_growth", "revenue_growth"),
    ("dividend_yield", "dividend_yield"),
    // beta, ic_score는 view에 없어 다른 컬럼으로 대체
    ("beta", "roe"),
    ("ic_score", "market_cap"),
];

/// 적용된 범위 조건.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeBound {
    pub column: &'static str,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// 해석된 스크리너 파라미터.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenerParams {
    pub page: i64,
    pub limit: i64,
    pub sort_column: &'static str,
    pub order: SortOrder,
    pub asset_type: String,
    pub sectors: Vec<String>,
    pub industries: Vec<String>,
    pub ranges: Vec<RangeBound>,
}

impl ScreenerParams {
    /// 쿼리 문자열 맵을 해석합니다. 잘못된 값은 기본값으로 대체합니다.
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let get = |key: &str| query.get(key).map(String::as_str);
        let parse_f64 = |key: String| {
            query
                .get(&key)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };

        let page = get("page")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .filter(|p| *p > 0)
            .unwrap_or(1)
            .min(SCREENER_MAX_PAGE);

        let mut sort_column = resolve_sort_column(get("sort"), SCREENER_SORT_COLUMNS, DEFAULT_SORT_COLUMN);
        if !sort_column.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
            sort_column = DEFAULT_SORT_COLUMN;
        }

        let ranges = RANGE_FILTERS
            .iter()
            .filter_map(|def| {
                let mut min = parse_f64(format!("{}_min", def.param));
                let mut max = if def.has_max {
                    parse_f64(format!("{}_max", def.param))
                } else {
                    None
                };
                if let (Some(lo), Some(hi)) = (min, max) {
                    if lo > hi {
                        std::mem::swap(&mut min, &mut max);
                    }
                }
                (min.is_some() || max.is_some()).then_some(RangeBound {
                    column: def.column,
                    min,
                    max,
                })
            })
            .collect();

        Self {
            page,
            limit: capped_or(get("limit"), SCREENER_MAX_LIMIT, SCREENER_MAX_LIMIT),
            sort_column,
            order: SortOrder::parse_or(get("order"), SortOrder::Desc),
            asset_type: get("asset_type")
                .filter(|v| !v.is_empty())
                .unwrap_or("CS")
                .to_string(),
            sectors: split_csv(get("sectors")),
            industries: split_csv(get("industries")),
            ranges,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// ceil(total / limit)
    pub fn total_pages(&self, total: i64) -> i64 {
        if self.limit <= 0 {
            return 0;
        }
        (total + self.limit - 1) / self.limit
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ScreenerStock {
    pub symbol: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub market_cap: Option<f64>,
    pub price: Option<f64>,
    pub change_percent: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub pb_ratio: Option<f64>,
    pub ps_ratio: Option<f64>,
    pub roe: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub beta: Option<f64>,
    pub ic_score: Option<f64>,
}

pub struct ScreenerRepository;

impl ScreenerRepository {
    /// WHERE 절을 추가합니다. 조건이 없으면 아무것도 붙이지 않습니다.
    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, params: &ScreenerParams) {
        let mut first = true;
        let mut next = |builder: &mut QueryBuilder<'_, Postgres>| {
            builder.push(if first { " WHERE " } else { " AND " });
            first = false;
        };

        for (column, values) in [("sector", &params.sectors), ("industry", &params.industries)] {
            if values.is_empty() {
                continue;
            }
            next(builder);
            builder.push(column).push(" IN (");
            let mut list = builder.separated(", ");
            for value in values {
                list.push_bind(value.clone());
            }
            list.push_unseparated(")");
        }

        for bound in &params.ranges {
            if let Some(min) = bound.min {
                next(builder);
                builder.push(bound.column).push(" >= ").push_bind(min);
            }
            if let Some(max) = bound.max {
                next(builder);
                builder.push(bound.column).push(" <= ").push_bind(max);
            }
        }
    }

    /// 조건에 맞는 종목과 전체 건수.
    pub async fn search(
        pool: &PgPool,
        params: &ScreenerParams,
    ) -> Result<(Vec<ScreenerStock>, i64), sqlx::Error> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM screener_data");
        Self::push_filters(&mut count, params);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut query = QueryBuilder::new(
            "SELECT symbol, name, sector, industry, \
             market_cap::float8 AS market_cap, current_price::float8 AS price, \
             change_percent::float8 AS change_percent, pe_ratio::float8 AS pe_ratio, \
             price_to_book::float8 AS pb_ratio, price_to_sales::float8 AS ps_ratio, \
             roe::float8 AS roe, revenue_growth::float8 AS revenue_growth, \
             dividend_yield::float8 AS dividend_yield, \
             0.0::float8 AS beta, 0.0::float8 AS ic_score \
             FROM screener_data",
        );
        Self::push_filters(&mut query, params);
        // 정렬 컬럼은 허용 목록에서만 온다
        query
            .push(format!(
                " ORDER BY \"{}\" {} NULLS LAST LIMIT ",
                params.sort_column,
                params.order.as_sql()
            ))
            .push_bind(params.limit)
            .push(" OFFSET ")
            .push_bind(params.offset());

        let rows = query.build().fetch_all(pool).await?;
        Ok((decode_rows(rows, "screener stock"), total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let params = ScreenerParams::from_query(&HashMap::new());
        assert_eq!(params.page, 1);
        assert_eq!(params.limit, SCREENER_MAX_LIMIT);
        assert_eq!(params.sort_column, "market_cap");
        assert_eq!(params.order, SortOrder::Desc);
        assert_eq!(params.asset_type, "CS");
        assert!(params.ranges.is_empty());
    }

    #[test]
    fn test_limit_and_page_fallbacks() {
        let params = ScreenerParams::from_query(&query(&[("limit", "50000"), ("page", "0")]));
        assert_eq!(params.limit, SCREENER_MAX_LIMIT);
        assert_eq!(params.page, 1);

        let params = ScreenerParams::from_query(&query(&[("limit", "-1")]));
        assert_eq!(params.limit, SCREENER_MAX_LIMIT);

        let params = ScreenerParams::from_query(&query(&[("limit", "25"), ("page", "3")]));
        assert_eq!(params.offset(), 50);
        assert_eq!(params.total_pages(51), 3);
        assert_eq!(params.total_pages(0), 0);
    }

    #[test]
    fn test_huge_page_is_clamped() {
        let max = i64::MAX.to_string();
        let params = ScreenerParams::from_query(&query(&[("page", max.as_str())]));
        assert_eq!(params.page, SCREENER_MAX_PAGE);
        assert_eq!(params.limit, SCREENER_MAX_LIMIT);
        assert!(params.offset() >= 0);
        assert_eq!(params.offset(), (SCREENER_MAX_PAGE - 1) * SCREENER_MAX_LIMIT);

        let params = ScreenerParams::from_query(&query(&[("page", "9223372036854775807"), ("limit", "1")]));
        assert_eq!(params.offset(), SCREENER_MAX_PAGE - 1);
    }

    #[test]
    fn test_sort_and_order() {
        let params = ScreenerParams::from_query(&query(&[("sort", "pb_ratio"), ("order", "ASC")]));
        assert_eq!(params.sort_column, "price_to_book");
        assert_eq!(params.order, SortOrder::Asc);

        let params = ScreenerParams::from_query(&query(&[("sort", "name; drop"), ("order", "sideways")]));
        assert_eq!(params.sort_column, "market_cap");
        assert_eq!(params.order, SortOrder::Desc);
    }

    #[test]
    fn test_range_swap_and_min_only() {
        let params = ScreenerParams::from_query(&query(&[
            ("pe_min", "30"),
            ("pe_max", "10"),
            ("consecutive_div_years_min", "5"),
            ("consecutive_div_years_max", "1"),
            ("roe_min", "abc"),
        ]));
        assert_eq!(
            params.ranges,
            vec![
                RangeBound { column: "pe_ratio", min: Some(10.0), max: Some(30.0) },
                RangeBound { column: "consecutive_dividend_years", min: Some(5.0), max: None },
            ]
        );
    }

    #[test]
    fn test_sector_lists() {
        let params = ScreenerParams::from_query(&query(&[
            ("sectors", "Technology, Healthcare,,"),
            ("industries", "Semiconductors"),
        ]));
        assert_eq!(params.sectors, vec!["Technology", "Healthcare"]);
        assert_eq!(params.industries, vec!["Semiconductors"]);
    }

    #[test]
    fn test_filter_sql_shape() {
        let params = ScreenerParams::from_query(&query(&[
            ("sectors", "Technology,Energy"),
            ("market_cap_min", "1000"),
        ]));
        let mut builder = QueryBuilder::new("SELECT COUNT(*) FROM screener_data");
        ScreenerRepository::push_filters(&mut builder, &params);
        assert_eq!(
            builder.sql(),
            "SELECT COUNT(*) FROM screener_data WHERE sector IN ($1, $2) AND market_cap >= $3"
        );
    }

    #[test]
    fn test_sort_columns_are_safe_identifiers() {
        for (_, column) in SCREENER_SORT_COLUMNS {
            assert!(column.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
        }
    }
}
