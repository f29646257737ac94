//! 재무제표 및 저장된 재무 지표 Repository.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use utoipa::ToSchema;

use invest_core::{enrich_cash_flow, yoy_changes, StatementType, Timeframe};

use super::decode_rows;

/// 재무제표 기본 기간 수.
pub const FINANCIALS_DEFAULT_LIMIT: i64 = 8;
/// 재무제표 최대 기간 수.
pub const FINANCIALS_MAX_LIMIT: i64 = 40;

/// 회사 정보.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct FinancialsMetadata {
    pub company_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cik: Option<String>,
}

/// 한 보고 기간의 재무 데이터.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FinancialPeriod {
    pub fiscal_year: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiscal_quarter: Option<i32>,
    pub period_end: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filed_date: Option<NaiveDate>,
    #[schema(value_type = Object)]
    pub data: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yoy_change: Option<BTreeMap<String, f64>>,
}

/// 재무제표 조회 결과.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FinancialsResponse {
    pub ticker: String,
    pub statement_type: StatementType,
    pub timeframe: Timeframe,
    pub periods: Vec<FinancialPeriod>,
    pub metadata: FinancialsMetadata,
}

/// 저장된 재무 지표 (JSON 그대로).
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct StoredMetrics {
    pub symbol: String,
    #[schema(value_type = Object)]
    pub metrics: Value,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct CompanyRow {
    id: i64,
    name: String,
    cik: Option<String>,
}

#[derive(Debug, FromRow)]
struct StatementRow {
    fiscal_year: i32,
    fiscal_quarter: Option<i32>,
    period_end: NaiveDate,
    filed_date: Option<NaiveDate>,
    data: Value,
    previous_data: Option<Value>,
}

impl StatementRow {
    fn into_period(self, statement_type: StatementType) -> FinancialPeriod {
        let data = match self.data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let yoy_change = match &self.previous_data {
            Some(Value::Object(previous)) => Some(yoy_changes(&data, previous)),
            _ => None,
        };
        let data = if statement_type == StatementType::CashFlow {
            enrich_cash_flow(data)
        } else {
            data
        };
        FinancialPeriod {
            fiscal_year: self.fiscal_year,
            fiscal_quarter: self.fiscal_quarter,
            period_end: self.period_end,
            filed_date: self.filed_date,
            data,
            yoy_change,
        }
    }
}

/// 재무 데이터 Repository.
pub struct FinancialsRepository;

impl FinancialsRepository {
    /// 주식 종목의 내부 ID와 회사 정보. 암호화폐 등은 `None`.
    async fn company(
        pool: &PgPool,
        ticker: &str,
    ) -> Result<Option<(i64, FinancialsMetadata)>, sqlx::Error> {
        let row = sqlx::query_as::<_, CompanyRow>(
            "SELECT id::bigint AS id, name, NULLIF(cik, '') AS cik FROM tickers \
             WHERE UPPER(symbol) = UPPER($1) AND asset_type = 'stock' LIMIT 1",
        )
        .bind(ticker)
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|r| {
            (
                r.id,
                FinancialsMetadata {
                    company_name: r.name,
                    cik: r.cik,
                },
            )
        }))
    }

    /// 최근 기간부터 재무제표를 조회합니다. 종목이 없거나 기간이 하나도 없으면 `None`.
    ///
    /// 같은 분기의 전년도 제표가 있으면 `yoy_change`를 채우고, 현금흐름표는 잉여현금흐름을 더합니다.
    pub async fn statements(
        pool: &PgPool,
        ticker: &str,
        statement_type: StatementType,
        timeframe: Timeframe,
        limit: i64,
    ) -> Result<Option<FinancialsResponse>, sqlx::Error> {
        let Some((ticker_id, metadata)) = Self::company(pool, ticker).await? else {
            return Ok(None);
        };

        let rows = sqlx::query(
            r#"
            SELECT cur.fiscal_year, cur.fiscal_quarter, cur.period_end, cur.filed_date,
                   cur.data, prev.data AS previous_data
            FROM financial_statements cur
            LEFT JOIN LATERAL (
                SELECT p.data FROM financial_statements p
                WHERE p.ticker_id = cur.ticker_id
                  AND p.statement_type = cur.statement_type
                  AND p.timeframe = cur.timeframe
                  AND p.fiscal_year = cur.fiscal_year - 1
                  AND p.fiscal_quarter IS NOT DISTINCT FROM cur.fiscal_quarter
                LIMIT 1
            ) prev ON TRUE
            WHERE cur.ticker_id = $1 AND cur.statement_type = $2 AND cur.timeframe = $3
            ORDER BY cur.period_end DESC, cur.fiscal_quarter DESC NULLS LAST
            LIMIT $4
            "#,
        )
        .bind(ticker_id)
        .bind(statement_type.as_str())
        .bind(timeframe.as_str())
        .bind(limit)
        .fetch_all(pool)
        .await?;

        let periods: Vec<FinancialPeriod> = decode_rows::<StatementRow>(rows, "financial statement")
            .into_iter()
            .map(|row| row.into_period(statement_type))
            .collect();
        if periods.is_empty() {
            return Ok(None);
        }

        Ok(Some(FinancialsResponse {
            ticker: ticker.to_string(),
            statement_type,
            timeframe,
            periods,
            metadata,
        }))
    }

    /// 계산되어 저장된 재무 지표.
    pub async fn stored_metrics(
        pool: &PgPool,
        symbol: &str,
    ) -> Result<Option<StoredMetrics>, sqlx::Error> {
        sqlx::query_as::<_, StoredMetrics>(
            "SELECT symbol, metrics_data AS metrics, updated_at \
             FROM fundamental_metrics WHERE symbol = $1",
        )
        .bind(symbol)
        .fetch_optional(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(data: Value, previous: Option<Value>) -> StatementRow {
        StatementRow {
            fiscal_year: 2024,
            fiscal_quarter: Some(2),
            period_end: NaiveDate::from_ymd_opt(2024, 6, 29).unwrap(),
            filed_date: None,
            data,
            previous_data: previous,
        }
    }

    #[test]
    fn test_period_without_prior_year_has_no_yoy() {
        let period = row(json!({ "revenues": 10.0 }), None).into_period(StatementType::Income);
        assert!(period.yoy_change.is_none());

        let body = serde_json::to_value(&period).unwrap();
        assert_eq!(body["period_end"], "2024-06-29");
        assert_eq!(body["fiscal_quarter"], 2);
        assert!(body.get("yoy_change").is_none());
        assert!(body.get("filed_date").is_none());
    }

    #[test]
    fn test_cash_flow_period_is_enriched() {
        let period = row(
            json!({
                "net_cash_flow_from_operating_activities": 100.0,
                "capital_expenditure": -30.0,
            }),
            Some(json!({ "net_cash_flow_from_operating_activities": 80.0 })),
        )
        .into_period(StatementType::CashFlow);

        assert_eq!(period.data["free_cash_flow"], json!(70.0));
        let yoy = period.yoy_change.unwrap();
        assert!((yoy["net_cash_flow_from_operating_activities"] - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_non_object_data_becomes_empty() {
        let period = row(json!("corrupt"), Some(json!([]))).into_period(StatementType::Income);
        assert!(period.data.is_empty());
        assert!(period.yoy_change.is_none());
    }
}
