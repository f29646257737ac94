//! 재무제표 종류, 보고 기간, 전년 대비 변화율 계산.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 재무제표 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    Income,
    BalanceSheet,
    CashFlow,
    Ratios,
}

impl StatementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow",
            Self::Ratios => "ratios",
        }
    }
}

/// 보고 기간.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
pub enum Timeframe {
    #[default]
    #[serde(rename = "quarterly")]
    Quarterly,
    #[serde(rename = "annual")]
    Annual,
    #[serde(rename = "trailing_twelve_months")]
    TrailingTwelveMonths,
}

impl Timeframe {
    /// 쿼리 문자열을 해석합니다. 대소문자 무시, 알 수 없는 값은 분기.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("annual") => Self::Annual,
            Some("ttm") | Some("trailing_twelve_months") => Self::TrailingTwelveMonths,
            _ => Self::Quarterly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Quarterly => "quarterly",
            Self::Annual => "annual",
            Self::TrailingTwelveMonths => "trailing_twelve_months",
        }
    }
}

/// 항목별 전년 동기 대비 변화율 (비율, 1.0 = 100%).
///
/// `_label`/`_unit` 메타 필드, 숫자가 아닌 값, 전년 값이 0이거나 없는 항목은 제외합니다.
/// 분모는 전년 값의 절댓값이라 적자 축소는 양수로 나옵니다.
pub fn yoy_changes(current: &Map<String, Value>, previous: &Map<String, Value>) -> BTreeMap<String, f64> {
    current
        .iter()
        .filter(|(key, _)| !key.ends_with("_label") && !key.ends_with("_unit"))
        .filter_map(|(key, value)| {
            let now = value.as_f64()?;
            let before = previous.get(key)?.as_f64()?;
            if before == 0.0 {
                return None;
            }
            Some((key.clone(), (now - before) / before.abs()))
        })
        .collect()
}

/// 잉여현금흐름 = 영업현금흐름 + 자본적 지출 (지출은 음수로 기록됨).
///
/// 자본적 지출이 없으면 영업현금흐름 그대로, 영업현금흐름이 없으면 `None`.
pub fn free_cash_flow(data: &Map<String, Value>) -> Option<f64> {
    let operating = data
        .get("net_cash_flow_from_operating_activities")?
        .as_f64()?;
    let capex = data
        .get("capital_expenditure")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    Some(operating + capex)
}

/// 현금흐름표에 `free_cash_flow`를 채웁니다.
pub fn enrich_cash_flow(mut data: Map<String, Value>) -> Map<String, Value> {
    if let Some(fcf) = free_cash_flow(&data).and_then(serde_json::Number::from_f64) {
        data.insert("free_cash_flow".to_string(), Value::Number(fcf));
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("object expected"),
        }
    }

    #[test]
    fn test_timeframe_aliases() {
        assert_eq!(Timeframe::parse_or_default(None), Timeframe::Quarterly);
        assert_eq!(Timeframe::parse_or_default(Some("ANNUAL")), Timeframe::Annual);
        assert_eq!(
            Timeframe::parse_or_default(Some("ttm")),
            Timeframe::TrailingTwelveMonths
        );
        assert_eq!(Timeframe::parse_or_default(Some("weekly")), Timeframe::Quarterly);
        assert_eq!(Timeframe::TrailingTwelveMonths.as_str(), "trailing_twelve_months");
    }

    #[test]
    fn test_yoy_skips_metadata_and_zero_base() {
        let current = map(json!({
            "revenues": 120.0,
            "net_income_loss": -5.0,
            "revenues_label": "Revenue",
            "eps_unit": 3.0,
            "operating_expenses": 10.0,
            "new_item": 7.0,
            "filing": "10-Q",
        }));
        let previous = map(json!({
            "revenues": 100.0,
            "net_income_loss": -10.0,
            "revenues_label": "Revenue",
            "eps_unit": 1.0,
            "operating_expenses": 0.0,
            "filing": "10-Q",
        }));

        let changes = yoy_changes(&current, &previous);
        assert_eq!(changes.len(), 2);
        assert!((changes["revenues"] - 0.2).abs() < 1e-9);
        // 적자 폭이 줄면 양수
        assert!((changes["net_income_loss"] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_free_cash_flow() {
        let data = map(json!({
            "net_cash_flow_from_operating_activities": 118254.0,
            "capital_expenditure": -9447.0,
        }));
        assert_eq!(free_cash_flow(&data), Some(108807.0));

        let no_capex = map(json!({ "net_cash_flow_from_operating_activities": 50.0 }));
        assert_eq!(free_cash_flow(&no_capex), Some(50.0));

        let enriched = enrich_cash_flow(map(json!({ "capital_expenditure": -1.0 })));
        assert!(!enriched.contains_key("free_cash_flow"));
    }
}
