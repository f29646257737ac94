//! 쿼리 파라미터 해석 헬퍼.
//!
//! 잘못된 값은 에러 대신 기본값으로 대체합니다.

use serde::Deserialize;

/// 관리자 목록 기본 페이지 크기.
pub const ADMIN_DEFAULT_LIMIT: i64 = 50;
/// 관리자 목록 최대 페이지 크기.
pub const ADMIN_MAX_LIMIT: i64 = 200;

/// 정수 파라미터를 해석합니다. 비어 있거나, 숫자가 아니거나, 음수면 기본값.
pub fn parse_query_int(value: Option<&str>, default: i64) -> i64 {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => match raw.parse::<i64>() {
            Ok(n) if n >= 0 => n,
            _ => default,
        },
        None => default,
    }
}

/// 범위를 벗어나면 기본값으로 대체합니다.
pub fn in_range_or(value: Option<&str>, min: i64, max: i64, default: i64) -> i64 {
    value
        .map(str::trim)
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|n| (min..=max).contains(n))
        .unwrap_or(default)
}

/// 1 이상이면 `max`로 상한, 아니면 기본값.
pub fn capped_or(value: Option<&str>, max: i64, default: i64) -> i64 {
    match value.map(str::trim).and_then(|v| v.parse::<i64>().ok()) {
        Some(n) if n > 0 => n.min(max),
        _ => default,
    }
}

/// 정렬 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// 대소문자 무시. 그 외 값은 기본값.
    pub fn parse_or(value: Option<&str>, default: SortOrder) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("asc") => Self::Asc,
            Some("desc") => Self::Desc,
            _ => default,
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// 허용 목록에서 정렬 컬럼을 찾습니다. 없으면 기본 컬럼.
///
/// 허용 목록은 `(API 이름, SQL 컬럼)` 쌍입니다.
pub fn resolve_sort_column(
    requested: Option<&str>,
    allowed: &'static [(&'static str, &'static str)],
    default: &'static str,
) -> &'static str {
    requested
        .and_then(|name| allowed.iter().find(|(api, _)| *api == name))
        .map(|(_, column)| *column)
        .unwrap_or(default)
}

/// 관리자 목록 공통 쿼리.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminListQuery {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

impl AdminListQuery {
    /// limit: 기본 50, 최대 200.
    pub fn limit(&self) -> i64 {
        parse_query_int(self.limit.as_deref(), ADMIN_DEFAULT_LIMIT).min(ADMIN_MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        parse_query_int(self.offset.as_deref(), 0)
    }

    /// 비어 있지 않은 검색어의 ILIKE 패턴.
    pub fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s))
    }
}

/// 쉼표 구분 목록. 공백을 제거하고 빈 항목은 버립니다.
pub fn split_csv(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_query_int() {
        assert_eq!(parse_query_int(None, 50), 50);
        assert_eq!(parse_query_int(Some(""), 50), 50);
        assert_eq!(parse_query_int(Some("abc"), 50), 50);
        assert_eq!(parse_query_int(Some("-5"), 50), 50);
        assert_eq!(parse_query_int(Some("0"), 50), 0);
        assert_eq!(parse_query_int(Some("120"), 50), 120);
    }

    #[test]
    fn test_admin_limit_cap() {
        let query = AdminListQuery {
            limit: Some("1000".into()),
            offset: Some("-1".into()),
            ..Default::default()
        };
        assert_eq!(query.limit(), 200);
        assert_eq!(query.offset(), 0);
        assert_eq!(AdminListQuery::default().limit(), 50);
    }

    #[test]
    fn test_in_range_or() {
        assert_eq!(in_range_or(Some("10"), 1, 20, 5), 10);
        assert_eq!(in_range_or(Some("21"), 1, 20, 5), 5);
        assert_eq!(in_range_or(Some("0"), 1, 20, 5), 5);
        assert_eq!(in_range_or(Some("x"), 1, 20, 5), 5);
        assert_eq!(in_range_or(None, 1, 20, 5), 5);
    }

    #[test]
    fn test_capped_or() {
        assert_eq!(capped_or(Some("30000"), 20000, 20000), 20000);
        assert_eq!(capped_or(Some("0"), 20000, 20000), 20000);
        assert_eq!(capped_or(Some("25"), 50, 20), 25);
        assert_eq!(capped_or(Some("-3"), 50, 20), 20);
    }

    #[test]
    fn test_sort_helpers() {
        const ALLOWED: &[(&str, &str)] = &[("symbol", "symbol"), ("cap", "market_cap")];
        assert_eq!(resolve_sort_column(Some("cap"), ALLOWED, "symbol"), "market_cap");
        assert_eq!(
            resolve_sort_column(Some("symbol; DROP TABLE"), ALLOWED, "symbol"),
            "symbol"
        );
        assert_eq!(SortOrder::parse_or(Some("DESC"), SortOrder::Asc), SortOrder::Desc);
        assert_eq!(SortOrder::parse_or(Some("up"), SortOrder::Asc), SortOrder::Asc);
    }

    #[test]
    fn test_split_csv() {
        assert_eq!(
            split_csv(Some(" Technology, ,Healthcare ,")),
            vec!["Technology".to_string(), "Healthcare".to_string()]
        );
        assert!(split_csv(None).is_empty());
    }

    proptest! {
        #[test]
        fn prop_admin_limit_never_exceeds_cap(raw in any::<i64>()) {
            let query = AdminListQuery { limit: Some(raw.to_string()), ..Default::default() };
            let limit = query.limit();
            prop_assert!((0..=ADMIN_MAX_LIMIT).contains(&limit));
        }

        #[test]
        fn prop_parse_query_int_non_negative(raw in ".*") {
            prop_assert!(parse_query_int(Some(&raw), 7) >= 0);
        }

        #[test]
        fn prop_in_range_or_stays_in_range(raw in any::<i64>()) {
            let v = in_range_or(Some(&raw.to_string()), 1, 20, 5);
            prop_assert!((1..=20).contains(&v));
        }
    }
}
