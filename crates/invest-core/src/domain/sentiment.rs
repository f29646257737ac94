//! 소셜 감성 분석 쿼리 옵션.

use serde::{Deserialize, Serialize};

/// 트렌딩 조회 기간.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SentimentPeriod {
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
}

impl SentimentPeriod {
    /// 쿼리 문자열을 해석합니다. 알 수 없는 값은 24h.
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value {
            Some("7d") => Self::Week,
            _ => Self::Day,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "24h",
            Self::Week => "7d",
        }
    }

    /// 스냅샷 테이블의 `time_range` 값.
    pub fn time_range(&self) -> &'static str {
        match self {
            Self::Day => "1d",
            Self::Week => "7d",
        }
    }
}

/// 대표 게시물 정렬 옵션.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostSort {
    #[default]
    Recent,
    Engagement,
    Bullish,
    Bearish,
}

impl PostSort {
    pub fn parse_or_default(value: Option<&str>) -> Self {
        match value {
            Some("engagement") => Self::Engagement,
            Some("bullish") => Self::Bullish,
            Some("bearish") => Self::Bearish,
            _ => Self::Recent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recent => "recent",
            Self::Engagement => "engagement",
            Self::Bullish => "bullish",
            Self::Bearish => "bearish",
        }
    }

    /// 추가 WHERE 조건 (감성 필터).
    pub fn sentiment_filter(&self) -> Option<&'static str> {
        match self {
            Self::Bullish => Some("bullish"),
            Self::Bearish => Some("bearish"),
            _ => None,
        }
    }

    /// ORDER BY 절. 값은 고정 문자열이므로 SQL에 직접 삽입해도 안전합니다.
    pub fn order_by(&self) -> &'static str {
        match self {
            Self::Recent => "r.posted_at DESC",
            Self::Engagement => "(r.upvotes + r.comment_count * 2) DESC",
            Self::Bullish | Self::Bearish => "t.confidence DESC NULLS LAST, r.upvotes DESC",
        }
    }
}
