//! 관심 종목 알림 규칙의 유형과 발송 빈도.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// 알림 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    PriceAbove,
    PriceBelow,
    PriceChangePct,
    PriceChangeAmount,
    VolumeSpike,
    UnusualVolume,
    VolumeAbove,
    VolumeBelow,
    News,
    Earnings,
    Dividend,
    SecFiling,
    AnalystRating,
}

impl AlertType {
    pub const ALL: [AlertType; 13] = [
        Self::PriceAbove,
        Self::PriceBelow,
        Self::PriceChangePct,
        Self::PriceChangeAmount,
        Self::VolumeSpike,
        Self::UnusualVolume,
        Self::VolumeAbove,
        Self::VolumeBelow,
        Self::News,
        Self::Earnings,
        Self::Dividend,
        Self::SecFiling,
        Self::AnalystRating,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PriceAbove => "price_above",
            Self::PriceBelow => "price_below",
            Self::PriceChangePct => "price_change_pct",
            Self::PriceChangeAmount => "price_change_amount",
            Self::VolumeSpike => "volume_spike",
            Self::UnusualVolume => "unusual_volume",
            Self::VolumeAbove => "volume_above",
            Self::VolumeBelow => "volume_below",
            Self::News => "news",
            Self::Earnings => "earnings",
            Self::Dividend => "dividend",
            Self::SecFiling => "sec_filing",
            Self::AnalystRating => "analyst_rating",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::invalid_input("invalid alert type"))
    }
}

/// 알림 발송 빈도.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AlertFrequency {
    /// 한 번 발송 후 비활성화
    Once,
    Daily,
    Always,
}

impl AlertFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Daily => "daily",
            Self::Always => "always",
        }
    }
}

impl fmt::Display for AlertFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertFrequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "once" => Ok(Self::Once),
            "daily" => Ok(Self::Daily),
            "always" => Ok(Self::Always),
            _ => Err(CoreError::invalid_input(
                "invalid frequency: must be 'once', 'daily', or 'always'",
            )),
        }
    }
}
