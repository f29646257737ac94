//! 구독 도메인.
//!
//! 결제 주기, 구독 상태, 플랜 한도 검사를 다룹니다.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// 한도 값이 이 값이면 무제한.
pub const UNLIMITED: i32 = -1;

/// 결제 주기.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Yearly,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// 기간 시작 시각으로부터 종료 시각을 계산합니다.
    ///
    /// 월말 날짜는 다음 달의 마지막 날로 맞춰집니다 (1/31 → 2/28).
    pub fn period_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        let months = match self {
            Self::Monthly => Months::new(1),
            Self::Yearly => Months::new(12),
        };
        start.checked_add_months(months).unwrap_or(start)
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingPeriod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            _ => Err(CoreError::invalid_input(
                "invalid billing period: must be 'monthly' or 'yearly'",
            )),
        }
    }
}

/// 구독 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa-support", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    PastDue,
    Expired,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Canceled => "canceled",
            Self::PastDue => "past_due",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 플랜 한도 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    WatchLists,
    ItemsPerWatchList,
    AlertRules,
    HeatmapConfigs,
}

impl FromStr for LimitType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "watch_lists" => Ok(Self::WatchLists),
            "items_per_watch_list" => Ok(Self::ItemsPerWatchList),
            "alert_rules" => Ok(Self::AlertRules),
            "heatmap_configs" => Ok(Self::HeatmapConfigs),
            _ => Err(CoreError::invalid_input("invalid limit type")),
        }
    }
}

/// 현재 사용량이 한도 내에서 하나 더 추가 가능한지 확인합니다.
pub fn check_limit(max: i32, current: i64) -> bool {
    max == UNLIMITED || current < i64::from(max)
}
