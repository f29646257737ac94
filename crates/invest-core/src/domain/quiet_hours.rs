//! 알림 방해 금지 시간.
//!
//! 사용자의 타임존에서 현재 시각이 [start, end) 구간에 속하는지 판단합니다.
//! start > end 이면 자정을 넘는 구간으로 해석합니다 (예: 22:00 ~ 08:00).

use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::error::CoreError;

/// 방해 금지 시간 설정.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuietHours {
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub timezone: Tz,
}

impl QuietHours {
    /// 저장된 문자열 값에서 생성합니다.
    ///
    /// 알 수 없는 타임존은 UTC로 대체합니다. 시각 형식 오류는 에러입니다.
    pub fn from_parts(
        enabled: bool,
        start: &str,
        end: &str,
        timezone: &str,
    ) -> Result<Self, CoreError> {
        let timezone = timezone.parse::<Tz>().unwrap_or_else(|_| {
            tracing::debug!(timezone, "Unknown quiet hours timezone, using UTC");
            Tz::UTC
        });

        Ok(Self {
            enabled,
            start: parse_time_of_day(start)?,
            end: parse_time_of_day(end)?,
            timezone,
        })
    }

    /// `now` 시점이 방해 금지 시간인지 확인합니다.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }

        let local = now.with_timezone(&self.timezone).time();
        if self.start < self.end {
            local >= self.start && local < self.end
        } else {
            local >= self.start || local < self.end
        }
    }
}

/// `HH:MM` 또는 `HH:MM:SS` 형식을 해석합니다.
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime, CoreError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| CoreError::TimeOfDay(value.to_string()))
}

/// 타임존 이름이 유효한지 확인합니다.
pub fn validate_timezone(name: &str) -> Result<Tz, CoreError> {
    name.parse::<Tz>()
        .map_err(|_| CoreError::Timezone(name.to_string()))
}
