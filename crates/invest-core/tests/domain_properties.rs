//! 도메인 헬퍼 속성 테스트

use chrono::{NaiveTime, TimeZone, Timelike, Utc};
use invest_core::{check_limit, QuietHours, UNLIMITED};
use proptest::prelude::*;

fn quiet(start: NaiveTime, end: NaiveTime) -> QuietHours {
    QuietHours {
        enabled: true,
        start,
        end,
        timezone: chrono_tz::Tz::UTC,
    }
}

proptest! {
    #[test]
    fn unlimited_always_allows(current in 0i64..i64::MAX) {
        prop_assert!(check_limit(UNLIMITED, current));
    }

    #[test]
    fn limit_allows_only_below_max(max in 0i32..1000, current in 0i64..2000) {
        prop_assert_eq!(check_limit(max, current), current < i64::from(max));
    }

    #[test]
    fn overnight_window_is_complement_of_day_window(
        start_h in 0u32..24,
        end_h in 0u32..24,
        now_h in 0u32..24,
        now_m in 0u32..60,
    ) {
        prop_assume!(start_h < end_h);
        let start = NaiveTime::from_hms_opt(start_h, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(end_h, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 15, now_h, now_m, 0).unwrap();

        // [start, end)와 [end, start)는 하루를 정확히 나눈다
        let day = quiet(start, end).contains(now);
        let night = quiet(end, start).contains(now);
        prop_assert_ne!(day, night);
        prop_assert_eq!(day, now.hour() >= start_h && now.hour() < end_h);
    }
}
