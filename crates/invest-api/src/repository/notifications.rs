//! 인앱 알림과 알림 설정 Repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use invest_core::{CoreError, QuietHours};

use super::decode_rows;

/// 알림 목록 기본 개수.
pub const DEFAULT_NOTIFICATION_LIMIT: i64 = 50;

/// 인앱 알림.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct InAppNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_log_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    pub is_dismissed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dismissed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// 사용자 알림 설정.
///
/// 시각 컬럼은 `HH:MM:SS` 문자열로 읽습니다.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct NotificationPreferences {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_address: Option<String>,
    pub email_verified: bool,
    pub price_alerts_enabled: bool,
    pub volume_alerts_enabled: bool,
    pub news_alerts_enabled: bool,
    pub earnings_alerts_enabled: bool,
    pub sec_filing_alerts_enabled: bool,
    pub daily_digest_enabled: bool,
    pub daily_digest_time: String,
    pub weekly_digest_enabled: bool,
    pub weekly_digest_day: i32,
    pub weekly_digest_time: String,
    pub digest_include_portfolio_summary: bool,
    pub digest_include_top_movers: bool,
    pub digest_include_recent_alerts: bool,
    pub digest_include_news_highlights: bool,
    pub quiet_hours_enabled: bool,
    pub quiet_hours_start: String,
    pub quiet_hours_end: String,
    pub quiet_hours_timezone: String,
    pub max_alerts_per_day: i32,
    pub max_emails_per_day: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreferences {
    /// 저장된 방해 금지 시간 설정.
    pub fn quiet_hours(&self) -> Result<QuietHours, CoreError> {
        QuietHours::from_parts(
            self.quiet_hours_enabled,
            &self.quiet_hours_start,
            &self.quiet_hours_end,
            &self.quiet_hours_timezone,
        )
    }

    /// `now`가 방해 금지 시간인지 확인합니다. 설정을 해석할 수 없으면 `false`.
    pub fn is_in_quiet_hours(&self, now: DateTime<Utc>) -> bool {
        match self.quiet_hours() {
            Ok(quiet) => quiet.contains(now),
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "Invalid quiet hours settings");
                false
            }
        }
    }
}

/// 알림 설정 부분 변경. `None` 필드는 유지됩니다.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct PreferenceChanges {
    pub email_enabled: Option<bool>,
    #[validate(email(message = "Invalid email address"), length(max = 254))]
    pub email_address: Option<String>,
    pub price_alerts_enabled: Option<bool>,
    pub volume_alerts_enabled: Option<bool>,
    pub news_alerts_enabled: Option<bool>,
    pub earnings_alerts_enabled: Option<bool>,
    pub sec_filing_alerts_enabled: Option<bool>,
    pub daily_digest_enabled: Option<bool>,
    #[validate(length(max = 10))]
    pub daily_digest_time: Option<String>,
    pub weekly_digest_enabled: Option<bool>,
    #[validate(range(min = 0, max = 6, message = "weekly_digest_day must be between 0 and 6"))]
    pub weekly_digest_day: Option<i32>,
    #[validate(length(max = 10))]
    pub weekly_digest_time: Option<String>,
    pub digest_include_portfolio_summary: Option<bool>,
    pub digest_include_top_movers: Option<bool>,
    pub digest_include_recent_alerts: Option<bool>,
    pub digest_include_news_highlights: Option<bool>,
    pub quiet_hours_enabled: Option<bool>,
    #[validate(length(max = 10))]
    pub quiet_hours_start: Option<String>,
    #[validate(length(max = 10))]
    pub quiet_hours_end: Option<String>,
    #[validate(length(max = 100))]
    pub quiet_hours_timezone: Option<String>,
}

impl PreferenceChanges {
    fn bool_fields(&self) -> [(&'static str, Option<bool>); 12] {
        [
            ("email_enabled", self.email_enabled),
            ("price_alerts_enabled", self.price_alerts_enabled),
            ("volume_alerts_enabled", self.volume_alerts_enabled),
            ("news_alerts_enabled", self.news_alerts_enabled),
            ("earnings_alerts_enabled", self.earnings_alerts_enabled),
            ("sec_filing_alerts_enabled", self.sec_filing_alerts_enabled),
            ("daily_digest_enabled", self.daily_digest_enabled),
            ("weekly_digest_enabled", self.weekly_digest_enabled),
            ("digest_include_portfolio_summary", self.digest_include_portfolio_summary),
            ("digest_include_top_movers", self.digest_include_top_movers),
            ("digest_include_recent_alerts", self.digest_include_recent_alerts),
            ("digest_include_news_highlights", self.digest_include_news_highlights),
        ]
    }

    fn time_fields(&self) -> [(&'static str, Option<&String>); 4] {
        [
            ("daily_digest_time", self.daily_digest_time.as_ref()),
            ("weekly_digest_time", self.weekly_digest_time.as_ref()),
            ("quiet_hours_start", self.quiet_hours_start.as_ref()),
            ("quiet_hours_end", self.quiet_hours_end.as_ref()),
        ]
    }

    /// 변경할 필드가 없는지.
    pub fn is_empty(&self) -> bool {
        self.bool_fields().iter().all(|(_, v)| v.is_none())
            && self.time_fields().iter().all(|(_, v)| v.is_none())
            && self.email_address.is_none()
            && self.weekly_digest_day.is_none()
            && self.quiet_hours_enabled.is_none()
            && self.quiet_hours_timezone.is_none()
    }

    /// 시각과 타임존 형식을 확인합니다.
    pub fn check_formats(&self) -> Result<(), CoreError> {
        for (_, value) in self.time_fields() {
            if let Some(value) = value {
                invest_core::parse_time_of_day(value)?;
            }
        }
        if let Some(tz) = &self.quiet_hours_timezone {
            invest_core::validate_timezone(tz)?;
        }
        Ok(())
    }
}

const NOTIFICATION_COLUMNS: &str = "id, user_id, alert_log_id, type AS notification_type, title, message, \
    metadata, is_read, read_at, is_dismissed, dismissed_at, created_at, expires_at";

const PREFERENCE_COLUMNS: &str = "id, user_id, email_enabled, email_address, email_verified, \
    price_alerts_enabled, volume_alerts_enabled, news_alerts_enabled, \
    earnings_alerts_enabled, sec_filing_alerts_enabled, \
    daily_digest_enabled, daily_digest_time::text AS daily_digest_time, \
    weekly_digest_enabled, weekly_digest_day::int4 AS weekly_digest_day, \
    weekly_digest_time::text AS weekly_digest_time, \
    digest_include_portfolio_summary, digest_include_top_movers, \
    digest_include_recent_alerts, digest_include_news_highlights, \
    quiet_hours_enabled, quiet_hours_start::text AS quiet_hours_start, \
    quiet_hours_end::text AS quiet_hours_end, quiet_hours_timezone, \
    max_alerts_per_day::int4 AS max_alerts_per_day, \
    max_emails_per_day::int4 AS max_emails_per_day, created_at, updated_at";

pub struct NotificationRepository;

impl NotificationRepository {
    /// 최신순 알림 목록. `unread_only`면 읽지 않고 닫지 않은 알림만.
    pub async fn list(
        pool: &PgPool,
        user_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<InAppNotification>, sqlx::Error> {
        let filter = if unread_only {
            " AND is_read = FALSE AND is_dismissed = FALSE"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notification_queue \
             WHERE user_id = $1{filter} \
             ORDER BY created_at DESC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(pool)
            .await?;
        Ok(decode_rows(rows, "notification"))
    }

    pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification_queue \
             WHERE user_id = $1 AND is_read = FALSE AND is_dismissed = FALSE",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    /// 본인 알림이 아니거나 없으면 `false`.
    pub async fn mark_read(
        pool: &PgPool,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_queue SET is_read = TRUE, read_at = NOW() \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 갱신된 알림 수를 반환합니다.
    pub async fn mark_all_read(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_queue SET is_read = TRUE, read_at = NOW() \
             WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn dismiss(
        pool: &PgPool,
        notification_id: Uuid,
        user_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notification_queue SET is_dismissed = TRUE, dismissed_at = NOW() \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(notification_id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_preferences(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Option<NotificationPreferences>, sqlx::Error> {
        let sql = format!("SELECT {PREFERENCE_COLUMNS} FROM notification_preferences WHERE user_id = $1");
        sqlx::query_as::<_, NotificationPreferences>(&sql)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// 설정을 부분 변경합니다. 이메일 주소를 바꾸면 인증 상태가 초기화됩니다.
    ///
    /// 호출자는 `changes`가 비어 있지 않음을 먼저 확인해야 합니다.
    pub async fn update_preferences(
        pool: &PgPool,
        user_id: Uuid,
        changes: &PreferenceChanges,
    ) -> Result<Option<NotificationPreferences>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("UPDATE notification_preferences SET ");
        let mut set = builder.separated(", ");

        for (column, value) in changes.bool_fields() {
            if let Some(value) = value {
                set.push(format!("{column} = ")).push_bind_unseparated(value);
            }
        }
        if let Some(email) = &changes.email_address {
            set.push("email_address = ").push_bind_unseparated(email.clone());
            set.push("email_verified = FALSE");
        }
        if let Some(day) = changes.weekly_digest_day {
            set.push("weekly_digest_day = ").push_bind_unseparated(day);
        }
        for (column, value) in changes.time_fields() {
            if let Some(value) = value {
                set.push(format!("{column} = "))
                    .push_bind_unseparated(value.clone())
                    .push_unseparated("::time");
            }
        }
        if let Some(enabled) = changes.quiet_hours_enabled {
            set.push("quiet_hours_enabled = ").push_bind_unseparated(enabled);
        }
        if let Some(tz) = &changes.quiet_hours_timezone {
            set.push("quiet_hours_timezone = ").push_bind_unseparated(tz.clone());
        }
        set.push("updated_at = NOW()");

        builder
            .push(" WHERE user_id = ")
            .push_bind(user_id)
            .push(format!(" RETURNING {PREFERENCE_COLUMNS}"));

        builder
            .build_query_as::<NotificationPreferences>()
            .fetch_optional(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn prefs() -> NotificationPreferences {
        let now = Utc::now();
        NotificationPreferences {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            email_enabled: true,
            email_address: None,
            email_verified: false,
            price_alerts_enabled: true,
            volume_alerts_enabled: true,
            news_alerts_enabled: false,
            earnings_alerts_enabled: false,
            sec_filing_alerts_enabled: false,
            daily_digest_enabled: false,
            daily_digest_time: "09:00:00".into(),
            weekly_digest_enabled: false,
            weekly_digest_day: 1,
            weekly_digest_time: "09:00:00".into(),
            digest_include_portfolio_summary: true,
            digest_include_top_movers: true,
            digest_include_recent_alerts: true,
            digest_include_news_highlights: true,
            quiet_hours_enabled: true,
            quiet_hours_start: "22:00:00".into(),
            quiet_hours_end: "08:00:00".into(),
            quiet_hours_timezone: "America/New_York".into(),
            max_alerts_per_day: 50,
            max_emails_per_day: 10,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_quiet_hours_in_user_timezone() {
        let p = prefs();
        // 03:00 UTC = 23:00 EDT
        assert!(p.is_in_quiet_hours(Utc.with_ymd_and_hms(2025, 6, 3, 3, 0, 0).unwrap()));
        // 16:00 UTC = 12:00 EDT
        assert!(!p.is_in_quiet_hours(Utc.with_ymd_and_hms(2025, 6, 3, 16, 0, 0).unwrap()));
    }

    #[test]
    fn test_malformed_quiet_hours_are_not_quiet() {
        let mut p = prefs();
        p.quiet_hours_start = "late".into();
        assert!(!p.is_in_quiet_hours(Utc.with_ymd_and_hms(2025, 6, 3, 3, 0, 0).unwrap()));
    }

    #[test]
    fn test_empty_changes() {
        assert!(PreferenceChanges::default().is_empty());
        let changes = PreferenceChanges {
            weekly_digest_day: Some(3),
            ..Default::default()
        };
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_change_validation() {
        let changes = PreferenceChanges {
            email_address: Some("not-an-email".into()),
            weekly_digest_day: Some(9),
            ..Default::default()
        };
        let errors = changes.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email_address"));
        assert!(errors.field_errors().contains_key("weekly_digest_day"));

        let bad_time = PreferenceChanges {
            quiet_hours_start: Some("25:99".into()),
            ..Default::default()
        };
        assert!(bad_time.check_formats().is_err());

        let bad_tz = PreferenceChanges {
            quiet_hours_timezone: Some("Mars/Olympus".into()),
            ..Default::default()
        };
        assert!(bad_tz.check_formats().is_err());
    }

    #[test]
    fn test_notification_serializes_type_field() {
        let n = InAppNotification {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            alert_log_id: None,
            notification_type: "price_alert".into(),
            title: "AAPL above 200".into(),
            message: "Price crossed".into(),
            metadata: None,
            is_read: false,
            read_at: None,
            is_dismissed: false,
            dismissed_at: None,
            created_at: Utc::now(),
            expires_at: None,
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "price_alert");
        assert!(json.get("read_at").is_none());
        assert!(json.get("alert_log_id").is_none());
    }
}
