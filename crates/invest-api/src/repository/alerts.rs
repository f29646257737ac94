//! 알림 규칙과 발동 기록 Repository.
//!
//! 모든 쿼리는 `user_id` 조건을 포함하므로 다른 사용자의 규칙/기록은
//! "없음"으로 보입니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use utoipa::ToSchema;
use uuid::Uuid;

use invest_core::{AlertFrequency, AlertType};

use super::decode_rows;

/// 발동 기록 기본 개수.
pub const ALERT_LOG_DEFAULT_LIMIT: i64 = 50;
/// 발동 기록 최대 개수.
pub const ALERT_LOG_MAX_LIMIT: i64 = 500;

/// 알림 규칙.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AlertRule {
    pub id: Uuid,
    pub user_id: Uuid,
    pub watch_list_id: Option<Uuid>,
    pub watch_list_item_id: Option<Uuid>,
    pub symbol: String,
    pub alert_type: String,
    #[schema(value_type = Object)]
    pub conditions: serde_json::Value,
    pub is_active: bool,
    pub frequency: String,
    pub notify_email: bool,
    pub notify_in_app: bool,
    pub name: Option<String>,
    pub description: Option<String>,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub trigger_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 관심 목록 이름과 회사명을 붙인 규칙.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AlertRuleWithDetails {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub rule: AlertRule,
    pub watch_list_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub company_name: String,
}

/// 알림 발동 기록.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct AlertLog {
    pub id: Uuid,
    pub alert_rule_id: Uuid,
    pub user_id: Uuid,
    pub symbol: String,
    pub triggered_at: DateTime<Utc>,
    pub alert_type: String,
    #[schema(value_type = Option<Object>)]
    pub condition_met: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub market_data: Option<serde_json::Value>,
    pub notification_sent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_error: Option<String>,
    pub is_read: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
    pub is_dismissed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dismissed_at: Option<DateTime<Utc>>,
    pub rule_name: Option<String>,
}

/// 새 규칙. 생성 시 항상 활성 상태입니다.
#[derive(Debug, Clone)]
pub struct NewAlertRule {
    pub watch_list_id: Uuid,
    pub symbol: String,
    pub alert_type: AlertType,
    pub conditions: serde_json::Value,
    pub name: String,
    pub description: Option<String>,
    pub frequency: AlertFrequency,
    pub notify_email: bool,
    pub notify_in_app: bool,
}

/// 규칙 부분 변경. `None` 필드는 유지됩니다.
#[derive(Debug, Clone, Default)]
pub struct AlertRuleChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub conditions: Option<serde_json::Value>,
    pub is_active: Option<bool>,
    pub frequency: Option<AlertFrequency>,
    pub notify_email: Option<bool>,
    pub notify_in_app: Option<bool>,
}

impl AlertRuleChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.conditions.is_none()
            && self.is_active.is_none()
            && self.frequency.is_none()
            && self.notify_email.is_none()
            && self.notify_in_app.is_none()
    }
}

/// 발동 기록 조회 조건.
#[derive(Debug, Clone)]
pub struct AlertLogFilter {
    pub alert_rule_id: Option<Uuid>,
    pub symbol: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

const RULE_COLUMNS: &str = "id, user_id, watch_list_id, watch_list_item_id, symbol, alert_type, \
    conditions, is_active, frequency, notify_email, notify_in_app, \
    name, description, last_triggered_at, trigger_count, created_at, updated_at";

pub struct AlertRepository;

impl AlertRepository {
    /// 사용자 규칙 목록 (생성 최신순).
    pub async fn list(
        pool: &PgPool,
        user_id: Uuid,
        watch_list_id: Option<Uuid>,
        is_active: Option<bool>,
    ) -> Result<Vec<AlertRuleWithDetails>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT ar.id, ar.user_id, ar.watch_list_id, ar.watch_list_item_id, ar.symbol, \
             ar.alert_type, ar.conditions, ar.is_active, ar.frequency, ar.notify_email, \
             ar.notify_in_app, ar.name, ar.description, ar.last_triggered_at, \
             ar.trigger_count, ar.created_at, ar.updated_at, \
             wl.name AS watch_list_name, COALESCE(t.name, '') AS company_name \
             FROM alert_rules ar \
             JOIN watch_lists wl ON ar.watch_list_id = wl.id \
             LEFT JOIN tickers t ON ar.symbol = t.symbol \
             WHERE ar.user_id = ",
        );
        builder.push_bind(user_id);
        if let Some(watch_list_id) = watch_list_id {
            builder.push(" AND ar.watch_list_id = ").push_bind(watch_list_id);
        }
        if let Some(is_active) = is_active {
            builder.push(" AND ar.is_active = ").push_bind(is_active);
        }
        builder.push(" ORDER BY ar.created_at DESC");

        let rows = builder.build().fetch_all(pool).await?;
        Ok(decode_rows(rows, "alert rule"))
    }

    pub async fn find(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Option<AlertRule>, sqlx::Error> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM alert_rules WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, AlertRule>(&sql)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// 관심 목록의 규칙 (생성 최신순).
    pub async fn for_watch_list(
        pool: &PgPool,
        watch_list_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<AlertRule>, sqlx::Error> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM alert_rules WHERE watch_list_id = $1 AND user_id = $2 \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&sql)
            .bind(watch_list_id)
            .bind(user_id)
            .fetch_all(pool)
            .await?;
        Ok(decode_rows(rows, "alert rule"))
    }

    pub async fn count_for_user(pool: &PgPool, user_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM alert_rules WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(pool)
            .await
    }

    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        rule: &NewAlertRule,
    ) -> Result<AlertRule, sqlx::Error> {
        let sql = format!(
            "INSERT INTO alert_rules \
             (user_id, watch_list_id, symbol, alert_type, conditions, is_active, frequency, \
              notify_email, notify_in_app, name, description) \
             VALUES ($1, $2, $3, $4, $5, TRUE, $6, $7, $8, $9, $10) \
             RETURNING {RULE_COLUMNS}"
        );
        sqlx::query_as::<_, AlertRule>(&sql)
            .bind(user_id)
            .bind(rule.watch_list_id)
            .bind(&rule.symbol)
            .bind(rule.alert_type.as_str())
            .bind(&rule.conditions)
            .bind(rule.frequency.as_str())
            .bind(rule.notify_email)
            .bind(rule.notify_in_app)
            .bind(&rule.name)
            .bind(&rule.description)
            .fetch_one(pool)
            .await
    }

    /// 부분 변경. 규칙이 없거나 남의 것이면 `None`.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        user_id: Uuid,
        changes: &AlertRuleChanges,
    ) -> Result<Option<AlertRule>, sqlx::Error> {
        let sql = format!(
            "UPDATE alert_rules SET \
                name = COALESCE($3, name), \
                description = COALESCE($4, description), \
                conditions = COALESCE($5, conditions), \
                is_active = COALESCE($6, is_active), \
                frequency = COALESCE($7, frequency), \
                notify_email = COALESCE($8, notify_email), \
                notify_in_app = COALESCE($9, notify_in_app), \
                updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING {RULE_COLUMNS}"
        );
        sqlx::query_as::<_, AlertRule>(&sql)
            .bind(id)
            .bind(user_id)
            .bind(&changes.name)
            .bind(&changes.description)
            .bind(&changes.conditions)
            .bind(changes.is_active)
            .bind(changes.frequency.map(|f| f.as_str()))
            .bind(changes.notify_email)
            .bind(changes.notify_in_app)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM alert_rules WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== 발동 기록 ====================

    /// 발동 기록 (발동 최신순).
    pub async fn list_logs(
        pool: &PgPool,
        user_id: Uuid,
        filter: &AlertLogFilter,
    ) -> Result<Vec<AlertLog>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT al.id, al.alert_rule_id, al.user_id, al.symbol, al.triggered_at, \
             al.alert_type, al.condition_met, al.market_data, al.notification_sent, \
             al.notification_sent_at, al.notification_error, al.is_read, al.read_at, \
             al.is_dismissed, al.dismissed_at, ar.name AS rule_name \
             FROM alert_logs al \
             JOIN alert_rules ar ON al.alert_rule_id = ar.id \
             WHERE al.user_id = ",
        );
        builder.push_bind(user_id);
        if let Some(rule_id) = filter.alert_rule_id {
            builder.push(" AND al.alert_rule_id = ").push_bind(rule_id);
        }
        if let Some(symbol) = &filter.symbol {
            builder.push(" AND al.symbol = ").push_bind(symbol);
        }
        builder
            .push(" ORDER BY al.triggered_at DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = builder.build().fetch_all(pool).await?;
        Ok(decode_rows(rows, "alert log"))
    }

    pub async fn mark_log_read(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE alert_logs SET is_read = TRUE, read_at = NOW() WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn dismiss_log(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE alert_logs SET is_dismissed = TRUE, dismissed_at = NOW() \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changes_is_empty() {
        assert!(AlertRuleChanges::default().is_empty());
        let changes = AlertRuleChanges {
            is_active: Some(false),
            ..Default::default()
        };
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_details_flatten_and_hide_empty_company() {
        let now = Utc::now();
        let details = AlertRuleWithDetails {
            rule: AlertRule {
                id: Uuid::nil(),
                user_id: Uuid::nil(),
                watch_list_id: Some(Uuid::nil()),
                watch_list_item_id: None,
                symbol: "TSLA".into(),
                alert_type: "price_below".into(),
                conditions: serde_json::json!({ "threshold": 150 }),
                is_active: true,
                frequency: "daily".into(),
                notify_email: true,
                notify_in_app: true,
                name: Some("TSLA dip".into()),
                description: None,
                last_triggered_at: None,
                trigger_count: 0,
                created_at: now,
                updated_at: now,
            },
            watch_list_name: "Core".into(),
            company_name: String::new(),
        };

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["symbol"], "TSLA");
        assert_eq!(json["watch_list_name"], "Core");
        assert!(json.get("company_name").is_none());
        assert_eq!(json["conditions"]["threshold"], 150);
    }
}
