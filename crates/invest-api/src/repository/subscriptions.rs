//! 구독 플랜, 사용자 구독, 결제 이력 Repository.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use utoipa::ToSchema;
use uuid::Uuid;

use invest_core::{check_limit, BillingPeriod, LimitType, SubscriptionStatus};

/// 구독이 없는 사용자에게 적용되는 플랜 이름.
pub const FREE_PLAN_NAME: &str = "free";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub price_monthly: Decimal,
    pub price_yearly: Decimal,
    pub max_watch_lists: i32,
    pub max_items_per_watch_list: i32,
    pub max_alert_rules: i32,
    pub max_heatmap_configs: i32,
    #[schema(value_type = Object)]
    pub features: serde_json::Value,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct UserSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: String,
    pub billing_period: String,
    pub started_at: DateTime<Utc>,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub next_payment_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 사용자 구독과 플랜 한도.
///
/// 구독 행이 없으면 free 플랜 기본값으로 채워지며 `subscription`은 null입니다.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserSubscriptionWithPlan {
    pub subscription: Option<UserSubscription>,
    pub user_id: Uuid,
    pub status: String,
    pub plan_name: String,
    pub plan_display_name: String,
    #[schema(value_type = Object)]
    pub plan_features: serde_json::Value,
    pub max_watch_lists: i32,
    pub max_items_per_watch_list: i32,
    pub max_alert_rules: i32,
    pub max_heatmap_configs: i32,
}

impl UserSubscriptionWithPlan {
    /// 구독 없는 사용자의 free 플랜 뷰.
    pub fn free(user_id: Uuid, plan: &SubscriptionPlan) -> Self {
        Self {
            subscription: None,
            user_id,
            status: SubscriptionStatus::Active.as_str().to_string(),
            plan_name: plan.name.clone(),
            plan_display_name: plan.display_name.clone(),
            plan_features: plan.features.clone(),
            max_watch_lists: plan.max_watch_lists,
            max_items_per_watch_list: plan.max_items_per_watch_list,
            max_alert_rules: plan.max_alert_rules,
            max_heatmap_configs: plan.max_heatmap_configs,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active.as_str()
    }

    pub fn limits(&self) -> SubscriptionLimits {
        SubscriptionLimits {
            max_watch_lists: self.max_watch_lists,
            max_items_per_watch_list: self.max_items_per_watch_list,
            max_alert_rules: self.max_alert_rules,
            max_heatmap_configs: self.max_heatmap_configs,
            features: self.plan_features.clone(),
        }
    }
}

/// 플랜 한도. -1은 무제한.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionLimits {
    pub max_watch_lists: i32,
    pub max_items_per_watch_list: i32,
    pub max_alert_rules: i32,
    pub max_heatmap_configs: i32,
    #[schema(value_type = Object)]
    pub features: serde_json::Value,
}

impl SubscriptionLimits {
    pub fn max_for(&self, limit: LimitType) -> i32 {
        match limit {
            LimitType::WatchLists => self.max_watch_lists,
            LimitType::ItemsPerWatchList => self.max_items_per_watch_list,
            LimitType::AlertRules => self.max_alert_rules,
            LimitType::HeatmapConfigs => self.max_heatmap_configs,
        }
    }

    /// 현재 사용량에서 하나 더 만들 수 있는지.
    pub fn allows(&self, limit: LimitType, current: i64) -> bool {
        check_limit(self.max_for(limit), current)
    }
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub payment_method: Option<String>,
    pub description: Option<String>,
    pub receipt_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 구독 부분 수정 값.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionChanges {
    pub plan_id: Option<Uuid>,
    pub billing_period: Option<BillingPeriod>,
    pub payment_method: Option<String>,
}

impl SubscriptionChanges {
    pub fn is_empty(&self) -> bool {
        self.plan_id.is_none() && self.billing_period.is_none() && self.payment_method.is_none()
    }
}

#[derive(FromRow)]
struct SubscriptionRow {
    #[sqlx(flatten)]
    subscription: UserSubscription,
    plan_name: String,
    plan_display_name: String,
    plan_features: serde_json::Value,
    max_watch_lists: i32,
    max_items_per_watch_list: i32,
    max_alert_rules: i32,
    max_heatmap_configs: i32,
}

const PLAN_COLUMNS: &str = "id, name, display_name, description, price_monthly, price_yearly, \
    max_watch_lists, max_items_per_watch_list, max_alert_rules, max_heatmap_configs, \
    features, is_active, created_at, updated_at";

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, status, billing_period, started_at, \
    current_period_start, current_period_end, canceled_at, ended_at, payment_method, \
    last_payment_date, next_payment_date, created_at, updated_at";

pub struct SubscriptionRepository;

impl SubscriptionRepository {
    /// 활성 플랜 (월 가격 오름차순).
    pub async fn list_plans(pool: &PgPool) -> Result<Vec<SubscriptionPlan>, sqlx::Error> {
        let sql = format!(
            "SELECT {PLAN_COLUMNS} FROM subscription_plans WHERE is_active = TRUE ORDER BY price_monthly ASC"
        );
        sqlx::query_as::<_, SubscriptionPlan>(&sql).fetch_all(pool).await
    }

    pub async fn find_plan(pool: &PgPool, id: Uuid) -> Result<Option<SubscriptionPlan>, sqlx::Error> {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM subscription_plans WHERE id = $1");
        sqlx::query_as::<_, SubscriptionPlan>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_plan_by_name(
        pool: &PgPool,
        name: &str,
    ) -> Result<Option<SubscriptionPlan>, sqlx::Error> {
        let sql = format!("SELECT {PLAN_COLUMNS} FROM subscription_plans WHERE name = $1");
        sqlx::query_as::<_, SubscriptionPlan>(&sql)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// 가장 최근 구독. 없으면 free 플랜 기본값.
    ///
    /// free 플랜 행도 없으면 `RowNotFound`.
    pub async fn current_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<UserSubscriptionWithPlan, sqlx::Error> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT us.id, us.user_id, us.plan_id, us.status, us.billing_period,
                   us.started_at, us.current_period_start, us.current_period_end,
                   us.canceled_at, us.ended_at, us.payment_method, us.last_payment_date,
                   us.next_payment_date, us.created_at, us.updated_at,
                   sp.name AS plan_name, sp.display_name AS plan_display_name,
                   sp.features AS plan_features, sp.max_watch_lists,
                   sp.max_items_per_watch_list, sp.max_alert_rules, sp.max_heatmap_configs
            FROM user_subscriptions us
            JOIN subscription_plans sp ON us.plan_id = sp.id
            WHERE us.user_id = $1
            ORDER BY us.created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        match row {
            Some(row) => Ok(UserSubscriptionWithPlan {
                user_id: row.subscription.user_id,
                status: row.subscription.status.clone(),
                subscription: Some(row.subscription),
                plan_name: row.plan_name,
                plan_display_name: row.plan_display_name,
                plan_features: row.plan_features,
                max_watch_lists: row.max_watch_lists,
                max_items_per_watch_list: row.max_items_per_watch_list,
                max_alert_rules: row.max_alert_rules,
                max_heatmap_configs: row.max_heatmap_configs,
            }),
            None => {
                let free = Self::find_plan_by_name(pool, FREE_PLAN_NAME)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                Ok(UserSubscriptionWithPlan::free(user_id, &free))
            }
        }
    }

    /// 활성 구독을 생성합니다. 다음 결제일은 기간 종료일과 같습니다.
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        plan_id: Uuid,
        billing_period: BillingPeriod,
        now: DateTime<Utc>,
    ) -> Result<UserSubscription, sqlx::Error> {
        let period_end = billing_period.period_end(now);
        let sql = format!(
            "INSERT INTO user_subscriptions \
             (user_id, plan_id, status, billing_period, current_period_start, current_period_end, next_payment_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) \
             RETURNING {SUBSCRIPTION_COLUMNS}"
        );
        sqlx::query_as::<_, UserSubscription>(&sql)
            .bind(user_id)
            .bind(plan_id)
            .bind(SubscriptionStatus::Active.as_str())
            .bind(billing_period.as_str())
            .bind(now)
            .bind(period_end)
            .fetch_one(pool)
            .await
    }

    /// 지정된 필드만 수정합니다. 대상이 없으면 `None`.
    pub async fn update(
        pool: &PgPool,
        subscription_id: Uuid,
        changes: &SubscriptionChanges,
    ) -> Result<Option<UserSubscription>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE user_subscriptions SET ");
        let mut set = builder.separated(", ");
        if let Some(plan_id) = changes.plan_id {
            set.push("plan_id = ").push_bind_unseparated(plan_id);
        }
        if let Some(period) = changes.billing_period {
            set.push("billing_period = ").push_bind_unseparated(period.as_str());
        }
        if let Some(method) = &changes.payment_method {
            set.push("payment_method = ").push_bind_unseparated(method.clone());
        }
        set.push("updated_at = NOW()");
        builder
            .push(" WHERE id = ")
            .push_bind(subscription_id)
            .push(format!(" RETURNING {SUBSCRIPTION_COLUMNS}"));

        builder
            .build_query_as::<UserSubscription>()
            .fetch_optional(pool)
            .await
    }

    /// 활성 구독을 취소합니다. 활성 구독이 없으면 `false`.
    pub async fn cancel(pool: &PgPool, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE user_subscriptions SET status = 'canceled', canceled_at = NOW(), updated_at = NOW() \
             WHERE user_id = $1 AND status = 'active'",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// 결제 이력 (최신순). `limit`이 없으면 전체.
    pub async fn payments(
        pool: &PgPool,
        user_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<PaymentRecord>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, user_id, subscription_id, amount, currency, status, payment_method, \
             description, receipt_url, created_at \
             FROM payment_history WHERE user_id = ",
        );
        builder.push_bind(user_id).push(" ORDER BY created_at DESC");
        if let Some(limit) = limit {
            builder.push(" LIMIT ").push_bind(limit);
        }
        builder.build_query_as::<PaymentRecord>().fetch_all(pool).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn free_plan() -> SubscriptionPlan {
        SubscriptionPlan {
            id: Uuid::nil(),
            name: FREE_PLAN_NAME.to_string(),
            display_name: "Free".to_string(),
            description: None,
            price_monthly: dec!(0),
            price_yearly: dec!(0),
            max_watch_lists: 3,
            max_items_per_watch_list: 10,
            max_alert_rules: 5,
            max_heatmap_configs: -1,
            features: serde_json::json!({"screener": true}),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_free_view_uses_plan_limits() {
        let user_id = Uuid::new_v4();
        let view = UserSubscriptionWithPlan::free(user_id, &free_plan());

        assert!(view.subscription.is_none());
        assert!(view.is_active());
        assert_eq!(view.plan_name, "free");

        let limits = view.limits();
        assert_eq!(limits.max_watch_lists, 3);
        assert_eq!(limits.max_heatmap_configs, -1);
        assert_eq!(limits.features["screener"], true);
    }

    #[test]
    fn test_limits_allow_until_max() {
        let limits = UserSubscriptionWithPlan::free(Uuid::new_v4(), &free_plan()).limits();
        assert!(limits.allows(LimitType::AlertRules, 4));
        assert!(!limits.allows(LimitType::AlertRules, 5));
        // -1은 무제한
        assert!(limits.allows(LimitType::HeatmapConfigs, 10_000));
    }

    #[test]
    fn test_prices_serialize_as_strings() {
        let mut plan = free_plan();
        plan.price_monthly = dec!(9.99);
        plan.price_yearly = dec!(99.90);

        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["price_monthly"], "9.99");
        assert_eq!(json["price_yearly"], "99.90");
    }
}
