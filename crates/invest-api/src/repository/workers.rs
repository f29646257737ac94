//! 워커 계정 Repository.
//!
//! 워커는 `users.is_worker = TRUE`인 사용자입니다. 삭제는 플래그 해제로 처리하며
//! 사용자 행은 남겨 둡니다.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use utoipa::ToSchema;
use uuid::Uuid;

use super::decode_rows;

/// 마지막 활동 후 이 시간 안이면 온라인으로 봅니다.
pub const ONLINE_WINDOW_MINUTES: i64 = 5;

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct WorkerInfo {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub task_count: i64,
    #[sqlx(skip)]
    pub is_online: bool,
}

impl WorkerInfo {
    fn with_online_flag(mut self, now: DateTime<Utc>) -> Self {
        self.is_online = is_online(self.last_activity_at, now);
        self
    }
}

/// 마지막 활동 시각 기준 온라인 여부.
pub fn is_online(last_activity_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    last_activity_at
        .map(|at| now.signed_duration_since(at) < Duration::minutes(ONLINE_WINDOW_MINUTES))
        .unwrap_or(false)
}

pub struct WorkerRepository;

impl WorkerRepository {
    /// 활성 워커 목록 (가입 최신순).
    pub async fn list(pool: &PgPool) -> Result<Vec<WorkerInfo>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT u.id, u.email, COALESCE(u.full_name, '') AS full_name, \
             u.last_login_at, u.last_activity_at, u.created_at, \
             (SELECT COUNT(*) FROM worker_tasks wt WHERE wt.assigned_to = u.id) AS task_count \
             FROM users u \
             WHERE u.is_worker = TRUE AND u.is_active = TRUE \
             ORDER BY u.created_at DESC",
        )
        .fetch_all(pool)
        .await?;

        let now = Utc::now();
        Ok(decode_rows::<WorkerInfo>(rows, "worker")
            .into_iter()
            .map(|w| w.with_online_flag(now))
            .collect())
    }

    /// 워커 계정을 생성합니다. 이메일은 인증된 것으로 표시합니다.
    pub async fn register(
        pool: &PgPool,
        email: &str,
        password_hash: &str,
        full_name: &str,
    ) -> Result<WorkerInfo, sqlx::Error> {
        sqlx::query_as::<_, WorkerInfo>(
            "INSERT INTO users (email, password_hash, full_name, is_worker, email_verified) \
             VALUES ($1, $2, $3, TRUE, TRUE) \
             RETURNING id, email, COALESCE(full_name, '') AS full_name, \
             last_login_at, last_activity_at, created_at, 0::bigint AS task_count",
        )
        .bind(email)
        .bind(password_hash)
        .bind(full_name)
        .fetch_one(pool)
        .await
    }

    /// 워커 플래그를 해제합니다. 워커가 아니거나 없으면 `false`.
    pub async fn remove(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET is_worker = FALSE WHERE id = $1 AND is_worker = TRUE")
                .bind(id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_online_window() {
        let now = Utc::now();
        assert!(is_online(Some(now - Duration::minutes(4)), now));
        assert!(!is_online(Some(now - Duration::minutes(5)), now));
        assert!(!is_online(None, now));
    }
}
