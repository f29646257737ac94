//! 작업 유형 Repository.
//!
//! 작업 유형은 이름, 표시 라벨, 작업 절차(SOP), 파라미터 스키마를 가집니다.
//! 삭제는 `is_active = FALSE`로 처리합니다.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use utoipa::ToSchema;

use super::decode_rows;

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct TaskType {
    pub id: i32,
    pub name: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sop: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub param_schema: Option<serde_json::Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 작업 유형 이름 규칙: 소문자, 숫자, 밑줄 1~100자.
pub fn is_valid_task_type_name(name: &str) -> bool {
    (1..=100).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

const TASK_TYPE_COLUMNS: &str =
    "id, name, label, NULLIF(sop, '') AS sop, param_schema, is_active, created_at, updated_at";

pub struct TaskTypeRepository;

impl TaskTypeRepository {
    /// 활성 작업 유형 (이름순).
    pub async fn list_active(pool: &PgPool) -> Result<Vec<TaskType>, sqlx::Error> {
        let sql = format!(
            "SELECT {TASK_TYPE_COLUMNS} FROM task_types WHERE is_active = TRUE ORDER BY name ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(pool).await?;
        Ok(decode_rows(rows, "task type"))
    }

    pub async fn find_active(pool: &PgPool, id: i32) -> Result<Option<TaskType>, sqlx::Error> {
        let sql =
            format!("SELECT {TASK_TYPE_COLUMNS} FROM task_types WHERE id = $1 AND is_active = TRUE");
        sqlx::query_as::<_, TaskType>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(
        pool: &PgPool,
        name: &str,
        label: &str,
        sop: &str,
        param_schema: Option<&serde_json::Value>,
    ) -> Result<TaskType, sqlx::Error> {
        let sql = format!(
            "INSERT INTO task_types (name, label, sop, param_schema) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {TASK_TYPE_COLUMNS}"
        );
        sqlx::query_as::<_, TaskType>(&sql)
            .bind(name)
            .bind(label)
            .bind(sop)
            .bind(param_schema)
            .fetch_one(pool)
            .await
    }

    /// 활성 유형의 라벨, SOP, 스키마를 부분 변경합니다.
    pub async fn update(
        pool: &PgPool,
        id: i32,
        label: Option<&str>,
        sop: Option<&str>,
        param_schema: Option<&serde_json::Value>,
    ) -> Result<Option<TaskType>, sqlx::Error> {
        let sql = format!(
            "UPDATE task_types SET \
                label = COALESCE($2, label), \
                sop = COALESCE($3, sop), \
                param_schema = COALESCE($4, param_schema), \
                updated_at = NOW() \
             WHERE id = $1 AND is_active = TRUE \
             RETURNING {TASK_TYPE_COLUMNS}"
        );
        sqlx::query_as::<_, TaskType>(&sql)
            .bind(id)
            .bind(label)
            .bind(sop)
            .bind(param_schema)
            .fetch_optional(pool)
            .await
    }

    pub async fn deactivate(pool: &PgPool, id: i32) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE task_types SET is_active = FALSE WHERE id = $1 AND is_active = TRUE")
                .bind(id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}
