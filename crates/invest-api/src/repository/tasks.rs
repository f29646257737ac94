//! 워커 작업 큐 Repository.
//!
//! 관리자용 쿼리는 모든 작업을, 워커용 쿼리(`*_assigned`)는 본인에게 배정된
//! 작업만 다룹니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, FromRow, PgPool, Postgres, QueryBuilder};
use utoipa::ToSchema;
use uuid::Uuid;

use invest_core::{TaskPriority, TaskStatus};

use super::decode_rows;

/// 수집 데이터 목록 기본 개수.
pub const TASK_DATA_DEFAULT_LIMIT: i64 = 100;
/// 수집 데이터 목록 최대 개수.
pub const TASK_DATA_MAX_LIMIT: i64 = 1000;

/// 작업에 연결된 작업 유형 요약.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TaskTypeRef {
    pub id: i32,
    pub name: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sop: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct WorkerTask {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub assigned_to: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to_name: Option<String>,
    pub status: String,
    pub priority: String,
    pub task_type_id: Option<i32>,
    #[schema(value_type = Option<Object>)]
    pub params: Option<serde_json::Value>,
    #[schema(value_type = Option<Object>)]
    pub result: Option<serde_json::Value>,
    pub created_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskTypeRef>,
}

/// 작업 유형 LEFT JOIN 결과를 포함한 행.
#[derive(FromRow)]
struct TaskWithTypeRow {
    #[sqlx(flatten)]
    task: WorkerTask,
    tt_id: Option<i32>,
    tt_name: Option<String>,
    tt_label: Option<String>,
    tt_sop: Option<String>,
}

impl From<TaskWithTypeRow> for WorkerTask {
    fn from(row: TaskWithTypeRow) -> Self {
        let mut task = row.task;
        if let (Some(id), Some(name)) = (row.tt_id, row.tt_name) {
            task.task_type = Some(TaskTypeRef {
                id,
                label: row.tt_label.unwrap_or_else(|| name.clone()),
                name,
                sop: row.tt_sop.filter(|s| !s.is_empty()),
            });
        }
        task
    }
}

/// 작업 진행 기록.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct TaskUpdate {
    pub id: Uuid,
    pub task_id: Uuid,
    pub content: String,
    pub created_by: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 새 작업.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub assigned_to: Option<Uuid>,
    pub priority: TaskPriority,
    pub task_type_id: Option<i32>,
    pub params: Option<serde_json::Value>,
}

/// 작업 부분 변경. `None` 필드는 유지됩니다.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
}

/// 워커가 올리는 수집 데이터 한 건.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskDataItem {
    pub ticker: Option<String>,
    /// 같은 `data_type` 안에서 중복 제거 키
    pub external_id: Option<String>,
    pub collected_at: Option<DateTime<Utc>>,
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct TaskDataRow {
    pub id: i64,
    pub task_id: Uuid,
    pub data_type: String,
    pub ticker: Option<String>,
    pub external_id: Option<String>,
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
    pub collected_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// 수집 데이터 목록 필터.
#[derive(Debug, Clone, Default)]
pub struct TaskDataFilter {
    pub data_type: Option<String>,
    pub ticker: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

/// 일괄 입력 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct BulkInsertOutcome {
    pub inserted: usize,
    pub skipped: usize,
}

const TASK_COLUMNS: &str = "t.id, t.title, COALESCE(t.description, '') AS description, \
    t.assigned_to, t.status, t.priority, t.task_type_id, t.params, t.result, \
    t.created_by, t.created_at, t.updated_at, t.started_at, t.completed_at";

/// `RETURNING`용 (별칭 없음).
const RETURNING_COLUMNS: &str = "id, title, COALESCE(description, '') AS description, \
    assigned_to, status, priority, task_type_id, params, result, \
    created_by, created_at, updated_at, started_at, completed_at, \
    NULL::text AS assigned_to_name, NULL::text AS created_by_name";

fn priority_order() -> String {
    format!("{}, t.created_at DESC", TaskPriority::order_by_case("t.priority"))
}

pub struct TaskRepository;

impl TaskRepository {
    // ==================== 관리자 ====================

    /// 작업 목록. 우선순위(urgent 먼저), 생성 최신순.
    pub async fn list(
        pool: &PgPool,
        status: Option<TaskStatus>,
        assigned_to: Option<Uuid>,
    ) -> Result<Vec<WorkerTask>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {TASK_COLUMNS}, a.full_name AS assigned_to_name, cr.full_name AS created_by_name \
             FROM worker_tasks t \
             LEFT JOIN users a ON t.assigned_to = a.id \
             LEFT JOIN users cr ON t.created_by = cr.id \
             WHERE 1=1"
        ));
        if let Some(status) = status {
            builder.push(" AND t.status = ").push_bind(status.as_str());
        }
        if let Some(assigned_to) = assigned_to {
            builder.push(" AND t.assigned_to = ").push_bind(assigned_to);
        }
        builder.push(" ORDER BY ").push(priority_order());

        let rows = builder.build().fetch_all(pool).await?;
        Ok(decode_rows(rows, "worker task"))
    }

    pub async fn find(pool: &PgPool, id: Uuid) -> Result<Option<WorkerTask>, sqlx::Error> {
        let sql = format!(
            "SELECT {TASK_COLUMNS}, a.full_name AS assigned_to_name, cr.full_name AS created_by_name, \
             tt.id AS tt_id, tt.name AS tt_name, tt.label AS tt_label, tt.sop AS tt_sop \
             FROM worker_tasks t \
             LEFT JOIN users a ON t.assigned_to = a.id \
             LEFT JOIN users cr ON t.created_by = cr.id \
             LEFT JOIN task_types tt ON t.task_type_id = tt.id \
             WHERE t.id = $1"
        );
        let row = sqlx::query_as::<_, TaskWithTypeRow>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(WorkerTask::from))
    }

    pub async fn create(
        pool: &PgPool,
        task: &NewTask,
        created_by: Uuid,
    ) -> Result<WorkerTask, sqlx::Error> {
        let sql = format!(
            "INSERT INTO worker_tasks (title, description, assigned_to, priority, task_type_id, params, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {RETURNING_COLUMNS}"
        );
        sqlx::query_as::<_, WorkerTask>(&sql)
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.assigned_to)
            .bind(task.priority.as_str())
            .bind(task.task_type_id)
            .bind(&task.params)
            .bind(created_by)
            .fetch_one(pool)
            .await
    }

    /// 부분 변경. 작업이 없으면 `None`.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        changes: &TaskChanges,
    ) -> Result<Option<WorkerTask>, sqlx::Error> {
        let sql = format!(
            "UPDATE worker_tasks SET \
                title = COALESCE($2, title), \
                description = COALESCE($3, description), \
                assigned_to = COALESCE($4, assigned_to), \
                status = COALESCE($5, status), \
                priority = COALESCE($6, priority), \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {RETURNING_COLUMNS}"
        );
        sqlx::query_as::<_, WorkerTask>(&sql)
            .bind(id)
            .bind(&changes.title)
            .bind(&changes.description)
            .bind(changes.assigned_to)
            .bind(changes.status.map(|s| s.as_str()))
            .bind(changes.priority.map(|p| p.as_str()))
            .fetch_optional(pool)
            .await
    }

    pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM worker_tasks WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== 진행 기록 ====================

    /// 진행 기록 (오래된 순).
    pub async fn list_updates(pool: &PgPool, task_id: Uuid) -> Result<Vec<TaskUpdate>, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT u.id, u.task_id, u.content, u.created_by, u.created_at, \
             COALESCE(usr.full_name, 'Unknown') AS created_by_name \
             FROM worker_task_updates u \
             LEFT JOIN users usr ON u.created_by = usr.id \
             WHERE u.task_id = $1 \
             ORDER BY u.created_at ASC",
        )
        .bind(task_id)
        .fetch_all(pool)
        .await?;
        Ok(decode_rows(rows, "task update"))
    }

    pub async fn add_update(
        pool: &PgPool,
        task_id: Uuid,
        content: &str,
        created_by: Uuid,
    ) -> Result<TaskUpdate, sqlx::Error> {
        sqlx::query_as::<_, TaskUpdate>(
            "INSERT INTO worker_task_updates (task_id, content, created_by) \
             VALUES ($1, $2, $3) \
             RETURNING id, task_id, content, created_by, NULL::text AS created_by_name, created_at",
        )
        .bind(task_id)
        .bind(content)
        .bind(created_by)
        .fetch_one(pool)
        .await
    }

    // ==================== 수집 데이터 ====================

    /// 수집 데이터를 일괄 입력합니다.
    ///
    /// `(data_type, external_id)`가 이미 있으면 건너뜁니다. 개별 행 오류도
    /// 건너뛴 것으로 셉니다 (savepoint 단위로 롤백).
    pub async fn insert_task_data(
        pool: &PgPool,
        task_id: Uuid,
        data_type: &str,
        items: &[TaskDataItem],
    ) -> Result<BulkInsertOutcome, sqlx::Error> {
        if items.is_empty() {
            return Ok(BulkInsertOutcome {
                inserted: 0,
                skipped: 0,
            });
        }

        let mut tx = pool.begin().await?;
        let now = Utc::now();
        let mut inserted = 0;

        for item in items {
            let mut savepoint = (&mut *tx).begin().await?;
            let result = sqlx::query(
                "INSERT INTO worker_task_data (task_id, data_type, ticker, external_id, data, collected_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (data_type, external_id) WHERE external_id IS NOT NULL \
                 DO NOTHING",
            )
            .bind(task_id)
            .bind(data_type)
            .bind(&item.ticker)
            .bind(&item.external_id)
            .bind(&item.data)
            .bind(item.collected_at.unwrap_or(now))
            .execute(&mut *savepoint)
            .await;

            match result {
                Ok(done) => {
                    savepoint.commit().await?;
                    if done.rows_affected() > 0 {
                        inserted += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(task_id = %task_id, error = %e, "Skipping task data item");
                    savepoint.rollback().await?;
                }
            }
        }

        tx.commit().await?;
        Ok(BulkInsertOutcome {
            inserted,
            skipped: items.len() - inserted,
        })
    }

    /// 수집 데이터 목록 (수집 최신순)과 전체 건수.
    pub async fn list_task_data(
        pool: &PgPool,
        task_id: Uuid,
        filter: &TaskDataFilter,
    ) -> Result<(Vec<TaskDataRow>, i64), sqlx::Error> {
        fn push_where<'a>(
            builder: &mut QueryBuilder<'a, Postgres>,
            task_id: Uuid,
            filter: &'a TaskDataFilter,
        ) {
            builder.push(" WHERE task_id = ").push_bind(task_id);
            if let Some(data_type) = &filter.data_type {
                builder.push(" AND data_type = ").push_bind(data_type);
            }
            if let Some(ticker) = &filter.ticker {
                builder.push(" AND ticker = ").push_bind(ticker);
            }
        }

        let mut count: QueryBuilder<Postgres> = QueryBuilder::new("SELECT COUNT(*) FROM worker_task_data");
        push_where(&mut count, task_id, filter);
        let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, task_id, data_type, ticker, external_id, data, collected_at, created_at \
             FROM worker_task_data",
        );
        push_where(&mut query, task_id, filter);
        query
            .push(" ORDER BY collected_at DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = query.build().fetch_all(pool).await?;
        Ok((decode_rows(rows, "task data"), total))
    }

    // ==================== 워커 ====================

    /// 워커에게 배정된 작업 목록.
    pub async fn list_assigned(
        pool: &PgPool,
        worker_id: Uuid,
        status: Option<TaskStatus>,
    ) -> Result<Vec<WorkerTask>, sqlx::Error> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {TASK_COLUMNS}, NULL::text AS assigned_to_name, NULL::text AS created_by_name, \
             tt.id AS tt_id, tt.name AS tt_name, tt.label AS tt_label, tt.sop AS tt_sop \
             FROM worker_tasks t \
             LEFT JOIN task_types tt ON t.task_type_id = tt.id \
             WHERE t.assigned_to = "
        ));
        builder.push_bind(worker_id);
        if let Some(status) = status {
            builder.push(" AND t.status = ").push_bind(status.as_str());
        }
        builder.push(" ORDER BY ").push(priority_order());

        let rows = builder.build().fetch_all(pool).await?;
        Ok(decode_rows::<TaskWithTypeRow>(rows, "worker task")
            .into_iter()
            .map(WorkerTask::from)
            .collect())
    }

    /// 워커에게 배정된 작업 하나.
    pub async fn find_assigned(
        pool: &PgPool,
        worker_id: Uuid,
        id: Uuid,
    ) -> Result<Option<WorkerTask>, sqlx::Error> {
        let sql = format!(
            "SELECT {TASK_COLUMNS}, NULL::text AS assigned_to_name, NULL::text AS created_by_name, \
             tt.id AS tt_id, tt.name AS tt_name, tt.label AS tt_label, tt.sop AS tt_sop \
             FROM worker_tasks t \
             LEFT JOIN task_types tt ON t.task_type_id = tt.id \
             WHERE t.id = $1 AND t.assigned_to = $2"
        );
        let row = sqlx::query_as::<_, TaskWithTypeRow>(&sql)
            .bind(id)
            .bind(worker_id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(WorkerTask::from))
    }

    pub async fn is_assigned(pool: &PgPool, worker_id: Uuid, id: Uuid) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM worker_tasks WHERE id = $1 AND assigned_to = $2)",
        )
        .bind(id)
        .bind(worker_id)
        .fetch_one(pool)
        .await
    }

    /// 배정된 작업의 현재 상태.
    pub async fn assigned_status(
        pool: &PgPool,
        worker_id: Uuid,
        id: Uuid,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT status FROM worker_tasks WHERE id = $1 AND assigned_to = $2")
            .bind(id)
            .bind(worker_id)
            .fetch_optional(pool)
            .await
    }

    /// 상태를 바꿉니다. `in_progress`는 started_at, 종료 상태는 completed_at을 기록합니다.
    pub async fn set_status(
        pool: &PgPool,
        worker_id: Uuid,
        id: Uuid,
        status: TaskStatus,
    ) -> Result<Option<WorkerTask>, sqlx::Error> {
        let timestamp = match status {
            TaskStatus::InProgress => ", started_at = NOW()",
            s if s.is_terminal() => ", completed_at = NOW()",
            _ => "",
        };
        let sql = format!(
            "UPDATE worker_tasks SET status = $1, updated_at = NOW(){timestamp} \
             WHERE id = $2 AND assigned_to = $3 \
             RETURNING {RETURNING_COLUMNS}"
        );
        sqlx::query_as::<_, WorkerTask>(&sql)
            .bind(status.as_str())
            .bind(id)
            .bind(worker_id)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_result(
        pool: &PgPool,
        worker_id: Uuid,
        id: Uuid,
        result: &serde_json::Value,
    ) -> Result<Option<WorkerTask>, sqlx::Error> {
        let sql = format!(
            "UPDATE worker_tasks SET result = $1, updated_at = NOW() \
             WHERE id = $2 AND assigned_to = $3 \
             RETURNING {RETURNING_COLUMNS}"
        );
        sqlx::query_as::<_, WorkerTask>(&sql)
            .bind(result)
            .bind(id)
            .bind(worker_id)
            .fetch_optional(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> WorkerTask {
        let now = Utc::now();
        WorkerTask {
            id: Uuid::new_v4(),
            title: "Collect earnings call notes".into(),
            description: String::new(),
            assigned_to: None,
            assigned_to_name: None,
            status: "pending".into(),
            priority: "high".into(),
            task_type_id: Some(3),
            params: None,
            result: None,
            created_by: None,
            created_by_name: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            task_type: None,
        }
    }

    #[test]
    fn test_joined_task_type_is_attached() {
        let row = TaskWithTypeRow {
            task: task(),
            tt_id: Some(3),
            tt_name: Some("reddit_scrape".into()),
            tt_label: Some("Reddit scrape".into()),
            tt_sop: Some(String::new()),
        };
        let task = WorkerTask::from(row);
        let tt = task.task_type.unwrap();
        assert_eq!(tt.name, "reddit_scrape");
        assert!(tt.sop.is_none());
    }

    #[test]
    fn test_missing_task_type_stays_none() {
        let row = TaskWithTypeRow {
            task: task(),
            tt_id: None,
            tt_name: None,
            tt_label: None,
            tt_sop: None,
        };
        let json = serde_json::to_value(WorkerTask::from(row)).unwrap();
        assert!(json.get("task_type").is_none());
        assert!(json.get("assigned_to_name").is_none());
        assert_eq!(json["priority"], "high");
    }

    #[test]
    fn test_priority_order_clause() {
        let clause = priority_order();
        assert!(clause.starts_with("CASE t.priority WHEN 'urgent'"));
        assert!(clause.ends_with("t.created_at DESC"));
    }
}
