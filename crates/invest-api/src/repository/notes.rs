//! 기능 노트(위키) Repository.
//!
//! 그룹 → 기능 → 섹션별 노트의 3단 구조입니다.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::collections::{BTreeMap, HashMap};
use utoipa::ToSchema;
use uuid::Uuid;

use invest_core::NoteSection;

use super::decode_rows;

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct FeatureGroup {
    pub id: Uuid,
    pub name: String,
    pub notes: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct Feature {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    pub notes: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct FeatureNote {
    pub id: Uuid,
    pub feature_id: Uuid,
    pub section: String,
    pub title: String,
    pub content: String,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeatureWithCounts {
    #[serde(flatten)]
    pub feature: Feature,
    /// 섹션별 노트 수. 모든 섹션이 0으로 채워져 있습니다.
    pub note_counts: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupWithFeatures {
    #[serde(flatten)]
    pub group: FeatureGroup,
    pub features: Vec<FeatureWithCounts>,
}

#[derive(Debug, Clone, FromRow)]
pub struct NoteCount {
    pub feature_id: Uuid,
    pub section: String,
    pub count: i64,
}

/// 이름/메모/정렬 순서 부분 변경 (그룹과 기능 공용).
#[derive(Debug, Clone, Default)]
pub struct OutlineChanges {
    pub name: Option<String>,
    pub notes: Option<String>,
    pub sort_order: Option<i32>,
}

/// 노트 부분 변경.
#[derive(Debug, Clone, Default)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub sort_order: Option<i32>,
}

/// 그룹/기능/노트 수를 트리로 조립합니다. 입력 순서를 유지합니다.
pub fn build_tree(
    groups: Vec<FeatureGroup>,
    features: Vec<Feature>,
    counts: Vec<NoteCount>,
) -> Vec<GroupWithFeatures> {
    let mut count_map: HashMap<Uuid, BTreeMap<String, i64>> = HashMap::new();
    for c in counts {
        count_map
            .entry(c.feature_id)
            .or_default()
            .insert(c.section, c.count);
    }

    let mut by_group: HashMap<Uuid, Vec<FeatureWithCounts>> = HashMap::new();
    for feature in features {
        let mut note_counts: BTreeMap<String, i64> = NoteSection::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        if let Some(found) = count_map.remove(&feature.id) {
            note_counts.extend(found);
        }
        by_group
            .entry(feature.group_id)
            .or_default()
            .push(FeatureWithCounts {
                feature,
                note_counts,
            });
    }

    groups
        .into_iter()
        .map(|group| GroupWithFeatures {
            features: by_group.remove(&group.id).unwrap_or_default(),
            group,
        })
        .collect()
}

const GROUP_COLUMNS: &str =
    "id, name, COALESCE(notes, '') AS notes, sort_order, created_at, updated_at";
const FEATURE_COLUMNS: &str =
    "id, group_id, name, COALESCE(notes, '') AS notes, sort_order, created_at, updated_at";
const NOTE_COLUMNS: &str = "id, feature_id, section, title, COALESCE(content, '') AS content, \
    sort_order, created_at, updated_at";

pub struct NotesRepository;

impl NotesRepository {
    /// 전체 트리.
    pub async fn tree(pool: &PgPool) -> Result<Vec<GroupWithFeatures>, sqlx::Error> {
        let groups = Self::list_groups(pool).await?;

        let sql = format!("SELECT {FEATURE_COLUMNS} FROM features ORDER BY sort_order, created_at");
        let rows = sqlx::query(&sql).fetch_all(pool).await?;
        let features = decode_rows(rows, "feature");

        let rows = sqlx::query(
            "SELECT feature_id, section, COUNT(*) AS count \
             FROM feature_notes GROUP BY feature_id, section",
        )
        .fetch_all(pool)
        .await?;
        let counts = decode_rows(rows, "note count");

        Ok(build_tree(groups, features, counts))
    }

    // ==================== 그룹 ====================

    pub async fn list_groups(pool: &PgPool) -> Result<Vec<FeatureGroup>, sqlx::Error> {
        let sql = format!("SELECT {GROUP_COLUMNS} FROM feature_groups ORDER BY sort_order, created_at");
        let rows = sqlx::query(&sql).fetch_all(pool).await?;
        Ok(decode_rows(rows, "feature group"))
    }

    pub async fn create_group(
        pool: &PgPool,
        name: &str,
        notes: &str,
    ) -> Result<FeatureGroup, sqlx::Error> {
        let sql = format!(
            "INSERT INTO feature_groups (name, notes) VALUES ($1, $2) RETURNING {GROUP_COLUMNS}"
        );
        sqlx::query_as::<_, FeatureGroup>(&sql)
            .bind(name)
            .bind(notes)
            .fetch_one(pool)
            .await
    }

    pub async fn update_group(
        pool: &PgPool,
        id: Uuid,
        changes: &OutlineChanges,
    ) -> Result<Option<FeatureGroup>, sqlx::Error> {
        let sql = format!(
            "UPDATE feature_groups SET \
                name = COALESCE($2, name), \
                notes = COALESCE($3, notes), \
                sort_order = COALESCE($4, sort_order), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {GROUP_COLUMNS}"
        );
        sqlx::query_as::<_, FeatureGroup>(&sql)
            .bind(id)
            .bind(&changes.name)
            .bind(&changes.notes)
            .bind(changes.sort_order)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete_group(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM feature_groups WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== 기능 ====================

    pub async fn list_features(pool: &PgPool, group_id: Uuid) -> Result<Vec<Feature>, sqlx::Error> {
        let sql = format!(
            "SELECT {FEATURE_COLUMNS} FROM features WHERE group_id = $1 ORDER BY sort_order, created_at"
        );
        let rows = sqlx::query(&sql).bind(group_id).fetch_all(pool).await?;
        Ok(decode_rows(rows, "feature"))
    }

    pub async fn create_feature(
        pool: &PgPool,
        group_id: Uuid,
        name: &str,
        notes: &str,
    ) -> Result<Feature, sqlx::Error> {
        let sql = format!(
            "INSERT INTO features (group_id, name, notes) VALUES ($1, $2, $3) RETURNING {FEATURE_COLUMNS}"
        );
        sqlx::query_as::<_, Feature>(&sql)
            .bind(group_id)
            .bind(name)
            .bind(notes)
            .fetch_one(pool)
            .await
    }

    pub async fn update_feature(
        pool: &PgPool,
        id: Uuid,
        changes: &OutlineChanges,
    ) -> Result<Option<Feature>, sqlx::Error> {
        let sql = format!(
            "UPDATE features SET \
                name = COALESCE($2, name), \
                notes = COALESCE($3, notes), \
                sort_order = COALESCE($4, sort_order), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {FEATURE_COLUMNS}"
        );
        sqlx::query_as::<_, Feature>(&sql)
            .bind(id)
            .bind(&changes.name)
            .bind(&changes.notes)
            .bind(changes.sort_order)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete_feature(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM features WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== 노트 ====================

    /// 기능의 노트. 섹션을 지정하지 않으면 섹션순으로 모두 반환합니다.
    pub async fn list_notes(
        pool: &PgPool,
        feature_id: Uuid,
        section: Option<NoteSection>,
    ) -> Result<Vec<FeatureNote>, sqlx::Error> {
        let rows = match section {
            Some(section) => {
                let sql = format!(
                    "SELECT {NOTE_COLUMNS} FROM feature_notes \
                     WHERE feature_id = $1 AND section = $2 ORDER BY sort_order, created_at"
                );
                sqlx::query(&sql)
                    .bind(feature_id)
                    .bind(section.as_str())
                    .fetch_all(pool)
                    .await?
            }
            None => {
                let sql = format!(
                    "SELECT {NOTE_COLUMNS} FROM feature_notes \
                     WHERE feature_id = $1 ORDER BY section, sort_order, created_at"
                );
                sqlx::query(&sql).bind(feature_id).fetch_all(pool).await?
            }
        };
        Ok(decode_rows(rows, "feature note"))
    }

    pub async fn create_note(
        pool: &PgPool,
        feature_id: Uuid,
        section: NoteSection,
        title: &str,
        content: &str,
    ) -> Result<FeatureNote, sqlx::Error> {
        let sql = format!(
            "INSERT INTO feature_notes (feature_id, section, title, content) \
             VALUES ($1, $2, $3, $4) RETURNING {NOTE_COLUMNS}"
        );
        sqlx::query_as::<_, FeatureNote>(&sql)
            .bind(feature_id)
            .bind(section.as_str())
            .bind(title)
            .bind(content)
            .fetch_one(pool)
            .await
    }

    pub async fn update_note(
        pool: &PgPool,
        id: Uuid,
        changes: &NoteChanges,
    ) -> Result<Option<FeatureNote>, sqlx::Error> {
        let sql = format!(
            "UPDATE feature_notes SET \
                title = COALESCE($2, title), \
                content = COALESCE($3, content), \
                sort_order = COALESCE($4, sort_order), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {NOTE_COLUMNS}"
        );
        sqlx::query_as::<_, FeatureNote>(&sql)
            .bind(id)
            .bind(&changes.title)
            .bind(&changes.content)
            .bind(changes.sort_order)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete_note(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM feature_notes WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(sort: i32) -> FeatureGroup {
        let now = Utc::now();
        FeatureGroup {
            id: Uuid::new_v4(),
            name: format!("group-{sort}"),
            notes: String::new(),
            sort_order: sort,
            created_at: now,
            updated_at: now,
        }
    }

    fn feature(group_id: Uuid, name: &str) -> Feature {
        let now = Utc::now();
        Feature {
            id: Uuid::new_v4(),
            group_id,
            name: name.to_string(),
            notes: String::new(),
            sort_order: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_tree_fills_zero_counts() {
        let g1 = group(0);
        let g2 = group(1);
        let screener = feature(g1.id, "screener");
        let alerts = feature(g1.id, "alerts");
        let counts = vec![
            NoteCount {
                feature_id: screener.id,
                section: "backend".into(),
                count: 3,
            },
            NoteCount {
                feature_id: screener.id,
                section: "ui".into(),
                count: 1,
            },
        ];
        let g2_id = g2.id;

        let tree = build_tree(vec![g1, g2], vec![screener, alerts], counts);

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].features.len(), 2);
        let counts = &tree[0].features[0].note_counts;
        assert_eq!(counts["backend"], 3);
        assert_eq!(counts["ui"], 1);
        assert_eq!(counts["data"], 0);
        assert_eq!(counts["infra"], 0);
        assert_eq!(tree[0].features[1].note_counts["backend"], 0);

        assert_eq!(tree[1].group.id, g2_id);
        assert!(tree[1].features.is_empty());
    }

    #[test]
    fn test_tree_serializes_flat_group_fields() {
        let g = group(0);
        let tree = build_tree(vec![g], vec![], vec![]);
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json[0]["name"], "group-0");
        assert!(json[0]["features"].as_array().unwrap().is_empty());
    }
}
