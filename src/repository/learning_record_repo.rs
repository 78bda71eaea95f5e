// ==========================================
// 定额匹配系统 - 匹配学习记录仓储
// ==========================================
// 只追加，不修改
// 关键词列表字段以 KeywordList 存储格式落库
// ==========================================

use crate::domain::learning::{KeywordList, LearningRecord};
use crate::domain::types::MatchType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{Local, NaiveDateTime};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    id, item_name, item_feature_value, quota_name, quota_feature_value,
    match_score, match_type, item_keywords, quota_keywords, common_keywords,
    learning_weight, create_time, update_time
"#;

pub struct LearningRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

struct RawRecordRow {
    id: i64,
    item_name: Option<String>,
    item_feature_value: Option<String>,
    quota_name: Option<String>,
    quota_feature_value: Option<String>,
    match_score: f64,
    match_type: i32,
    item_keywords: String,
    quota_keywords: String,
    common_keywords: String,
    learning_weight: f64,
    create_time: Option<NaiveDateTime>,
    update_time: Option<NaiveDateTime>,
}

impl RawRecordRow {
    fn into_record(self) -> RepositoryResult<LearningRecord> {
        let match_type = MatchType::from_code(self.match_type).ok_or_else(|| {
            RepositoryError::ValidationError(format!("未知匹配类型: {}", self.match_type))
        })?;
        let decode = |field: &str, raw: &str| {
            KeywordList::from_storage(raw).map_err(|e| RepositoryError::serialization(field, e))
        };
        Ok(LearningRecord {
            id: Some(self.id),
            item_name: self.item_name,
            item_feature_value: self.item_feature_value,
            quota_name: self.quota_name,
            quota_feature_value: self.quota_feature_value,
            match_score: self.match_score,
            match_type,
            item_keywords: decode("item_keywords", &self.item_keywords)?,
            quota_keywords: decode("quota_keywords", &self.quota_keywords)?,
            common_keywords: decode("common_keywords", &self.common_keywords)?,
            learning_weight: self.learning_weight,
            create_time: self.create_time,
            update_time: self.update_time,
        })
    }
}

impl LearningRecordRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn query(&self, sql: &str, match_types: &[i32]) -> RepositoryResult<Vec<LearningRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let raw = stmt
            .query_map(rusqlite::params_from_iter(match_types.iter()), |row| {
                Ok(RawRecordRow {
                    id: row.get(0)?,
                    item_name: row.get(1)?,
                    item_feature_value: row.get(2)?,
                    quota_name: row.get(3)?,
                    quota_feature_value: row.get(4)?,
                    match_score: row.get(5)?,
                    match_type: row.get(6)?,
                    item_keywords: row.get(7)?,
                    quota_keywords: row.get(8)?,
                    common_keywords: row.get(9)?,
                    learning_weight: row.get(10)?,
                    create_time: row.get(11)?,
                    update_time: row.get(12)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter().map(RawRecordRow::into_record).collect()
    }

    /// 追加一条学习记录（创建/更新时间由仓储填充）
    pub fn append(&self, record: &LearningRecord) -> RepositoryResult<i64> {
        let encode = |field: &str, list: &KeywordList| {
            list.to_storage()
                .map_err(|e| RepositoryError::serialization(field, e))
        };
        let item_keywords = encode("item_keywords", &record.item_keywords)?;
        let quota_keywords = encode("quota_keywords", &record.quota_keywords)?;
        let common_keywords = encode("common_keywords", &record.common_keywords)?;
        let now = Local::now().naive_local();

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO matching_learning_record (
                item_name, item_feature_value, quota_name, quota_feature_value,
                match_score, match_type, item_keywords, quota_keywords, common_keywords,
                learning_weight, create_time, update_time
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            "#,
            params![
                record.item_name,
                record.item_feature_value,
                record.quota_name,
                record.quota_feature_value,
                record.match_score,
                record.match_type.as_code(),
                item_keywords,
                quota_keywords,
                common_keywords,
                record.learning_weight,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_all(&self) -> RepositoryResult<Vec<LearningRecord>> {
        let sql = format!(
            "SELECT {} FROM matching_learning_record ORDER BY id ASC",
            SELECT_COLUMNS
        );
        self.query(&sql, &[])
    }

    /// 按匹配类型查询（IN 列表）
    pub fn find_by_types(&self, match_types: &[MatchType]) -> RepositoryResult<Vec<LearningRecord>> {
        if match_types.is_empty() {
            return Ok(Vec::new());
        }
        let codes: Vec<i32> = match_types.iter().map(MatchType::as_code).collect();
        let placeholders = vec!["?"; codes.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM matching_learning_record WHERE match_type IN ({}) ORDER BY id ASC",
            SELECT_COLUMNS, placeholders
        );
        self.query(&sql, &codes)
    }

    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM matching_learning_record", [], |row| row.get(0))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_with_schema;

    fn setup() -> LearningRecordRepository {
        LearningRecordRepository::new(Arc::new(Mutex::new(open_in_memory_with_schema().unwrap())))
    }

    fn record(match_type: MatchType) -> LearningRecord {
        LearningRecord {
            id: None,
            item_name: Some("NVR硬盘录像机".to_string()),
            item_feature_value: None,
            quota_name: Some("网络硬盘录像机".to_string()),
            quota_feature_value: Some("16路".to_string()),
            match_score: 1.0,
            match_type,
            item_keywords: KeywordList::new(vec!["NVR".to_string(), "硬盘录像机".to_string()]),
            quota_keywords: KeywordList::new(vec!["硬盘录像机".to_string()]),
            common_keywords: KeywordList::new(vec!["硬盘录像机".to_string()]),
            learning_weight: 1.0,
            create_time: None,
            update_time: None,
        }
    }

    #[test]
    fn test_append_and_find_all() {
        let repo = setup();
        repo.append(&record(MatchType::ManualSingle)).unwrap();

        let all = repo.find_all().unwrap();
        assert_eq!(all.len(), 1);
        let r = &all[0];
        assert_eq!(r.match_type, MatchType::ManualSingle);
        assert_eq!(r.item_keywords.len(), 2, "关键词列表应完整还原");
        assert_eq!(r.common_keywords.as_slice(), &["硬盘录像机".to_string()]);
        assert!(r.create_time.is_some());
    }

    #[test]
    fn test_find_by_types_filters() {
        let repo = setup();
        repo.append(&record(MatchType::Auto)).unwrap();
        repo.append(&record(MatchType::ManualSingle)).unwrap();
        repo.append(&record(MatchType::ManualMulti)).unwrap();

        let manual = repo
            .find_by_types(&[MatchType::ManualSingle, MatchType::ManualMulti])
            .unwrap();
        assert_eq!(manual.len(), 2);
        assert!(manual.iter().all(|r| r.match_type.is_manual()));
        assert_eq!(repo.count().unwrap(), 3);
        assert!(repo.find_by_types(&[]).unwrap().is_empty());
    }
}
