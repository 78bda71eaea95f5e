// ==========================================
// 定额匹配系统 - 关键词权重仓储
// ==========================================
// keyword 唯一；save_all 以 keyword 为键做 upsert
// ==========================================

use crate::domain::learning::KeywordWeight;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Local;
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

pub struct KeywordWeightRepository {
    conn: Arc<Mutex<Connection>>,
}

impl KeywordWeightRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> SqliteResult<KeywordWeight> {
        Ok(KeywordWeight {
            id: row.get(0)?,
            keyword: row.get(1)?,
            weight: row.get(2)?,
            match_count: row.get(3)?,
            total_count: row.get(4)?,
            success_rate: row.get(5)?,
            is_core_concept: row.get::<_, i64>(6)? != 0,
            update_time: row.get(7)?,
        })
    }

    pub fn find_by_keyword(&self, keyword: &str) -> RepositoryResult<Option<KeywordWeight>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            r#"
            SELECT id, keyword, weight, match_count, total_count,
                   success_rate, is_core_concept, update_time
            FROM keyword_weight WHERE keyword = ?1
            "#,
            params![keyword],
            Self::map_row,
        );
        match result {
            Ok(w) => Ok(Some(w)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_all(&self) -> RepositoryResult<Vec<KeywordWeight>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, keyword, weight, match_count, total_count,
                   success_rate, is_core_concept, update_time
            FROM keyword_weight ORDER BY keyword ASC
            "#,
        )?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    /// 批量写入（单事务 upsert，刷新 update_time）
    pub fn save_all(&self, weights: &[KeywordWeight]) -> RepositoryResult<usize> {
        if weights.is_empty() {
            return Ok(0);
        }
        let now = Local::now().naive_local();
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO keyword_weight (
                    keyword, weight, match_count, total_count,
                    success_rate, is_core_concept, update_time
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(keyword) DO UPDATE SET
                    weight = excluded.weight,
                    match_count = excluded.match_count,
                    total_count = excluded.total_count,
                    success_rate = excluded.success_rate,
                    is_core_concept = excluded.is_core_concept,
                    update_time = excluded.update_time
                "#,
            )?;
            for w in weights {
                stmt.execute(params![
                    w.keyword,
                    w.weight,
                    w.match_count,
                    w.total_count,
                    w.success_rate,
                    w.is_core_concept as i64,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(weights.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_with_schema;

    fn setup() -> KeywordWeightRepository {
        KeywordWeightRepository::new(Arc::new(Mutex::new(open_in_memory_with_schema().unwrap())))
    }

    #[test]
    fn test_save_all_upserts_by_keyword() {
        let repo = setup();
        let mut w = KeywordWeight::new("摄像机", true);
        w.observe(1.0);
        repo.save_all(&[w.clone()]).unwrap();

        w.observe(0.5);
        repo.save_all(&[w.clone()]).unwrap();

        let all = repo.find_all().unwrap();
        assert_eq!(all.len(), 1, "同一关键词应只保留一行");
        let stored = repo.find_by_keyword("摄像机").unwrap().unwrap();
        assert_eq!(stored.total_count, 2);
        assert_eq!(stored.match_count, 1.5);
        assert!(stored.is_core_concept);
        assert!(stored.update_time.is_some());
    }

    #[test]
    fn test_find_missing_keyword() {
        let repo = setup();
        assert!(repo.find_by_keyword("不存在").unwrap().is_none());
        assert_eq!(repo.save_all(&[]).unwrap(), 0);
    }
}
