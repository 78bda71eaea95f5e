// ==========================================
// 定额匹配系统 - 企业定额数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 所有列表查询按 id 升序，保证匹配扫描顺序稳定
// ==========================================

use crate::domain::quota::EnterpriseQuota;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    id, quota_code, quota_name, feature_value, unit, unit_price,
    labor_cost, material_cost, machine_cost, remark, version_id
"#;

pub struct EnterpriseQuotaRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EnterpriseQuotaRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> SqliteResult<EnterpriseQuota> {
        Ok(EnterpriseQuota {
            id: row.get(0)?,
            quota_code: row.get(1)?,
            quota_name: row.get(2)?,
            feature_value: row.get(3)?,
            unit: row.get(4)?,
            unit_price: row.get(5)?,
            labor_cost: row.get(6)?,
            material_cost: row.get(7)?,
            machine_cost: row.get(8)?,
            remark: row.get(9)?,
            version_id: row.get(10)?,
        })
    }

    /// 插入定额，返回自增 ID
    pub fn insert(&self, quota: &EnterpriseQuota) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO enterprise_quota (
                quota_code, quota_name, feature_value, unit, unit_price,
                labor_cost, material_cost, machine_cost, remark, version_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                quota.quota_code,
                quota.quota_name,
                quota.feature_value,
                quota.unit,
                quota.unit_price,
                quota.labor_cost,
                quota.material_cost,
                quota.machine_cost,
                quota.remark,
                quota.version_id,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<EnterpriseQuota>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM enterprise_quota WHERE id = ?1", SELECT_COLUMNS);
        match conn.query_row(&sql, params![id], Self::map_row) {
            Ok(q) => Ok(Some(q)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询定额目录
    ///
    /// # 参数
    /// - `version_id`: Some 时只取该版本；None 取全部
    pub fn find_all(&self, version_id: Option<i64>) -> RepositoryResult<Vec<EnterpriseQuota>> {
        let conn = self.get_conn()?;
        let quotas = match version_id {
            Some(v) => {
                let sql = format!(
                    "SELECT {} FROM enterprise_quota WHERE version_id = ?1 ORDER BY id ASC",
                    SELECT_COLUMNS
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params![v], Self::map_row)?
                    .collect::<SqliteResult<Vec<_>>>()?;
                rows
            }
            None => {
                let sql = format!("SELECT {} FROM enterprise_quota ORDER BY id ASC", SELECT_COLUMNS);
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([], Self::map_row)?
                    .collect::<SqliteResult<Vec<_>>>()?;
                rows
            }
        };
        Ok(quotas)
    }

    /// 名称或特征模糊查询（供人工选择定额使用）
    pub fn search(&self, keyword: &str, version_id: Option<i64>) -> RepositoryResult<Vec<EnterpriseQuota>> {
        let conn = self.get_conn()?;
        let pattern = format!("%{}%", keyword.trim());
        let sql = format!(
            r#"
            SELECT {} FROM enterprise_quota
            WHERE (quota_name LIKE ?1 OR feature_value LIKE ?1)
              AND (?2 IS NULL OR version_id = ?2)
            ORDER BY id ASC
            "#,
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![pattern, version_id], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn delete_by_version_id(&self, version_id: i64) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute(
            "DELETE FROM enterprise_quota WHERE version_id = ?1",
            params![version_id],
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_with_schema;

    fn quota(name: &str, version_id: Option<i64>) -> EnterpriseQuota {
        EnterpriseQuota {
            quota_name: Some(name.to_string()),
            unit_price: Some(100.0),
            version_id,
            ..Default::default()
        }
    }

    #[test]
    fn test_find_all_with_version_filter() {
        let repo = EnterpriseQuotaRepository::new(Arc::new(Mutex::new(
            open_in_memory_with_schema().unwrap(),
        )));
        repo.insert(&quota("高清摄像机", Some(1))).unwrap();
        repo.insert(&quota("硬盘录像机", Some(2))).unwrap();
        repo.insert(&quota("交换机", None)).unwrap();

        assert_eq!(repo.find_all(None).unwrap().len(), 3);
        let v1 = repo.find_all(Some(1)).unwrap();
        assert_eq!(v1.len(), 1);
        assert_eq!(v1[0].quota_name.as_deref(), Some("高清摄像机"));
    }

    #[test]
    fn test_find_all_is_ordered_by_id() {
        let repo = EnterpriseQuotaRepository::new(Arc::new(Mutex::new(
            open_in_memory_with_schema().unwrap(),
        )));
        for name in ["C", "A", "B"] {
            repo.insert(&quota(name, None)).unwrap();
        }
        let ids: Vec<i64> = repo.find_all(None).unwrap().iter().map(|q| q.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted, "定额目录应按 id 升序返回");
    }

    #[test]
    fn test_search_by_keyword() {
        let repo = EnterpriseQuotaRepository::new(Arc::new(Mutex::new(
            open_in_memory_with_schema().unwrap(),
        )));
        repo.insert(&quota("高清摄像机", Some(1))).unwrap();
        repo.insert(&quota("硬盘录像机", Some(1))).unwrap();

        assert_eq!(repo.search("摄像", None).unwrap().len(), 1);
        assert_eq!(repo.search("机", Some(1)).unwrap().len(), 2);
        assert_eq!(repo.search("机", Some(9)).unwrap().len(), 0);
    }
}
