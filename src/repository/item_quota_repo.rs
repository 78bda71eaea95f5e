// ==========================================
// 定额匹配系统 - 清单-定额关联仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: 列表按 sort_order, id 升序返回
// ==========================================

use crate::domain::quota::ItemQuotaAssociation;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

pub struct ItemQuotaRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ItemQuotaRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> SqliteResult<ItemQuotaAssociation> {
        Ok(ItemQuotaAssociation {
            id: row.get(0)?,
            project_item_id: row.get(1)?,
            quota_id: row.get(2)?,
            quota_code: row.get(3)?,
            quota_name: row.get(4)?,
            quota_feature_value: row.get(5)?,
            unit_price: row.get(6)?,
            sort_order: row.get(7)?,
        })
    }

    /// 插入关联，返回自增 ID
    pub fn insert(&self, assoc: &ItemQuotaAssociation) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO project_item_quota (
                project_item_id, quota_id, quota_code, quota_name,
                quota_feature_value, unit_price, sort_order
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                assoc.project_item_id,
                assoc.quota_id,
                assoc.quota_code,
                assoc.quota_name,
                assoc.quota_feature_value,
                assoc.unit_price,
                assoc.sort_order,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<ItemQuotaAssociation>> {
        let conn = self.get_conn()?;
        let result = conn.query_row(
            r#"
            SELECT id, project_item_id, quota_id, quota_code, quota_name,
                   quota_feature_value, unit_price, sort_order
            FROM project_item_quota WHERE id = ?1
            "#,
            params![id],
            Self::map_row,
        );
        match result {
            Ok(a) => Ok(Some(a)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询条目的全部关联（按 sort_order 排序）
    pub fn find_by_item_id(&self, project_item_id: i64) -> RepositoryResult<Vec<ItemQuotaAssociation>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, project_item_id, quota_id, quota_code, quota_name,
                   quota_feature_value, unit_price, sort_order
            FROM project_item_quota
            WHERE project_item_id = ?1
            ORDER BY sort_order ASC, id ASC
            "#,
        )?;
        let rows = stmt
            .query_map(params![project_item_id], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn exists(&self, project_item_id: i64, quota_id: i64) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM project_item_quota WHERE project_item_id = ?1 AND quota_id = ?2",
            params![project_item_id, quota_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn delete_by_id(&self, id: i64) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute("DELETE FROM project_item_quota WHERE id = ?1", params![id])?)
    }

    pub fn delete_by_item_id(&self, project_item_id: i64) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute(
            "DELETE FROM project_item_quota WHERE project_item_id = ?1",
            params![project_item_id],
        )?)
    }
}
