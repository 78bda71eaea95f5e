// ==========================================
// 定额匹配系统 - 工程量清单数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::project_item::ProjectLineItem;
use crate::domain::types::MatchStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Result as SqliteResult, Row, Transaction};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    id, user_id, item_code, item_name, feature_value, unit, quantity,
    matched_quota_id, matched_quota_code, matched_quota_name, matched_quota_feature_value,
    matched_unit_price, total_price, match_status, remark
"#;

// ==========================================
// ProjectItemRepository - 清单条目仓储
// ==========================================
/// 清单条目仓储
/// 职责: 管理 project_item 表的 CRUD 操作
pub struct ProjectItemRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProjectItemRepository {
    /// 从已有连接创建仓储实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row<'_>) -> SqliteResult<ProjectLineItem> {
        Ok(ProjectLineItem {
            id: row.get(0)?,
            user_id: row.get(1)?,
            item_code: row.get(2)?,
            item_name: row.get(3)?,
            feature_value: row.get(4)?,
            unit: row.get(5)?,
            quantity: row.get(6)?,
            matched_quota_id: row.get(7)?,
            matched_quota_code: row.get(8)?,
            matched_quota_name: row.get(9)?,
            matched_quota_feature_value: row.get(10)?,
            matched_unit_price: row.get(11)?,
            total_price: row.get(12)?,
            match_status: MatchStatus::from_code(row.get(13)?),
            remark: row.get(14)?,
        })
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 插入清单条目
    ///
    /// # 返回
    /// - `Ok(id)`: 新记录的自增 ID（忽略传入的 id）
    pub fn insert(&self, item: &ProjectLineItem) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO project_item (
                user_id, item_code, item_name, feature_value, unit, quantity,
                matched_quota_id, matched_quota_code, matched_quota_name, matched_quota_feature_value,
                matched_unit_price, total_price, match_status, remark
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                item.user_id,
                item.item_code,
                item.item_name,
                item.feature_value,
                item.unit,
                item.quantity,
                item.matched_quota_id,
                item.matched_quota_code,
                item.matched_quota_name,
                item.matched_quota_feature_value,
                item.matched_unit_price,
                item.total_price,
                item.match_status.as_code(),
                item.remark,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn update_in(tx: &Transaction<'_>, item: &ProjectLineItem) -> RepositoryResult<()> {
        let rows = tx.execute(
            r#"
            UPDATE project_item SET
                user_id = ?2, item_code = ?3, item_name = ?4, feature_value = ?5,
                unit = ?6, quantity = ?7,
                matched_quota_id = ?8, matched_quota_code = ?9, matched_quota_name = ?10,
                matched_quota_feature_value = ?11, matched_unit_price = ?12,
                total_price = ?13, match_status = ?14, remark = ?15
            WHERE id = ?1
            "#,
            params![
                item.id,
                item.user_id,
                item.item_code,
                item.item_name,
                item.feature_value,
                item.unit,
                item.quantity,
                item.matched_quota_id,
                item.matched_quota_code,
                item.matched_quota_name,
                item.matched_quota_feature_value,
                item.matched_unit_price,
                item.total_price,
                item.match_status.as_code(),
                item.remark,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("ProjectItem", item.id));
        }
        Ok(())
    }

    /// 保存单条（按 id 更新）
    pub fn save(&self, item: &ProjectLineItem) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        Self::update_in(&tx, item)?;
        tx.commit()?;
        Ok(())
    }

    /// 批量保存（单事务，任一失败整体回滚）
    pub fn save_batch(&self, items: &[ProjectLineItem]) -> RepositoryResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        for item in items {
            Self::update_in(&tx, item)?;
        }
        tx.commit()?;
        Ok(items.len())
    }

    /// 删除单条（关联随外键级联删除）
    pub fn delete_by_id(&self, id: i64) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute("DELETE FROM project_item WHERE id = ?1", params![id])?)
    }

    /// 删除条目的全部多定额关联（条目本身保留）
    pub fn delete_associations(&self, item_id: i64) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute(
            "DELETE FROM project_item_quota WHERE project_item_id = ?1",
            params![item_id],
        )?)
    }

    /// 清空指定用户的清单
    pub fn delete_by_user_id(&self, user_id: i64) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute("DELETE FROM project_item WHERE user_id = ?1", params![user_id])?)
    }

    // ==========================================
    // 查询操作
    // ==========================================

    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<ProjectLineItem>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM project_item WHERE id = ?1", SELECT_COLUMNS);
        let result = conn.query_row(&sql, params![id], Self::map_row);

        match result {
            Ok(item) => Ok(Some(item)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询全部条目（按 id 升序）
    pub fn find_all(&self) -> RepositoryResult<Vec<ProjectLineItem>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM project_item ORDER BY id ASC", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map([], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    pub fn find_by_user_id(&self, user_id: i64) -> RepositoryResult<Vec<ProjectLineItem>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM project_item WHERE user_id = ?1 ORDER BY id ASC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![user_id], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    pub fn find_by_match_status(&self, status: MatchStatus) -> RepositoryResult<Vec<ProjectLineItem>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM project_item WHERE match_status = ?1 ORDER BY id ASC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![status.as_code()], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(items)
    }

    /// 按匹配状态统计数量
    pub fn count_by_status(&self, status: MatchStatus) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM project_item WHERE match_status = ?1",
            params![status.as_code()],
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_with_schema;

    fn setup() -> ProjectItemRepository {
        let conn = open_in_memory_with_schema().unwrap();
        ProjectItemRepository::new(Arc::new(Mutex::new(conn)))
    }

    fn item(name: &str, unit: Option<&str>) -> ProjectLineItem {
        ProjectLineItem {
            item_name: Some(name.to_string()),
            unit: unit.map(str::to_string),
            quantity: Some(2.0),
            user_id: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_and_find_by_id() {
        let repo = setup();
        let id = repo.insert(&item("监控摄像机", Some("台"))).unwrap();

        let found = repo.find_by_id(id).unwrap().expect("应能查到刚插入的条目");
        assert_eq!(found.id, id);
        assert_eq!(found.item_name.as_deref(), Some("监控摄像机"));
        assert_eq!(found.match_status, MatchStatus::Unmatched);
        assert!(repo.find_by_id(id + 100).unwrap().is_none());
    }

    #[test]
    fn test_save_batch_updates_rows() {
        let repo = setup();
        let id1 = repo.insert(&item("摄像机", Some("台"))).unwrap();
        let id2 = repo.insert(&item("录像机", Some("台"))).unwrap();

        let mut items = repo.find_all().unwrap();
        for it in items.iter_mut() {
            it.match_status = MatchStatus::AutoMatched;
            it.matched_unit_price = Some(10.0);
            it.recompute_total();
        }
        assert_eq!(repo.save_batch(&items).unwrap(), 2);

        let a = repo.find_by_id(id1).unwrap().unwrap();
        let b = repo.find_by_id(id2).unwrap().unwrap();
        assert_eq!(a.total_price, Some(20.0));
        assert_eq!(b.match_status, MatchStatus::AutoMatched);
        assert_eq!(repo.count_by_status(MatchStatus::AutoMatched).unwrap(), 2);
    }

    #[test]
    fn test_save_batch_rolls_back_on_missing_row() {
        let repo = setup();
        let id = repo.insert(&item("摄像机", Some("台"))).unwrap();

        let mut ok = repo.find_by_id(id).unwrap().unwrap();
        ok.remark = Some("已核对".to_string());
        let ghost = ProjectLineItem {
            id: 9999,
            ..Default::default()
        };

        let result = repo.save_batch(&[ok, ghost]);
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));

        let reloaded = repo.find_by_id(id).unwrap().unwrap();
        assert_eq!(reloaded.remark, None, "批量保存失败应整体回滚");
    }

    #[test]
    fn test_find_by_user_and_delete() {
        let repo = setup();
        repo.insert(&item("摄像机", Some("台"))).unwrap();
        let mut other = item("光缆", Some("m"));
        other.user_id = Some(2);
        repo.insert(&other).unwrap();

        assert_eq!(repo.find_by_user_id(1).unwrap().len(), 1);
        assert_eq!(repo.delete_by_user_id(1).unwrap(), 1);
        assert_eq!(repo.find_all().unwrap().len(), 1);
    }
}
