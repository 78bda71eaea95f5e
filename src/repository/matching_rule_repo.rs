// ==========================================
// 定额匹配系统 - 匹配规则仓储
// ==========================================
// rule_value 以 KeywordList 存储格式落库
// ==========================================

use crate::domain::learning::{KeywordList, MatchingRule};
use crate::domain::types::RuleType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::Local;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct MatchingRuleRepository {
    conn: Arc<Mutex<Connection>>,
}

/// 数据库原始行（rule_type / rule_value 仍为文本）
struct RawRuleRow {
    id: i64,
    rule_type: String,
    source_text: String,
    target_text: String,
    rule_value: String,
    confidence: f64,
    usage_count: i64,
    create_time: Option<chrono::NaiveDateTime>,
    update_time: Option<chrono::NaiveDateTime>,
}

impl RawRuleRow {
    fn into_rule(self) -> RepositoryResult<MatchingRule> {
        let rule_type = RuleType::from_str(&self.rule_type).ok_or_else(|| {
            RepositoryError::ValidationError(format!("未知规则类型: {}", self.rule_type))
        })?;
        let rule_value = KeywordList::from_storage(&self.rule_value)
            .map_err(|e| RepositoryError::serialization("rule_value", e))?;
        Ok(MatchingRule {
            id: Some(self.id),
            rule_type,
            source_text: self.source_text,
            target_text: self.target_text,
            rule_value,
            confidence: self.confidence,
            usage_count: self.usage_count,
            create_time: self.create_time,
            update_time: self.update_time,
        })
    }
}

impl MatchingRuleRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入规则，返回自增 ID
    pub fn insert(&self, rule: &MatchingRule) -> RepositoryResult<i64> {
        let payload = rule
            .rule_value
            .to_storage()
            .map_err(|e| RepositoryError::serialization("rule_value", e))?;
        let now = Local::now().naive_local();

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO matching_rule (
                rule_type, source_text, target_text, rule_value,
                confidence, usage_count, create_time, update_time
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
            "#,
            params![
                rule.rule_type.as_str(),
                rule.source_text,
                rule.target_text,
                payload,
                rule.confidence,
                rule.usage_count,
                now,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 查询某类型且置信度严格大于阈值的规则（按置信度降序）
    pub fn find_by_type_above_confidence(
        &self,
        rule_type: RuleType,
        min_confidence: f64,
    ) -> RepositoryResult<Vec<MatchingRule>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, rule_type, source_text, target_text, rule_value,
                   confidence, usage_count, create_time, update_time
            FROM matching_rule
            WHERE rule_type = ?1 AND confidence > ?2
            ORDER BY confidence DESC, id ASC
            "#,
        )?;
        let raw = stmt
            .query_map(params![rule_type.as_str(), min_confidence], |row| {
                Ok(RawRuleRow {
                    id: row.get(0)?,
                    rule_type: row.get(1)?,
                    source_text: row.get(2)?,
                    target_text: row.get(3)?,
                    rule_value: row.get(4)?,
                    confidence: row.get(5)?,
                    usage_count: row.get(6)?,
                    create_time: row.get(7)?,
                    update_time: row.get(8)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter().map(RawRuleRow::into_rule).collect()
    }

    /// 规则命中计数累加
    pub fn increment_usage(&self, rule_id: i64, delta: i64) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let rows = conn.execute(
            "UPDATE matching_rule SET usage_count = usage_count + ?2, update_time = ?3 WHERE id = ?1",
            params![rule_id, delta, Local::now().naive_local()],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("MatchingRule", rule_id));
        }
        Ok(())
    }
}
