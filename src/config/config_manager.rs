// ==========================================
// 定额匹配系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::matching_config::*;
use crate::config::matching_config_trait::{ConfigResult, MatchingConfigReader};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::BTreeMap;
use std::error::Error;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error + Send + Sync>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![GLOBAL_SCOPE, key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    /// 读取并解析配置；缺失或格式错误时返回默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = %default,
                    "配置值格式错误，使用默认值"
                );
                Ok(default)
            }
        }
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 用途
    /// - 匹配运行日志中记录当时生效的配置
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

// ==========================================
// MatchingConfigReader Trait 实现
// ==========================================
#[async_trait]
impl MatchingConfigReader for ConfigManager {
    async fn get_matching_batch_size(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::MATCHING_BATCH_SIZE, DEFAULT_MATCHING_BATCH_SIZE)
    }

    async fn get_save_batch_size(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::SAVE_BATCH_SIZE, DEFAULT_SAVE_BATCH_SIZE)
    }

    async fn get_pool_size(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::POOL_SIZE, DEFAULT_POOL_SIZE)
    }

    async fn get_pool_queue_capacity(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::POOL_QUEUE_CAPACITY, DEFAULT_POOL_QUEUE_CAPACITY)
    }

    async fn get_await_timeout_secs(&self) -> ConfigResult<u64> {
        self.get_parsed_or_default(config_keys::AWAIT_TIMEOUT_SECS, DEFAULT_AWAIT_TIMEOUT_SECS)
    }

    async fn get_learning_pool_size(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::LEARNING_POOL_SIZE, DEFAULT_LEARNING_POOL_SIZE)
    }

    async fn get_learning_queue_capacity(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(
            config_keys::LEARNING_QUEUE_CAPACITY,
            DEFAULT_LEARNING_QUEUE_CAPACITY,
        )
    }

    async fn get_match_threshold(&self) -> ConfigResult<f64> {
        self.get_parsed_or_default(config_keys::MATCH_THRESHOLD, DEFAULT_MATCH_THRESHOLD)
    }

    async fn get_early_exit_score(&self) -> ConfigResult<f64> {
        self.get_parsed_or_default(config_keys::EARLY_EXIT_SCORE, DEFAULT_EARLY_EXIT_SCORE)
    }

    async fn get_learning_min_records(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::LEARNING_MIN_RECORDS, DEFAULT_LEARNING_MIN_RECORDS)
    }

    async fn get_synonym_min_manual_records(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(
            config_keys::SYNONYM_MIN_MANUAL_RECORDS,
            DEFAULT_SYNONYM_MIN_MANUAL_RECORDS,
        )
    }

    async fn get_learning_interval_hours(&self) -> ConfigResult<u64> {
        self.get_parsed_or_default(
            config_keys::LEARNING_INTERVAL_HOURS,
            DEFAULT_LEARNING_INTERVAL_HOURS,
        )
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 批处理
    pub const MATCHING_BATCH_SIZE: &str = "matching_batch_size";
    pub const SAVE_BATCH_SIZE: &str = "save_batch_size";

    // 匹配线程池
    pub const POOL_SIZE: &str = "pool_size";
    pub const POOL_QUEUE_CAPACITY: &str = "pool_queue_capacity";
    pub const AWAIT_TIMEOUT_SECS: &str = "await_timeout_secs";

    // 学习线程池
    pub const LEARNING_POOL_SIZE: &str = "learning_pool_size";
    pub const LEARNING_QUEUE_CAPACITY: &str = "learning_queue_capacity";

    // 评分
    pub const MATCH_THRESHOLD: &str = "match_threshold";
    pub const EARLY_EXIT_SCORE: &str = "early_exit_score";

    // 学习
    pub const LEARNING_MIN_RECORDS: &str = "learning_min_records";
    pub const SYNONYM_MIN_MANUAL_RECORDS: &str = "synonym_min_manual_records";
    pub const LEARNING_INTERVAL_HOURS: &str = "learning_interval_hours";
}
