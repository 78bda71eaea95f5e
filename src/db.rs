// ==========================================
// 定额匹配系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 幂等建表（schema_version 记录当前版本）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开内存数据库并建表（测试与演示用）
pub fn open_in_memory_with_schema() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    init_schema(&conn)?;
    Ok(conn)
}

/// 幂等建表
///
/// 说明：
/// - project_item_quota 随清单条目级联删除
/// - keyword_weight.keyword 唯一
/// - 关键词列表字段存储为带版本号的 JSON（见 domain::learning::KeywordList）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS enterprise_quota (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            quota_code TEXT,
            quota_name TEXT,
            feature_value TEXT,
            unit TEXT,
            unit_price REAL,
            labor_cost REAL,
            material_cost REAL,
            machine_cost REAL,
            remark TEXT,
            version_id INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_enterprise_quota_version
          ON enterprise_quota(version_id);

        CREATE TABLE IF NOT EXISTS project_item (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER,
            item_code TEXT,
            item_name TEXT,
            feature_value TEXT,
            unit TEXT,
            quantity REAL,
            matched_quota_id INTEGER,
            matched_quota_code TEXT,
            matched_quota_name TEXT,
            matched_quota_feature_value TEXT,
            matched_unit_price REAL,
            total_price REAL,
            match_status INTEGER NOT NULL DEFAULT 0,
            remark TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_project_item_status
          ON project_item(match_status);

        CREATE TABLE IF NOT EXISTS project_item_quota (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_item_id INTEGER NOT NULL REFERENCES project_item(id) ON DELETE CASCADE,
            quota_id INTEGER NOT NULL,
            quota_code TEXT,
            quota_name TEXT,
            quota_feature_value TEXT,
            unit_price REAL,
            sort_order INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_project_item_quota_item
          ON project_item_quota(project_item_id, sort_order);

        CREATE TABLE IF NOT EXISTS keyword_weight (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            keyword TEXT NOT NULL UNIQUE,
            weight REAL NOT NULL DEFAULT 1.0,
            match_count REAL NOT NULL DEFAULT 0,
            total_count INTEGER NOT NULL DEFAULT 0,
            success_rate REAL NOT NULL DEFAULT 0,
            is_core_concept INTEGER NOT NULL DEFAULT 0,
            update_time TEXT
        );

        CREATE TABLE IF NOT EXISTS matching_rule (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            rule_type TEXT NOT NULL,
            source_text TEXT NOT NULL,
            target_text TEXT NOT NULL,
            rule_value TEXT NOT NULL,
            confidence REAL NOT NULL DEFAULT 0,
            usage_count INTEGER NOT NULL DEFAULT 0,
            create_time TEXT,
            update_time TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_matching_rule_type
          ON matching_rule(rule_type, confidence);

        CREATE TABLE IF NOT EXISTS matching_learning_record (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_name TEXT,
            item_feature_value TEXT,
            quota_name TEXT,
            quota_feature_value TEXT,
            match_score REAL NOT NULL,
            match_type INTEGER NOT NULL,
            item_keywords TEXT NOT NULL,
            quota_keywords TEXT NOT NULL,
            common_keywords TEXT NOT NULL,
            learning_weight REAL NOT NULL,
            create_time TEXT,
            update_time TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_learning_record_type
          ON matching_learning_record(match_type, create_time);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 启动时的 schema 版本检查（仅告警，不做自动迁移）
pub fn warn_if_schema_outdated(conn: &Connection) {
    match read_schema_version(conn) {
        Ok(Some(v)) if v < CURRENT_SCHEMA_VERSION => {
            tracing::warn!(
                found = v,
                expected = CURRENT_SCHEMA_VERSION,
                "数据库 schema 版本落后，可能需要迁移"
            );
        }
        Ok(None) => tracing::warn!("未找到 schema_version 表，请先执行 init"),
        Err(e) => tracing::warn!("读取 schema_version 失败: {}", e),
        _ => {}
    }
}
