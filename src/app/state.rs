// ==========================================
// 定额匹配系统 - 应用状态
// ==========================================
// 职责: 打开数据库、加载配置、装配仓储/引擎/API 实例
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::api::QuotaMatchApi;
use crate::config::{ConfigManager, MatchingConfig};
use crate::db;
use crate::engine::{
    BatchMatchCoordinator, LearningEngine, LearningScheduler, MatchingRepositories,
    OptionalEventPublisher, PooledLearningPublisher,
};

/// 应用状态
///
/// 命令行的各子命令共享同一个实例
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 共享连接
    pub conn: Arc<Mutex<Connection>>,

    pub config_manager: Arc<ConfigManager>,

    /// 启动时解析的匹配配置
    pub config: MatchingConfig,

    pub learning_engine: Arc<LearningEngine>,

    /// 学习事件消费者（独立线程池）
    pub learning_publisher: Arc<PooledLearningPublisher>,

    pub quota_match_api: Arc<QuotaMatchApi>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 该方法会：
    /// 1. 打开数据库并幂等建表
    /// 2. 从 config_kv 解析匹配配置
    /// 3. 初始化学习引擎、学习事件线程池、批量匹配协调器
    /// 4. 创建 QuotaMatchApi
    pub async fn new(db_path: String) -> Result<Self, String> {
        tracing::info!("初始化AppState，数据库路径: {}", db_path);

        let conn = db::open_sqlite_connection(&db_path)
            .map_err(|e| format!("无法打开数据库: {}", e))?;
        db::init_schema(&conn).map_err(|e| format!("数据库建表失败: {}", e))?;
        db::warn_if_schema_outdated(&conn);
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 配置
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let config = MatchingConfig::load(config_manager.as_ref())
            .await
            .map_err(|e| format!("加载匹配配置失败: {}", e))?;
        tracing::info!(
            "匹配配置: batch_size={}, pool={}+{}, threshold={}",
            config.matching_batch_size,
            config.pool_size,
            config.pool_queue_capacity,
            config.match_threshold
        );

        // ==========================================
        // 引擎
        // ==========================================
        let repos = MatchingRepositories::from_connection(conn.clone());
        let learning_engine = Arc::new(LearningEngine::new(repos.clone(), &config));
        let learning_publisher = Arc::new(
            PooledLearningPublisher::new(learning_engine.clone(), &config)
                .map_err(|e| format!("无法启动学习线程池: {}", e))?,
        );
        let publisher = OptionalEventPublisher::with_publisher(learning_publisher.clone());

        let coordinator = Arc::new(
            BatchMatchCoordinator::new(
                repos.clone(),
                learning_engine.clone(),
                publisher.clone(),
                config.clone(),
            )
            .map_err(|e| format!("无法启动匹配线程池: {}", e))?,
        );

        // ==========================================
        // API
        // ==========================================
        let quota_match_api = Arc::new(QuotaMatchApi::new(
            repos,
            coordinator,
            learning_engine.clone(),
            publisher,
        ));

        tracing::info!("AppState初始化完成");
        Ok(Self {
            db_path,
            conn,
            config_manager,
            config,
            learning_engine,
            learning_publisher,
            quota_match_api,
        })
    }

    pub fn learning_scheduler(&self) -> LearningScheduler {
        LearningScheduler::from_config(self.learning_engine.clone(), &self.config)
    }

    /// 停止学习线程池并等待已入队事件写完
    pub fn shutdown(&self) {
        self.learning_publisher.shutdown();
    }
}

/// 默认数据库路径
///
/// 优先级: QUOTA_MATCH_DB_PATH 环境变量 > 用户数据目录 > 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("QUOTA_MATCH_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./quota_match.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("quota-match");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("quota_match.db");
        }
    }

    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_default_db_path() {
        let path = get_default_db_path();
        assert!(!path.is_empty());
    }

    #[tokio::test]
    async fn test_app_state_wires_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.db").to_string_lossy().to_string();

        let state = AppState::new(db_path.clone()).await.unwrap();
        assert_eq!(state.db_path, db_path);
        assert_eq!(state.config, MatchingConfig::default(), "空配置表应得到默认配置");
        assert_eq!(state.quota_match_api.batch_match(None).unwrap(), 0);
        state.shutdown();
    }
}
