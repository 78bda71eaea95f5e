// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 临时数据库、测试数据构造、引擎装配
// ==========================================
#![allow(dead_code)]

use quota_match::config::MatchingConfig;
use quota_match::db;
use quota_match::domain::{EnterpriseQuota, ProjectLineItem};
use quota_match::engine::{
    BatchMatchCoordinator, LearningEngine, MatchingRepositories, OptionalEventPublisher,
    PooledLearningPublisher,
};
use quota_match::repository::{EnterpriseQuotaRepository, ProjectItemRepository};
use quota_match::QuotaMatchApi;
use rusqlite::Connection;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_string_lossy().to_string();

    let conn = db::open_sqlite_connection(&db_path)?;
    db::init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 打开测试数据库连接（共享连接）
pub fn open_shared(db_path: &str) -> Arc<Mutex<Connection>> {
    Arc::new(Mutex::new(
        db::open_sqlite_connection(db_path).expect("Failed to open test db"),
    ))
}

// ==========================================
// 测试数据构造
// ==========================================

pub fn quota(name: &str, feature: Option<&str>, price: f64) -> EnterpriseQuota {
    EnterpriseQuota {
        quota_code: Some(format!("Q-{}", name)),
        quota_name: Some(name.to_string()),
        feature_value: feature.map(str::to_string),
        unit: Some("台".to_string()),
        unit_price: Some(price),
        ..Default::default()
    }
}

pub fn item(name: &str, unit: Option<&str>, quantity: f64) -> ProjectLineItem {
    ProjectLineItem {
        item_name: Some(name.to_string()),
        unit: unit.map(str::to_string),
        quantity: Some(quantity),
        ..Default::default()
    }
}

// ==========================================
// 测试环境
// ==========================================

/// 一个临时数据库 + 全部仓储 + 引擎
pub struct TestEnv {
    _temp_file: NamedTempFile,
    pub db_path: String,
    pub conn: Arc<Mutex<Connection>>,
    pub repos: MatchingRepositories,
    pub item_repo: ProjectItemRepository,
    pub quota_repo: EnterpriseQuotaRepository,
    pub config: MatchingConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(MatchingConfig::default())
    }

    pub fn with_config(config: MatchingConfig) -> Self {
        let (temp_file, db_path) = create_test_db().expect("Failed to create test db");
        let conn = open_shared(&db_path);
        Self {
            _temp_file: temp_file,
            db_path,
            repos: MatchingRepositories::from_connection(conn.clone()),
            item_repo: ProjectItemRepository::new(conn.clone()),
            quota_repo: EnterpriseQuotaRepository::new(conn.clone()),
            conn,
            config,
        }
    }

    pub fn insert_quota(&self, quota: &EnterpriseQuota) -> i64 {
        self.quota_repo.insert(quota).expect("Failed to insert quota")
    }

    pub fn insert_item(&self, item: &ProjectLineItem) -> i64 {
        self.item_repo.insert(item).expect("Failed to insert item")
    }

    pub fn load_item(&self, id: i64) -> ProjectLineItem {
        self.item_repo
            .find_by_id(id)
            .expect("Failed to load item")
            .expect("item should exist")
    }

    pub fn learning_engine(&self) -> Arc<LearningEngine> {
        Arc::new(LearningEngine::new(self.repos.clone(), &self.config))
    }

    /// 不发布学习事件的协调器
    pub fn coordinator(&self) -> BatchMatchCoordinator {
        self.coordinator_with(self.repos.clone(), OptionalEventPublisher::none())
    }

    pub fn coordinator_with(
        &self,
        repos: MatchingRepositories,
        publisher: OptionalEventPublisher,
    ) -> BatchMatchCoordinator {
        let learning = Arc::new(LearningEngine::new(repos.clone(), &self.config));
        BatchMatchCoordinator::new(repos, learning, publisher, self.config.clone())
            .expect("Failed to create coordinator")
    }

    /// 装配带学习线程池的 API；返回的发布者用于在断言前等待学习记录写完
    pub fn api_with_learning(&self) -> (QuotaMatchApi, Arc<PooledLearningPublisher>) {
        let learning = self.learning_engine();
        let pooled = Arc::new(
            PooledLearningPublisher::new(learning.clone(), &self.config)
                .expect("Failed to start learning pool"),
        );
        let publisher = OptionalEventPublisher::with_publisher(pooled.clone());
        let coordinator = Arc::new(
            BatchMatchCoordinator::new(
                self.repos.clone(),
                learning.clone(),
                publisher.clone(),
                self.config.clone(),
            )
            .expect("Failed to create coordinator"),
        );
        (
            QuotaMatchApi::new(self.repos.clone(), coordinator, learning, publisher),
            pooled,
        )
    }
}
