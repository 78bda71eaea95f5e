// ==========================================
// 定额匹配系统 - 核心库
// ==========================================
// 工程量清单条目 → 企业定额 自动匹配
// 匹配结果持续反馈到学习引擎（关键词权重 / 同义词规则）
// 技术栈: Rust + SQLite + tokio
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 匹配与学习
pub mod engine;

// 导入层 - CSV 数据
pub mod importer;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{MatchStatus, MatchType, RuleType};

// 领域实体
pub use domain::{
    EnterpriseQuota, ItemQuotaAssociation, KeywordWeight, LearningRecord, MatchingRule,
    ProjectLineItem,
};

// 引擎
pub use engine::{
    BatchMatchCoordinator, BatchMatchReport, KeywordExtractor, LearningEngine, LearningScheduler,
    MatchCache, SimilarityScorer,
};

// API
pub use api::{ApiError, ApiResult, QuotaMatchApi};

// 配置
pub use config::MatchingConfig;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "定额匹配系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
