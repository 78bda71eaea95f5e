// ==========================================
// 定额匹配系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod enterprise_quota_repo;
pub mod error;
pub mod item_quota_repo;
pub mod keyword_weight_repo;
pub mod learning_record_repo;
pub mod matching_rule_repo;
pub mod project_item_repo;

// 重导出核心仓储
pub use enterprise_quota_repo::EnterpriseQuotaRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use item_quota_repo::ItemQuotaRepository;
pub use keyword_weight_repo::KeywordWeightRepository;
pub use learning_record_repo::LearningRecordRepository;
pub use matching_rule_repo::MatchingRuleRepository;
pub use project_item_repo::ProjectItemRepository;
