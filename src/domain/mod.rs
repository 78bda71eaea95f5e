// ==========================================
// 定额匹配系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod learning;
pub mod project_item;
pub mod quota;
pub mod types;

// 重导出核心类型
pub use learning::{KeywordList, KeywordWeight, LearningRecord, MatchingRule};
pub use project_item::ProjectLineItem;
pub use quota::{EnterpriseQuota, ItemQuotaAssociation};
pub use types::{round_money, MatchStatus, MatchType, RuleType};
