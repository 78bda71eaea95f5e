// ==========================================
// 定额匹配系统 - 引擎层存储接口
// ==========================================
// 职责: 定义引擎访问持久化的 trait，实现依赖倒置
// 实现者: repository 层的 rusqlite 仓储
// 红线: 接口只做数据读写，不含匹配/学习规则
// ==========================================

use crate::domain::learning::{KeywordWeight, LearningRecord, MatchingRule};
use crate::domain::project_item::ProjectLineItem;
use crate::domain::quota::{EnterpriseQuota, ItemQuotaAssociation};
use crate::domain::types::{MatchType, RuleType};
use crate::repository::error::RepositoryResult;
use crate::repository::{
    EnterpriseQuotaRepository, ItemQuotaRepository, KeywordWeightRepository,
    LearningRecordRepository, MatchingRuleRepository, ProjectItemRepository,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

// ==========================================
// Store Traits
// ==========================================

/// 清单条目存储
pub trait ItemStore: Send + Sync {
    fn load_all(&self) -> RepositoryResult<Vec<ProjectLineItem>>;

    fn load_by_id(&self, item_id: i64) -> RepositoryResult<Option<ProjectLineItem>>;

    /// 批量保存（单事务，失败整体回滚）
    fn save_batch(&self, items: &[ProjectLineItem]) -> RepositoryResult<usize>;

    /// 单条保存（批量失败后的降级路径）
    fn save_one(&self, item: &ProjectLineItem) -> RepositoryResult<()>;

    fn delete_associations_for_item(&self, item_id: i64) -> RepositoryResult<usize>;
}

/// 企业定额存储（只读）
pub trait QuotaStore: Send + Sync {
    /// version_id 为 None 时加载全部定额
    fn load_all(&self, version_id: Option<i64>) -> RepositoryResult<Vec<EnterpriseQuota>>;

    fn load_by_id(&self, quota_id: i64) -> RepositoryResult<Option<EnterpriseQuota>>;
}

/// 多定额关联存储
pub trait AssociationStore: Send + Sync {
    /// 按 sort_order 排序
    fn load_by_item(&self, item_id: i64) -> RepositoryResult<Vec<ItemQuotaAssociation>>;

    fn load_by_id(&self, association_id: i64) -> RepositoryResult<Option<ItemQuotaAssociation>>;

    fn save(&self, association: &ItemQuotaAssociation) -> RepositoryResult<i64>;

    fn delete_by_id(&self, association_id: i64) -> RepositoryResult<usize>;

    fn delete_all_for_item(&self, item_id: i64) -> RepositoryResult<usize>;

    fn exists(&self, item_id: i64, quota_id: i64) -> RepositoryResult<bool>;
}

pub trait KeywordWeightStore: Send + Sync {
    fn find_by_keyword(&self, keyword: &str) -> RepositoryResult<Option<KeywordWeight>>;

    fn find_all(&self) -> RepositoryResult<Vec<KeywordWeight>>;

    /// 按关键词 upsert
    fn save_all(&self, weights: &[KeywordWeight]) -> RepositoryResult<usize>;
}

pub trait MatchingRuleStore: Send + Sync {
    /// 置信度严格大于 min_confidence 的规则
    fn find_by_type_above_confidence(
        &self,
        rule_type: RuleType,
        min_confidence: f64,
    ) -> RepositoryResult<Vec<MatchingRule>>;

    fn insert(&self, rule: &MatchingRule) -> RepositoryResult<i64>;

    fn increment_usage(&self, rule_id: i64, delta: i64) -> RepositoryResult<()>;
}

/// 学习记录存储（只追加）
pub trait LearningRecordStore: Send + Sync {
    fn append(&self, record: &LearningRecord) -> RepositoryResult<i64>;

    fn find_all(&self) -> RepositoryResult<Vec<LearningRecord>>;

    fn find_by_types(&self, match_types: &[MatchType]) -> RepositoryResult<Vec<LearningRecord>>;

    fn count(&self) -> RepositoryResult<i64>;
}

// ==========================================
// rusqlite 仓储实现
// ==========================================

impl ItemStore for ProjectItemRepository {
    fn load_all(&self) -> RepositoryResult<Vec<ProjectLineItem>> {
        self.find_all()
    }

    fn load_by_id(&self, item_id: i64) -> RepositoryResult<Option<ProjectLineItem>> {
        self.find_by_id(item_id)
    }

    fn save_batch(&self, items: &[ProjectLineItem]) -> RepositoryResult<usize> {
        ProjectItemRepository::save_batch(self, items)
    }

    fn save_one(&self, item: &ProjectLineItem) -> RepositoryResult<()> {
        self.save(item)
    }

    fn delete_associations_for_item(&self, item_id: i64) -> RepositoryResult<usize> {
        self.delete_associations(item_id)
    }
}

impl QuotaStore for EnterpriseQuotaRepository {
    fn load_all(&self, version_id: Option<i64>) -> RepositoryResult<Vec<EnterpriseQuota>> {
        self.find_all(version_id)
    }

    fn load_by_id(&self, quota_id: i64) -> RepositoryResult<Option<EnterpriseQuota>> {
        self.find_by_id(quota_id)
    }
}

impl AssociationStore for ItemQuotaRepository {
    fn load_by_item(&self, item_id: i64) -> RepositoryResult<Vec<ItemQuotaAssociation>> {
        self.find_by_item_id(item_id)
    }

    fn load_by_id(&self, association_id: i64) -> RepositoryResult<Option<ItemQuotaAssociation>> {
        self.find_by_id(association_id)
    }

    fn save(&self, association: &ItemQuotaAssociation) -> RepositoryResult<i64> {
        self.insert(association)
    }

    fn delete_by_id(&self, association_id: i64) -> RepositoryResult<usize> {
        ItemQuotaRepository::delete_by_id(self, association_id)
    }

    fn delete_all_for_item(&self, item_id: i64) -> RepositoryResult<usize> {
        self.delete_by_item_id(item_id)
    }

    fn exists(&self, item_id: i64, quota_id: i64) -> RepositoryResult<bool> {
        ItemQuotaRepository::exists(self, item_id, quota_id)
    }
}

impl KeywordWeightStore for KeywordWeightRepository {
    fn find_by_keyword(&self, keyword: &str) -> RepositoryResult<Option<KeywordWeight>> {
        KeywordWeightRepository::find_by_keyword(self, keyword)
    }

    fn find_all(&self) -> RepositoryResult<Vec<KeywordWeight>> {
        KeywordWeightRepository::find_all(self)
    }

    fn save_all(&self, weights: &[KeywordWeight]) -> RepositoryResult<usize> {
        KeywordWeightRepository::save_all(self, weights)
    }
}

impl MatchingRuleStore for MatchingRuleRepository {
    fn find_by_type_above_confidence(
        &self,
        rule_type: RuleType,
        min_confidence: f64,
    ) -> RepositoryResult<Vec<MatchingRule>> {
        MatchingRuleRepository::find_by_type_above_confidence(self, rule_type, min_confidence)
    }

    fn insert(&self, rule: &MatchingRule) -> RepositoryResult<i64> {
        MatchingRuleRepository::insert(self, rule)
    }

    fn increment_usage(&self, rule_id: i64, delta: i64) -> RepositoryResult<()> {
        MatchingRuleRepository::increment_usage(self, rule_id, delta)
    }
}

impl LearningRecordStore for LearningRecordRepository {
    fn append(&self, record: &LearningRecord) -> RepositoryResult<i64> {
        LearningRecordRepository::append(self, record)
    }

    fn find_all(&self) -> RepositoryResult<Vec<LearningRecord>> {
        LearningRecordRepository::find_all(self)
    }

    fn find_by_types(&self, match_types: &[MatchType]) -> RepositoryResult<Vec<LearningRecord>> {
        LearningRecordRepository::find_by_types(self, match_types)
    }

    fn count(&self) -> RepositoryResult<i64> {
        LearningRecordRepository::count(self)
    }
}

// ==========================================
// MatchingRepositories - 存储聚合
// ==========================================

/// 匹配与学习引擎所需的全部存储
///
/// 字段为 trait 对象，测试时可以替换任意一个（例如模拟批量保存失败）
#[derive(Clone)]
pub struct MatchingRepositories {
    pub items: Arc<dyn ItemStore>,
    pub quotas: Arc<dyn QuotaStore>,
    pub associations: Arc<dyn AssociationStore>,
    pub keyword_weights: Arc<dyn KeywordWeightStore>,
    pub rules: Arc<dyn MatchingRuleStore>,
    pub learning_records: Arc<dyn LearningRecordStore>,
}

impl MatchingRepositories {
    pub fn new(
        items: Arc<dyn ItemStore>,
        quotas: Arc<dyn QuotaStore>,
        associations: Arc<dyn AssociationStore>,
        keyword_weights: Arc<dyn KeywordWeightStore>,
        rules: Arc<dyn MatchingRuleStore>,
        learning_records: Arc<dyn LearningRecordStore>,
    ) -> Self {
        Self {
            items,
            quotas,
            associations,
            keyword_weights,
            rules,
            learning_records,
        }
    }

    /// 基于同一个连接创建全部 rusqlite 仓储
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            items: Arc::new(ProjectItemRepository::new(conn.clone())),
            quotas: Arc::new(EnterpriseQuotaRepository::new(conn.clone())),
            associations: Arc::new(ItemQuotaRepository::new(conn.clone())),
            keyword_weights: Arc::new(KeywordWeightRepository::new(conn.clone())),
            rules: Arc::new(MatchingRuleRepository::new(conn.clone())),
            learning_records: Arc::new(LearningRecordRepository::new(conn)),
        }
    }

    /// 替换清单条目存储
    pub fn with_item_store(mut self, items: Arc<dyn ItemStore>) -> Self {
        self.items = items;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_with_schema;

    #[test]
    fn test_from_connection_shares_one_database() {
        let conn = Arc::new(Mutex::new(open_in_memory_with_schema().unwrap()));
        let repos = MatchingRepositories::from_connection(conn.clone());

        let item_repo = ProjectItemRepository::new(conn.clone());
        let item_id = item_repo
            .insert(&ProjectLineItem {
                item_name: Some("监控摄像机".to_string()),
                ..Default::default()
            })
            .unwrap();
        let quota_id = EnterpriseQuotaRepository::new(conn)
            .insert(&EnterpriseQuota {
                quota_name: Some("高清摄像机".to_string()),
                unit_price: Some(500.0),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(repos.items.load_all().unwrap().len(), 1);
        let quota = repos.quotas.load_by_id(quota_id).unwrap().unwrap();

        repos
            .associations
            .save(&ItemQuotaAssociation::snapshot(item_id, &quota, 0))
            .unwrap();
        assert!(repos.associations.exists(item_id, quota_id).unwrap());

        assert_eq!(repos.items.delete_associations_for_item(item_id).unwrap(), 1);
        assert!(repos.associations.load_by_item(item_id).unwrap().is_empty(), "关联应被清除");
        assert!(repos.items.load_by_id(item_id).unwrap().is_some(), "条目本身应保留");
    }
}
