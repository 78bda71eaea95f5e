// ==========================================
// 定额匹配系统 - 定额匹配 API
// ==========================================
// 职责: 批量匹配入口、人工单定额/单价设置、多定额管理
// 约束: 人工操作写入的状态(2/3)不会被批量匹配覆盖
// 学习: 人工操作只发布学习事件，记录失败不影响操作结果
// ==========================================

use std::sync::Arc;
use tracing::instrument;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::project_item::ProjectLineItem;
use crate::domain::quota::{sum_unit_prices, EnterpriseQuota, ItemQuotaAssociation};
use crate::domain::types::{round_money, MatchStatus, MatchType};
use crate::engine::batch_match::{BatchMatchCoordinator, BatchMatchReport};
use crate::engine::events::{LearningEvent, LearningEventSource, OptionalEventPublisher};
use crate::engine::learning::{BootstrapSummary, LearningEngine, LearningPassSummary};
use crate::engine::stores::MatchingRepositories;

/// 人工操作的学习事件分值
const MANUAL_MATCH_SCORE: f64 = 1.0;

// ==========================================
// QuotaMatchApi
// ==========================================

/// 定额匹配API
///
/// 职责：
/// 1. 批量自动匹配（委托 BatchMatchCoordinator）
/// 2. 人工设置单定额 / 单价
/// 3. 多定额关联的增删查
/// 4. 学习分析入口
pub struct QuotaMatchApi {
    repos: MatchingRepositories,
    coordinator: Arc<BatchMatchCoordinator>,
    learning: Arc<LearningEngine>,
    publisher: OptionalEventPublisher,
}

impl QuotaMatchApi {
    pub fn new(
        repos: MatchingRepositories,
        coordinator: Arc<BatchMatchCoordinator>,
        learning: Arc<LearningEngine>,
        publisher: OptionalEventPublisher,
    ) -> Self {
        Self {
            repos,
            coordinator,
            learning,
            publisher,
        }
    }

    // ==========================================
    // 批量匹配
    // ==========================================

    /// 批量匹配，返回本次自动匹配成功的条目数
    pub fn batch_match(&self, version_id: Option<i64>) -> ApiResult<usize> {
        Ok(self.run_batch_match(version_id)?.matched)
    }

    /// 批量匹配并返回完整运行报告
    pub fn run_batch_match(&self, version_id: Option<i64>) -> ApiResult<BatchMatchReport> {
        Ok(self.coordinator.run(version_id)?)
    }

    // ==========================================
    // 人工单定额
    // ==========================================

    /// 人工指定单个定额
    ///
    /// 清除已有多定额关联，状态置为手动单定额，并以高权重发布学习事件
    #[instrument(skip(self))]
    pub fn set_manual_match(&self, item_id: i64, quota_id: i64) -> ApiResult<ProjectLineItem> {
        let mut item = self.require_item(item_id)?;
        let quota = self.require_quota(quota_id)?;

        self.repos.items.delete_associations_for_item(item_id)?;
        item.apply_quota(&quota, MatchStatus::ManualSingle);
        self.repos.items.save_one(&item)?;

        tracing::info!(
            "人工设置定额: item_id={}, quota_id={}, total_price={:?}",
            item_id,
            quota_id,
            item.total_price
        );

        self.publisher.publish(LearningEvent::new(
            item.clone(),
            quota,
            MANUAL_MATCH_SCORE,
            MatchType::ManualSingle,
            LearningEventSource::ManualMatch,
        ));
        Ok(item)
    }

    /// 人工指定单价（不关联定额）
    #[instrument(skip(self))]
    pub fn set_manual_price(&self, item_id: i64, unit_price: f64) -> ApiResult<ProjectLineItem> {
        if !unit_price.is_finite() || unit_price < 0.0 {
            return Err(ApiError::InvalidInput(format!(
                "单价必须为非负数: {}",
                unit_price
            )));
        }
        let mut item = self.require_item(item_id)?;

        self.repos.items.delete_associations_for_item(item_id)?;
        item.matched_unit_price = Some(round_money(unit_price));
        item.match_status = MatchStatus::ManualSingle;
        item.recompute_total();
        self.repos.items.save_one(&item)?;

        tracing::info!(
            "人工设置单价: item_id={}, unit_price={}, total_price={:?}",
            item_id,
            unit_price,
            item.total_price
        );
        Ok(item)
    }

    // ==========================================
    // 多定额管理
    // ==========================================

    /// 为条目追加一个定额（多定额）
    #[instrument(skip(self))]
    pub fn add_quota(&self, item_id: i64, quota_id: i64) -> ApiResult<ItemQuotaAssociation> {
        let mut item = self.require_item(item_id)?;
        let quota = self.require_quota(quota_id)?;

        let existing = self.repos.associations.load_by_item(item_id)?;
        if existing.iter().any(|a| a.quota_id == quota_id) {
            return Err(ApiError::DuplicateAssociation { item_id, quota_id });
        }

        // 追加到末尾；中间关联被移除后条数会小于最大序号
        let sort_order = existing.iter().map(|a| a.sort_order).max().map_or(0, |max| max + 1);
        let mut association = ItemQuotaAssociation::snapshot(item_id, &quota, sort_order);
        association.id = self.repos.associations.save(&association)?;

        item.match_status = MatchStatus::ManualMulti;
        self.refresh_multi_total(&mut item)?;
        self.repos.items.save_one(&item)?;

        tracing::info!(
            "添加多定额: item_id={}, quota_id={}, sort_order={}, unit_price_sum={:?}",
            item_id,
            quota_id,
            association.sort_order,
            item.matched_unit_price
        );

        self.publisher.publish(LearningEvent::new(
            item,
            quota,
            MANUAL_MATCH_SCORE,
            MatchType::ManualMulti,
            LearningEventSource::MultiQuota,
        ));
        Ok(association)
    }

    /// 移除条目的一个定额关联
    ///
    /// 移除最后一个关联后状态保持为多定额，单价与合价置空
    #[instrument(skip(self))]
    pub fn remove_quota(&self, item_id: i64, association_id: i64) -> ApiResult<ProjectLineItem> {
        let mut item = self.require_item(item_id)?;

        match self.repos.associations.load_by_id(association_id)? {
            Some(assoc) if assoc.project_item_id == item_id => {}
            _ => {
                return Err(ApiError::NotFound(format!(
                    "定额关联(id={})不存在于清单条目(id={})",
                    association_id, item_id
                )))
            }
        }

        self.repos.associations.delete_by_id(association_id)?;
        self.refresh_multi_total(&mut item)?;
        self.repos.items.save_one(&item)?;

        tracing::info!(
            "移除多定额: item_id={}, association_id={}, unit_price_sum={:?}",
            item_id,
            association_id,
            item.matched_unit_price
        );
        Ok(item)
    }

    /// 清空条目的全部定额关联，条目回到未匹配
    #[instrument(skip(self))]
    pub fn clear_quotas(&self, item_id: i64) -> ApiResult<ProjectLineItem> {
        let mut item = self.require_item(item_id)?;

        let removed = self.repos.associations.delete_all_for_item(item_id)?;
        item.mark_unmatched();
        self.repos.items.save_one(&item)?;

        tracing::info!("清空多定额: item_id={}, removed={}", item_id, removed);
        Ok(item)
    }

    /// 条目的定额关联（按 sort_order 排序）
    pub fn list_quotas_for_item(&self, item_id: i64) -> ApiResult<Vec<ItemQuotaAssociation>> {
        Ok(self.repos.associations.load_by_item(item_id)?)
    }

    // ==========================================
    // 学习分析
    // ==========================================

    pub fn run_learning_analysis(&self) -> ApiResult<LearningPassSummary> {
        Ok(self.learning.run_analysis()?)
    }

    pub fn collect_all_match_data(&self) -> ApiResult<BootstrapSummary> {
        Ok(self.learning.collect_all_match_data()?)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn require_item(&self, item_id: i64) -> ApiResult<ProjectLineItem> {
        self.repos
            .items
            .load_by_id(item_id)?
            .ok_or_else(|| ApiError::NotFound(format!("项目清单(id={})不存在", item_id)))
    }

    fn require_quota(&self, quota_id: i64) -> ApiResult<EnterpriseQuota> {
        self.repos
            .quotas
            .load_by_id(quota_id)?
            .ok_or_else(|| ApiError::NotFound(format!("企业定额(id={})不存在", quota_id)))
    }

    /// 按剩余关联重算单价与合价
    fn refresh_multi_total(&self, item: &mut ProjectLineItem) -> ApiResult<()> {
        let associations = self.repos.associations.load_by_item(item.id)?;
        if associations.is_empty() {
            item.matched_unit_price = None;
            item.total_price = None;
        } else {
            item.matched_unit_price = Some(round_money(sum_unit_prices(&associations)));
            item.recompute_total();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchingConfig;
    use crate::db::open_in_memory_with_schema;
    use crate::repository::{EnterpriseQuotaRepository, ProjectItemRepository};
    use std::sync::Mutex;

    struct Fixture {
        api: QuotaMatchApi,
        item_repo: ProjectItemRepository,
        quota_repo: EnterpriseQuotaRepository,
    }

    fn fixture() -> Fixture {
        let conn = Arc::new(Mutex::new(open_in_memory_with_schema().unwrap()));
        let repos = MatchingRepositories::from_connection(conn.clone());
        let config = MatchingConfig::default();
        let learning = Arc::new(LearningEngine::new(repos.clone(), &config));
        let coordinator = Arc::new(
            BatchMatchCoordinator::new(
                repos.clone(),
                learning.clone(),
                OptionalEventPublisher::none(),
                config,
            )
            .unwrap(),
        );
        Fixture {
            api: QuotaMatchApi::new(repos, coordinator, learning, OptionalEventPublisher::none()),
            item_repo: ProjectItemRepository::new(conn.clone()),
            quota_repo: EnterpriseQuotaRepository::new(conn),
        }
    }

    fn seed_item(f: &Fixture, quantity: Option<f64>) -> i64 {
        f.item_repo
            .insert(&ProjectLineItem {
                item_name: Some("网络交换机".to_string()),
                unit: Some("台".to_string()),
                quantity,
                ..Default::default()
            })
            .unwrap()
    }

    fn seed_quota(f: &Fixture, name: &str, price: f64) -> i64 {
        f.quota_repo
            .insert(&EnterpriseQuota {
                quota_name: Some(name.to_string()),
                unit_price: Some(price),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn test_scenario_multi_quota_totals() {
        let f = fixture();
        let item_id = seed_item(&f, Some(3.0));
        let q1 = seed_quota(&f, "交换机安装", 10.0);
        let q2 = seed_quota(&f, "交换机调试", 15.0);

        f.api.add_quota(item_id, q1).unwrap();
        let second = f.api.add_quota(item_id, q2).unwrap();
        assert_eq!(second.sort_order, 1, "第二个关联的排序号应为 1");

        let item = f.item_repo.find_by_id(item_id).unwrap().unwrap();
        assert_eq!(item.match_status, MatchStatus::ManualMulti);
        assert_eq!(item.matched_unit_price, Some(25.0));
        assert_eq!(item.total_price, Some(75.0), "合价应为 (10+15)×3");

        let first = f.api.list_quotas_for_item(item_id).unwrap()[0].id;
        let item = f.api.remove_quota(item_id, first).unwrap();
        assert_eq!(item.total_price, Some(45.0));
        assert_eq!(item.match_status, MatchStatus::ManualMulti);
    }

    #[test]
    fn test_duplicate_quota_rejected() {
        let f = fixture();
        let item_id = seed_item(&f, Some(1.0));
        let quota_id = seed_quota(&f, "交换机安装", 10.0);

        f.api.add_quota(item_id, quota_id).unwrap();
        let err = f.api.add_quota(item_id, quota_id).unwrap_err();
        assert!(matches!(err, ApiError::DuplicateAssociation { .. }));
        assert_eq!(f.api.list_quotas_for_item(item_id).unwrap().len(), 1, "不应重复插入");
    }

    #[test]
    fn test_remove_last_quota_keeps_status() {
        let f = fixture();
        let item_id = seed_item(&f, Some(2.0));
        let quota_id = seed_quota(&f, "交换机安装", 10.0);
        let assoc = f.api.add_quota(item_id, quota_id).unwrap();

        let item = f.api.remove_quota(item_id, assoc.id).unwrap();
        assert_eq!(item.match_status, MatchStatus::ManualMulti, "状态保持多定额");
        assert_eq!(item.matched_unit_price, None);
        assert_eq!(item.total_price, None);
    }

    #[test]
    fn test_set_manual_match_clears_associations() {
        let f = fixture();
        let item_id = seed_item(&f, Some(4.0));
        let q1 = seed_quota(&f, "交换机安装", 10.0);
        let q2 = seed_quota(&f, "核心交换机", 250.0);
        f.api.add_quota(item_id, q1).unwrap();

        let item = f.api.set_manual_match(item_id, q2).unwrap();
        assert_eq!(item.match_status, MatchStatus::ManualSingle);
        assert_eq!(item.matched_quota_id, Some(q2));
        assert_eq!(item.total_price, Some(1000.0));
        assert!(f.api.list_quotas_for_item(item_id).unwrap().is_empty(), "多定额关联应被清除");
    }

    #[test]
    fn test_set_manual_price() {
        let f = fixture();
        let item_id = seed_item(&f, Some(2.5));

        let item = f.api.set_manual_price(item_id, 12.0).unwrap();
        assert_eq!(item.match_status, MatchStatus::ManualSingle);
        assert_eq!(item.total_price, Some(30.0));

        let err = f.api.set_manual_price(item_id, -1.0).unwrap_err();
        assert!(matches!(err, ApiError::InvalidInput(_)));
    }

    #[test]
    fn test_clear_quotas_resets_item() {
        let f = fixture();
        let item_id = seed_item(&f, Some(1.0));
        let quota_id = seed_quota(&f, "交换机安装", 10.0);
        f.api.add_quota(item_id, quota_id).unwrap();

        let item = f.api.clear_quotas(item_id).unwrap();
        assert_eq!(item.match_status, MatchStatus::Unmatched);
        assert_eq!(item.matched_unit_price, None);
        assert_eq!(item.total_price, None);
        assert!(f.api.list_quotas_for_item(item_id).unwrap().is_empty());
    }

    #[test]
    fn test_not_found_errors() {
        let f = fixture();
        let item_id = seed_item(&f, Some(1.0));

        assert!(matches!(f.api.set_manual_match(999, 1), Err(ApiError::NotFound(_))));
        assert!(matches!(f.api.add_quota(item_id, 999), Err(ApiError::NotFound(_))));
        assert!(matches!(f.api.remove_quota(item_id, 999), Err(ApiError::NotFound(_))));
        assert!(matches!(f.api.clear_quotas(999), Err(ApiError::NotFound(_))));
    }
}
