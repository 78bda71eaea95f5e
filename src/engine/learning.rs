// ==========================================
// 定额匹配系统 - 匹配学习引擎
// ==========================================
// 职责: 记录匹配结果 / 重算关键词权重 / 挖掘同义词规则
// 输出: 关键词权重与同义词规则，在下一次批量匹配开始时加载
// 红线: 记录失败只记日志，绝不影响匹配结果的持久化
// ==========================================

use crate::config::MatchingConfig;
use crate::domain::learning::{KeywordList, KeywordWeight, LearningRecord, MatchingRule};
use crate::domain::project_item::ProjectLineItem;
use crate::domain::quota::EnterpriseQuota;
use crate::domain::types::{MatchStatus, MatchType, RuleType};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{LearningEvent, LearningEventPublisher};
use crate::engine::keyword_extractor::KeywordExtractor;
use crate::engine::lexicon::Lexicon;
use crate::engine::stores::MatchingRepositories;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::instrument;

/// 自动匹配记录的学习权重
pub const AUTO_LEARNING_WEIGHT: f64 = 0.5;
/// 人工修正记录的学习权重
pub const MANUAL_LEARNING_WEIGHT: f64 = 1.0;
/// 同义词规则生效的置信度下限（严格大于）
pub const SYNONYM_CONFIDENCE_FLOOR: f64 = 0.7;
/// 关键词需覆盖组内不同条目名称的比例
const SYNONYM_COVERAGE: f64 = 0.6;
/// 存量数据回灌时使用的匹配得分
const BOOTSTRAP_SCORE: f64 = 0.5;

fn learning_weight_for(match_type: MatchType) -> f64 {
    if match_type.is_manual() {
        MANUAL_LEARNING_WEIGHT
    } else {
        AUTO_LEARNING_WEIGHT
    }
}

// ==========================================
// 结果类型
// ==========================================

/// 学习到的知识（下一次批量匹配使用）
#[derive(Debug, Clone, Default)]
pub struct LearnedKnowledge {
    pub keyword_weights: HashMap<String, f64>,
    pub synonyms: Vec<MatchingRule>,
}

impl LearnedKnowledge {
    pub fn is_empty(&self) -> bool {
        self.keyword_weights.is_empty() && self.synonyms.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeightAnalysisSummary {
    pub records: usize,
    pub keywords_updated: usize,
    /// 记录数不足时跳过
    pub skipped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SynonymDiscoverySummary {
    pub manual_records: usize,
    pub groups_analyzed: usize,
    pub rules_created: usize,
    pub skipped: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LearningPassSummary {
    pub weights: WeightAnalysisSummary,
    pub synonyms: SynonymDiscoverySummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BootstrapSummary {
    pub items_scanned: usize,
    pub events_recorded: usize,
}

// ==========================================
// LearningEngine
// ==========================================
pub struct LearningEngine {
    repos: MatchingRepositories,
    extractor: KeywordExtractor,
    min_records: usize,
    synonym_min_manual_records: usize,
}

impl LearningEngine {
    pub fn new(repos: MatchingRepositories, config: &MatchingConfig) -> Self {
        Self {
            repos,
            extractor: KeywordExtractor::new(Lexicon::standard()),
            min_records: config.learning_min_records,
            synonym_min_manual_records: config.synonym_min_manual_records,
        }
    }

    // ==========================================
    // 记录匹配结果
    // ==========================================

    /// 记录一次匹配结果；失败只记日志
    pub fn record_outcome(
        &self,
        item: &ProjectLineItem,
        quota: &EnterpriseQuota,
        score: f64,
        match_type: MatchType,
    ) {
        if let Err(e) = self.try_record_outcome(item, quota, score, match_type) {
            tracing::warn!(
                "记录学习数据失败: item_id={}, quota_id={}, error={}",
                item.id,
                quota.id,
                e
            );
        }
    }

    pub fn record_event(&self, event: &LearningEvent) {
        self.record_outcome(&event.item, &event.quota, event.score, event.match_type);
    }

    pub fn try_record_outcome(
        &self,
        item: &ProjectLineItem,
        quota: &EnterpriseQuota,
        score: f64,
        match_type: MatchType,
    ) -> EngineResult<i64> {
        let record = self.build_record(item, quota, score, match_type);
        Ok(self.repos.learning_records.append(&record)?)
    }

    /// 构造学习记录: 双方关键词 + 共同关键词（按条目关键词顺序）
    pub fn build_record(
        &self,
        item: &ProjectLineItem,
        quota: &EnterpriseQuota,
        score: f64,
        match_type: MatchType,
    ) -> LearningRecord {
        let item_keywords = self
            .extractor
            .extract_fields(item.item_name.as_deref(), item.feature_value.as_deref());
        let quota_keywords = self
            .extractor
            .extract_fields(quota.quota_name.as_deref(), quota.feature_value.as_deref());

        let quota_set: HashSet<&str> = quota_keywords.iter().map(String::as_str).collect();
        let mut seen: HashSet<&str> = HashSet::new();
        let common: Vec<String> = item_keywords
            .iter()
            .filter(|k| quota_set.contains(k.as_str()) && seen.insert(k.as_str()))
            .cloned()
            .collect();

        LearningRecord {
            id: None,
            item_name: item.item_name.clone(),
            item_feature_value: item.feature_value.clone(),
            quota_name: quota.quota_name.clone(),
            quota_feature_value: quota.feature_value.clone(),
            match_score: score,
            match_type,
            item_keywords: KeywordList::new(item_keywords),
            quota_keywords: KeywordList::new(quota_keywords),
            common_keywords: KeywordList::new(common),
            learning_weight: learning_weight_for(match_type),
            create_time: None,
            update_time: None,
        }
    }

    // ==========================================
    // 关键词权重分析
    // ==========================================

    /// 基于全部历史记录重算关键词权重
    ///
    /// 每次从零累计，重复执行结果不变
    #[instrument(skip(self))]
    pub fn reanalyze_weights(&self) -> EngineResult<WeightAnalysisSummary> {
        let total = self.repos.learning_records.count()?.max(0) as usize;
        if total < self.min_records {
            tracing::debug!("学习记录不足，跳过权重分析: {} < {}", total, self.min_records);
            return Ok(WeightAnalysisSummary {
                records: total,
                keywords_updated: 0,
                skipped: true,
            });
        }

        let records = self.repos.learning_records.find_all()?;
        let lexicon = self.extractor.lexicon();

        let mut weights: BTreeMap<String, KeywordWeight> = BTreeMap::new();
        for record in &records {
            for keyword in record.common_keywords.iter() {
                weights
                    .entry(keyword.clone())
                    .or_insert_with(|| KeywordWeight::new(keyword.clone(), lexicon.is_core_concept(keyword)))
                    .observe(record.learning_weight);
            }
        }

        let updated: Vec<KeywordWeight> = weights.into_values().collect();
        self.repos.keyword_weights.save_all(&updated)?;

        tracing::info!(
            "关键词权重分析完成: records={}, keywords={}",
            records.len(),
            updated.len()
        );
        Ok(WeightAnalysisSummary {
            records: records.len(),
            keywords_updated: updated.len(),
            skipped: false,
        })
    }

    // ==========================================
    // 同义词挖掘
    // ==========================================

    /// 从人工修正记录中发现同义词
    ///
    /// # 规则
    /// - 按 (定额名称, 定额特征) 分组，组内至少 2 个不同条目名称
    /// - 关键词出现在 ≥2 个且 ≥60% 的不同条目名称中
    /// - 已被置信度 > 0.7 的规则覆盖的关键词跳过
    /// - 置信度 = 0.7 + 覆盖比例 × 0.3
    #[instrument(skip(self))]
    pub fn discover_synonyms(&self) -> EngineResult<SynonymDiscoverySummary> {
        let manual = self
            .repos
            .learning_records
            .find_by_types(&[MatchType::ManualSingle, MatchType::ManualMulti])?;

        let mut summary = SynonymDiscoverySummary {
            manual_records: manual.len(),
            ..Default::default()
        };
        if manual.len() < self.synonym_min_manual_records {
            tracing::debug!(
                "人工修正记录不足，跳过同义词挖掘: {} < {}",
                manual.len(),
                self.synonym_min_manual_records
            );
            summary.skipped = true;
            return Ok(summary);
        }

        let mut groups: BTreeMap<String, Vec<&LearningRecord>> = BTreeMap::new();
        for record in &manual {
            groups.entry(record.quota_group_key()).or_default().push(record);
        }

        let mut known_rules = self
            .repos
            .rules
            .find_by_type_above_confidence(RuleType::Synonym, SYNONYM_CONFIDENCE_FLOOR)?;

        for (group_key, group) in &groups {
            let names: BTreeSet<&str> = group
                .iter()
                .filter_map(|r| r.item_name.as_deref())
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .collect();
            if names.len() < 2 {
                continue;
            }
            summary.groups_analyzed += 1;

            let mut keyword_names: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
            for record in group {
                let Some(name) = record.item_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
                    continue;
                };
                for keyword in record.item_keywords.iter() {
                    keyword_names.entry(keyword.as_str()).or_default().insert(name);
                }
            }

            let group_size = names.len() as f64;
            for (keyword, holders) in keyword_names {
                let coverage = holders.len() as f64 / group_size;
                if holders.len() < 2 || coverage < SYNONYM_COVERAGE {
                    continue;
                }
                if known_rules.iter().any(|rule| rule.covers(keyword)) {
                    continue;
                }

                let related: Vec<String> = holders.iter().map(|n| n.to_string()).collect();
                let mut rule = MatchingRule::synonym(
                    keyword,
                    related,
                    SYNONYM_CONFIDENCE_FLOOR + coverage * (1.0 - SYNONYM_CONFIDENCE_FLOOR),
                );
                rule.id = Some(self.repos.rules.insert(&rule)?);

                tracing::debug!(
                    "发现同义词规则: keyword={}, confidence={:.3}, group={}",
                    keyword,
                    rule.confidence,
                    group_key
                );
                known_rules.push(rule);
                summary.rules_created += 1;
            }
        }

        tracing::info!(
            "同义词挖掘完成: manual_records={}, groups={}, rules_created={}",
            summary.manual_records,
            summary.groups_analyzed,
            summary.rules_created
        );
        Ok(summary)
    }

    /// 完整学习分析: 先权重后同义词
    pub fn run_analysis(&self) -> EngineResult<LearningPassSummary> {
        let weights = self.reanalyze_weights()?;
        let synonyms = self.discover_synonyms()?;
        Ok(LearningPassSummary { weights, synonyms })
    }

    // ==========================================
    // 知识加载 / 规则使用计数
    // ==========================================

    pub fn load_knowledge(&self) -> EngineResult<LearnedKnowledge> {
        let keyword_weights = self
            .repos
            .keyword_weights
            .find_all()?
            .into_iter()
            .map(|kw| (kw.keyword, kw.weight))
            .collect();
        let synonyms = self
            .repos
            .rules
            .find_by_type_above_confidence(RuleType::Synonym, SYNONYM_CONFIDENCE_FLOOR)?;

        Ok(LearnedKnowledge {
            keyword_weights,
            synonyms,
        })
    }

    /// 写回一次运行中各规则的命中次数，返回成功写回的规则数
    pub fn flush_rule_usage(&self, usage: &HashMap<i64, u64>) -> usize {
        let ordered: BTreeMap<i64, u64> = usage.iter().map(|(k, v)| (*k, *v)).collect();
        let mut flushed = 0;
        for (rule_id, hits) in ordered {
            if hits == 0 {
                continue;
            }
            match self.repos.rules.increment_usage(rule_id, hits as i64) {
                Ok(()) => flushed += 1,
                Err(e) => tracing::warn!("规则使用次数写回失败: rule_id={}, error={}", rule_id, e),
            }
        }
        flushed
    }

    // ==========================================
    // 存量数据回灌
    // ==========================================

    /// 为全部已匹配条目补录学习记录
    ///
    /// - 多定额条目: 每个关联定额一条
    /// - 其他已匹配条目: 按匹配定额 id 一条
    #[instrument(skip(self))]
    pub fn collect_all_match_data(&self) -> EngineResult<BootstrapSummary> {
        let items = self.repos.items.load_all()?;
        let mut summary = BootstrapSummary::default();

        for item in items.iter().filter(|i| i.match_status != MatchStatus::Unmatched) {
            summary.items_scanned += 1;

            if item.match_status == MatchStatus::ManualMulti {
                for assoc in self.repos.associations.load_by_item(item.id)? {
                    if let Some(quota) = self.find_quota(assoc.quota_id) {
                        self.record_outcome(item, &quota, BOOTSTRAP_SCORE, MatchType::ManualMulti);
                        summary.events_recorded += 1;
                    }
                }
                continue;
            }

            let (Some(quota_id), Some(match_type)) =
                (item.matched_quota_id, MatchType::from_status(item.match_status))
            else {
                continue;
            };
            if let Some(quota) = self.find_quota(quota_id) {
                self.record_outcome(item, &quota, BOOTSTRAP_SCORE, match_type);
                summary.events_recorded += 1;
            }
        }

        tracing::info!(
            "存量学习数据回灌完成: items={}, events={}",
            summary.items_scanned,
            summary.events_recorded
        );
        Ok(summary)
    }

    fn find_quota(&self, quota_id: i64) -> Option<EnterpriseQuota> {
        match self.repos.quotas.load_by_id(quota_id) {
            Ok(quota) => quota,
            Err(e) => {
                tracing::warn!("加载定额失败: quota_id={}, error={}", quota_id, e);
                None
            }
        }
    }
}

// ==========================================
// PooledLearningPublisher - 学习事件异步消费
// ==========================================

/// 将学习事件经有界通道交给学习线程记录
///
/// 通道满或已关闭时由发布方线程直接记录，事件不会丢失
pub struct PooledLearningPublisher {
    engine: Arc<LearningEngine>,
    sender: Mutex<Option<mpsc::Sender<LearningEvent>>>,
    consumers: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

impl PooledLearningPublisher {
    pub fn new(engine: Arc<LearningEngine>, config: &MatchingConfig) -> EngineResult<Self> {
        let (sender, receiver) = mpsc::channel::<LearningEvent>(config.learning_queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let mut consumers = Vec::new();
        for i in 0..config.learning_pool_size.max(1) {
            let engine = engine.clone();
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("quota-learning-{}", i))
                .spawn(move || loop {
                    // 取到事件后立即释放接收端，记录过程不持锁
                    let next = lock(&receiver).blocking_recv();
                    match next {
                        Some(event) => engine.record_event(&event),
                        None => break,
                    }
                })
                .map_err(|e| EngineError::WorkerSpawn(e.to_string()))?;
            consumers.push(handle);
        }

        tracing::debug!(
            "学习线程已启动: consumers={}, queue_capacity={}",
            consumers.len(),
            config.learning_queue_capacity
        );
        Ok(Self {
            engine,
            sender: Mutex::new(Some(sender)),
            consumers: Mutex::new(consumers),
        })
    }

    /// 关闭通道并等待已入队事件写完；之后发布的事件由调用线程记录
    pub fn shutdown(&self) {
        drop(lock(&self.sender).take());
        let consumers = std::mem::take(&mut *lock(&self.consumers));
        for handle in consumers {
            if handle.join().is_err() {
                tracing::warn!("学习线程异常退出");
            }
        }
    }
}

impl LearningEventPublisher for PooledLearningPublisher {
    fn publish(&self, event: LearningEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        let sender = lock(&self.sender).clone();
        let Some(sender) = sender else {
            self.engine.record_event(&event);
            return Ok(());
        };

        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::debug!("学习队列已满，由调用线程记录: source={}", event.source.as_str());
                self.engine.record_event(&event);
            }
            Err(TrySendError::Closed(event)) => {
                self.engine.record_event(&event);
            }
        }
        Ok(())
    }
}

impl Drop for PooledLearningPublisher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
