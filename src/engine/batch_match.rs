// ==========================================
// 定额匹配系统 - 批量匹配协调器
// ==========================================
// 流程: LOAD → PARTITION → DISPATCH → AWAIT → PERSIST → DONE
// 红线: 状态 2/3（人工锁定）不参与自动匹配，也不被保存覆盖
// 红线: 单个条目失败只降级为未匹配，不影响整批
// 红线: 学习事件失败不影响匹配结果持久化
// ==========================================

use crate::config::MatchingConfig;
use crate::domain::project_item::ProjectLineItem;
use crate::domain::quota::EnterpriseQuota;
use crate::domain::types::{MatchStatus, MatchType};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{LearningEvent, LearningEventSource, OptionalEventPublisher};
use crate::engine::keyword_extractor::KeywordExtractor;
use crate::engine::learning::{LearnedKnowledge, LearningEngine};
use crate::engine::lexicon::Lexicon;
use crate::engine::match_cache::MatchCache;
use crate::engine::similarity::{MatchProfile, SimilarityScorer};
use crate::engine::stores::MatchingRepositories;
use crate::engine::worker_pool::{Dispatch, WorkerPool};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;
use uuid::Uuid;

// ==========================================
// BatchMatchReport - 运行报告
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchMatchReport {
    pub run_id: String,
    pub version_id: Option<i64>,
    /// 本次新自动匹配且保存成功的条目数
    pub matched: usize,
    pub eligible: usize,
    /// 空单位被强制置为未匹配的条目数
    pub forced_unmatched: usize,
    /// 人工锁定而跳过的条目数
    pub skipped_manual: usize,
    pub quota_count: usize,
    pub batches_total: usize,
    pub batches_completed: usize,
    pub timed_out: bool,
    pub persisted: usize,
    pub failed: usize,
    pub elapsed_ms: u128,
}

// ==========================================
// MatchContext - 单次运行的只读匹配上下文
// ==========================================

/// 单个条目的匹配结果
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    pub item: ProjectLineItem,
    /// 命中的定额及得分（未命中为 None）
    pub matched: Option<(EnterpriseQuota, f64)>,
    /// 命中时关键词子分用到的学习规则
    pub rule_hits: Vec<i64>,
}

impl ItemOutcome {
    fn unmatched(mut item: ProjectLineItem) -> Self {
        item.mark_unmatched();
        Self {
            item,
            matched: None,
            rule_hits: Vec::new(),
        }
    }
}

/// 构建完成后只读，在工作线程间通过 Arc 共享
pub struct MatchContext {
    cache: MatchCache,
    extractor: KeywordExtractor,
    scorer: SimilarityScorer,
    threshold: f64,
    early_exit_score: f64,
}

impl MatchContext {
    pub fn new(quotas: Vec<EnterpriseQuota>, knowledge: LearnedKnowledge, config: &MatchingConfig) -> Self {
        let lexicon = Arc::new(Lexicon::standard().with_learned_rules(&knowledge.synonyms));
        let extractor = KeywordExtractor::new(lexicon.clone());
        let scorer = SimilarityScorer::new(lexicon).with_keyword_weights(knowledge.keyword_weights);
        let cache = MatchCache::build(quotas, &extractor);

        Self {
            cache,
            extractor,
            scorer,
            threshold: config.match_threshold,
            early_exit_score: config.early_exit_score,
        }
    }

    pub fn quota_count(&self) -> usize {
        self.cache.len()
    }

    /// 为单个条目选择最佳定额
    ///
    /// 按定额 id 升序扫描，取第一个达到最高分的定额；
    /// 得分达到提前退出分数时立即停止扫描
    pub fn match_item(&self, mut item: ProjectLineItem) -> ItemOutcome {
        let profile = MatchProfile::build(
            &self.extractor,
            item.item_name.as_deref(),
            item.feature_value.as_deref(),
        );
        if profile.keywords.is_empty() {
            return ItemOutcome::unmatched(item);
        }

        let mut best = None;
        let mut best_score = 0.0;
        for cached in self.cache.iter() {
            let score = self.scorer.score(profile.view(), cached.profile);
            if score > 0.0 && score > best_score {
                best_score = score;
                best = Some(cached);
                if score >= self.early_exit_score {
                    break;
                }
            }
        }

        let Some(best) = best.filter(|_| best_score >= self.threshold) else {
            return ItemOutcome::unmatched(item);
        };

        let mut rule_hits = Vec::new();
        if !best.profile.keywords.is_empty() {
            self.scorer
                .keyword_similarity_traced(&profile.keywords, best.profile.keywords, &mut rule_hits);
        }

        item.apply_quota(best.quota, MatchStatus::AutoMatched);
        ItemOutcome {
            item,
            matched: Some((best.quota.clone(), best_score)),
            rule_hits,
        }
    }

    /// 单条匹配出现 panic 时降级为未匹配
    fn match_item_guarded(&self, item: ProjectLineItem) -> ItemOutcome {
        let fallback = item.clone();
        match catch_unwind(AssertUnwindSafe(|| self.match_item(item))) {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!("条目匹配异常，降级为未匹配: item_id={}", fallback.id);
                ItemOutcome::unmatched(fallback)
            }
        }
    }
}

/// 按固定大小切分为连续批次
fn partition<T>(mut items: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    let batch_size = batch_size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(batch_size));
    while !items.is_empty() {
        let rest = items.split_off(items.len().min(batch_size));
        batches.push(items);
        items = rest;
    }
    batches
}

#[derive(Debug, Default)]
struct PersistOutcome {
    persisted: usize,
    failed_ids: HashSet<i64>,
}

// ==========================================
// BatchMatchCoordinator
// ==========================================
pub struct BatchMatchCoordinator {
    repos: MatchingRepositories,
    learning: Arc<LearningEngine>,
    publisher: OptionalEventPublisher,
    config: MatchingConfig,
    pool: WorkerPool,
}

impl BatchMatchCoordinator {
    pub fn new(
        repos: MatchingRepositories,
        learning: Arc<LearningEngine>,
        publisher: OptionalEventPublisher,
        config: MatchingConfig,
    ) -> EngineResult<Self> {
        let config = config.normalized();
        let pool = WorkerPool::for_matching(&config)?;
        Ok(Self {
            repos,
            learning,
            publisher,
            config,
            pool,
        })
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// 批量匹配，返回新自动匹配的条目数
    pub fn batch_match(&self, version_id: Option<i64>) -> EngineResult<usize> {
        Ok(self.run(version_id)?.matched)
    }

    #[instrument(skip(self))]
    pub fn run(&self, version_id: Option<i64>) -> EngineResult<BatchMatchReport> {
        let started = Instant::now();
        let mut report = BatchMatchReport {
            run_id: Uuid::new_v4().to_string(),
            version_id,
            ..Default::default()
        };

        // ===== LOAD =====
        let mut eligible = Vec::new();
        let mut forced = Vec::new();
        for mut item in self.repos.items.load_all()? {
            if item.match_status.is_manual() {
                report.skipped_manual += 1;
            } else if item.has_blank_unit() {
                item.mark_unmatched();
                forced.push(item);
            } else {
                eligible.push(item);
            }
        }
        report.eligible = eligible.len();
        report.forced_unmatched = forced.len();

        if eligible.is_empty() {
            tracing::info!("没有可匹配的条目: forced_unmatched={}", forced.len());
            self.finish_persist(&mut report, forced, started);
            return Ok(report);
        }

        let quotas = self.repos.quotas.load_all(version_id)?;
        report.quota_count = quotas.len();
        if quotas.is_empty() {
            tracing::warn!("定额库为空，全部可匹配条目置为未匹配: eligible={}", eligible.len());
            let mut records: Vec<ProjectLineItem> = eligible
                .into_iter()
                .map(|mut item| {
                    item.mark_unmatched();
                    item
                })
                .collect();
            records.extend(forced);
            self.finish_persist(&mut report, records, started);
            return Ok(report);
        }

        let knowledge = self.learning.load_knowledge().unwrap_or_else(|e| {
            tracing::warn!("加载学习数据失败: {}, 使用基础算法", e);
            LearnedKnowledge::default()
        });
        tracing::debug!(
            "学习数据: keyword_weights={}, synonym_rules={}",
            knowledge.keyword_weights.len(),
            knowledge.synonyms.len()
        );
        let context = Arc::new(MatchContext::new(quotas, knowledge, &self.config));

        // ===== PARTITION / DISPATCH =====
        let batches = partition(eligible, self.config.matching_batch_size);
        report.batches_total = batches.len();

        // 每个批次完成后把结果发回；等待结束后接收端被丢弃，迟到的批次不再计入
        let (tx, rx) = mpsc::channel::<Vec<ItemOutcome>>();
        let mut ran_on_caller = 0usize;
        for (index, batch) in batches.into_iter().enumerate() {
            let context = context.clone();
            let tx = tx.clone();

            let placement = self.pool.dispatch(move || {
                let outcomes: Vec<ItemOutcome> = batch
                    .into_iter()
                    .map(|item| context.match_item_guarded(item))
                    .collect();
                let matched = outcomes.iter().filter(|o| o.matched.is_some()).count();
                tracing::debug!("批次完成: index={}, items={}, matched={}", index, outcomes.len(), matched);
                let _ = tx.send(outcomes);
            });
            if placement == Dispatch::RanOnCaller {
                ran_on_caller += 1;
            }
        }
        drop(tx);
        if ran_on_caller > 0 {
            tracing::debug!("线程池饱和，{} 个批次由调用线程执行", ran_on_caller);
        }

        // ===== AWAIT =====
        // 超时设置过大时 deadline 为 None，即不限时
        let deadline = Instant::now().checked_add(self.config.await_timeout());
        let mut outcomes = Vec::new();
        while report.batches_completed < report.batches_total {
            let remaining = deadline.map_or(Duration::MAX, |d| d.saturating_duration_since(Instant::now()));
            match rx.recv_timeout(remaining) {
                Ok(batch) => {
                    outcomes.extend(batch);
                    report.batches_completed += 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    report.timed_out = true;
                    let timeout = EngineError::Timeout {
                        waited_secs: self.config.await_timeout_secs,
                        completed: report.batches_completed,
                        total: report.batches_total,
                    };
                    tracing::warn!("{}，保存已完成的部分结果", timeout);
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tracing::warn!(
                        "批次结果通道提前关闭: completed={}, total={}",
                        report.batches_completed,
                        report.batches_total
                    );
                    break;
                }
            }
        }
        drop(rx);

        // ===== PERSIST =====
        let mut records: Vec<ProjectLineItem> = outcomes.iter().map(|o| o.item.clone()).collect();
        records.extend(forced);
        let persist = self.persist_in_chunks(&records);
        report.persisted = persist.persisted;
        report.failed = persist.failed_ids.len();

        let saved_matches: Vec<&ItemOutcome> = outcomes
            .iter()
            .filter(|o| o.matched.is_some() && !persist.failed_ids.contains(&o.item.id))
            .collect();
        report.matched = saved_matches.len();

        // ===== 学习反馈 =====
        let mut rule_usage: HashMap<i64, u64> = HashMap::new();
        for outcome in &saved_matches {
            let distinct: BTreeSet<i64> = outcome.rule_hits.iter().copied().collect();
            for rule_id in distinct {
                *rule_usage.entry(rule_id).or_default() += 1;
            }
        }
        if !rule_usage.is_empty() {
            self.learning.flush_rule_usage(&rule_usage);
        }

        for outcome in saved_matches {
            if let Some((quota, score)) = &outcome.matched {
                self.publisher.publish(LearningEvent::new(
                    outcome.item.clone(),
                    quota.clone(),
                    *score,
                    MatchType::Auto,
                    LearningEventSource::BatchMatch,
                ));
            }
        }

        report.elapsed_ms = started.elapsed().as_millis();
        tracing::info!(
            "批量匹配完成: run_id={}, matched={}, eligible={}, forced_unmatched={}, batches={}/{}, persisted={}, failed={}, elapsed_ms={}",
            report.run_id,
            report.matched,
            report.eligible,
            report.forced_unmatched,
            report.batches_completed,
            report.batches_total,
            report.persisted,
            report.failed,
            report.elapsed_ms
        );
        Ok(report)
    }

    fn finish_persist(&self, report: &mut BatchMatchReport, records: Vec<ProjectLineItem>, started: Instant) {
        let persist = self.persist_in_chunks(&records);
        report.persisted = persist.persisted;
        report.failed = persist.failed_ids.len();
        report.elapsed_ms = started.elapsed().as_millis();
    }

    /// 分块保存；块失败时降级为逐条保存，逐条失败只记录日志
    fn persist_in_chunks(&self, records: &[ProjectLineItem]) -> PersistOutcome {
        let mut outcome = PersistOutcome::default();

        for chunk in records.chunks(self.config.save_batch_size) {
            match self.repos.items.save_batch(chunk) {
                Ok(_) => outcome.persisted += chunk.len(),
                Err(e) => {
                    tracing::warn!(
                        "{}，降级为逐条保存",
                        EngineError::persistence("save_batch", &e)
                    );
                    for record in chunk {
                        match self.repos.items.save_one(record) {
                            Ok(()) => outcome.persisted += 1,
                            Err(e) => {
                                tracing::error!("条目保存失败: item_id={}, error={}", record.id, e);
                                outcome.failed_ids.insert(record.id);
                            }
                        }
                    }
                }
            }
        }

        outcome
    }
}
