// ==========================================
// 定额匹配系统 - 引擎层
// ==========================================
// 职责: 关键词提取、相似度计算、批量匹配、学习反馈
// 红线: Engine 不拼 SQL，持久化只经由 stores 中的 trait
// ==========================================

pub mod batch_match;
pub mod error;
pub mod events;
pub mod keyword_extractor;
pub mod learning;
pub mod lexicon;
pub mod match_cache;
pub mod scheduler;
pub mod similarity;
pub mod stores;
pub mod worker_pool;

// 重导出核心引擎
pub use batch_match::{BatchMatchCoordinator, BatchMatchReport, ItemOutcome, MatchContext};
pub use error::{EngineError, EngineResult};
pub use events::{
    LearningEvent, LearningEventPublisher, LearningEventSource, NoOpEventPublisher,
    OptionalEventPublisher,
};
pub use keyword_extractor::KeywordExtractor;
pub use learning::{
    BootstrapSummary, LearnedKnowledge, LearningEngine, LearningPassSummary,
    PooledLearningPublisher, SynonymDiscoverySummary, WeightAnalysisSummary,
};
pub use lexicon::{Lexicon, SynonymGroup};
pub use match_cache::MatchCache;
pub use scheduler::LearningScheduler;
pub use similarity::{MatchProfile, SimilarityScorer};
pub use stores::{
    AssociationStore, ItemStore, KeywordWeightStore, LearningRecordStore, MatchingRepositories,
    MatchingRuleStore, QuotaStore,
};
pub use worker_pool::{Dispatch, WorkerPool};
