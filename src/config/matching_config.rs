// ==========================================
// 定额匹配系统 - 匹配运行配置
// ==========================================
// 每次运行前一次性解析，运行期间只读
// ==========================================

use crate::config::matching_config_trait::{ConfigResult, MatchingConfigReader};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_MATCHING_BATCH_SIZE: usize = 200;
pub const DEFAULT_SAVE_BATCH_SIZE: usize = 100;
pub const DEFAULT_POOL_SIZE: usize = 8;
pub const DEFAULT_POOL_QUEUE_CAPACITY: usize = 1000;
pub const DEFAULT_AWAIT_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_LEARNING_POOL_SIZE: usize = 2;
pub const DEFAULT_LEARNING_QUEUE_CAPACITY: usize = 500;
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.30;
pub const DEFAULT_EARLY_EXIT_SCORE: f64 = 0.80;
pub const DEFAULT_LEARNING_MIN_RECORDS: usize = 10;
pub const DEFAULT_SYNONYM_MIN_MANUAL_RECORDS: usize = 5;
pub const DEFAULT_LEARNING_INTERVAL_HOURS: u64 = 24;
/// 学习间隔上限（一年）
pub const MAX_LEARNING_INTERVAL_HOURS: u64 = 24 * 365;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    pub matching_batch_size: usize,
    pub save_batch_size: usize,
    pub pool_size: usize,
    pub pool_queue_capacity: usize,
    pub await_timeout_secs: u64,
    pub learning_pool_size: usize,
    pub learning_queue_capacity: usize,
    pub match_threshold: f64,
    pub early_exit_score: f64,
    pub learning_min_records: usize,
    pub synonym_min_manual_records: usize,
    pub learning_interval_hours: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            matching_batch_size: DEFAULT_MATCHING_BATCH_SIZE,
            save_batch_size: DEFAULT_SAVE_BATCH_SIZE,
            pool_size: DEFAULT_POOL_SIZE,
            pool_queue_capacity: DEFAULT_POOL_QUEUE_CAPACITY,
            await_timeout_secs: DEFAULT_AWAIT_TIMEOUT_SECS,
            learning_pool_size: DEFAULT_LEARNING_POOL_SIZE,
            learning_queue_capacity: DEFAULT_LEARNING_QUEUE_CAPACITY,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            early_exit_score: DEFAULT_EARLY_EXIT_SCORE,
            learning_min_records: DEFAULT_LEARNING_MIN_RECORDS,
            synonym_min_manual_records: DEFAULT_SYNONYM_MIN_MANUAL_RECORDS,
            learning_interval_hours: DEFAULT_LEARNING_INTERVAL_HOURS,
        }
    }
}

impl MatchingConfig {
    /// 从配置读取器一次性解析全部配置项
    pub async fn load(reader: &dyn MatchingConfigReader) -> ConfigResult<Self> {
        let config = Self {
            matching_batch_size: reader.get_matching_batch_size().await?,
            save_batch_size: reader.get_save_batch_size().await?,
            pool_size: reader.get_pool_size().await?,
            pool_queue_capacity: reader.get_pool_queue_capacity().await?,
            await_timeout_secs: reader.get_await_timeout_secs().await?,
            learning_pool_size: reader.get_learning_pool_size().await?,
            learning_queue_capacity: reader.get_learning_queue_capacity().await?,
            match_threshold: reader.get_match_threshold().await?,
            early_exit_score: reader.get_early_exit_score().await?,
            learning_min_records: reader.get_learning_min_records().await?,
            synonym_min_manual_records: reader.get_synonym_min_manual_records().await?,
            learning_interval_hours: reader.get_learning_interval_hours().await?,
        };
        Ok(config.normalized())
    }

    /// 修正越界取值
    ///
    /// - 各容量/批大小至少为 1
    /// - 学习间隔限制在 [1, 8760] 小时
    /// - 阈值限制在 [0, 1]
    pub fn normalized(mut self) -> Self {
        self.matching_batch_size = self.matching_batch_size.max(1);
        self.save_batch_size = self.save_batch_size.max(1);
        self.pool_size = self.pool_size.max(1);
        self.pool_queue_capacity = self.pool_queue_capacity.max(1);
        self.learning_pool_size = self.learning_pool_size.max(1);
        self.learning_queue_capacity = self.learning_queue_capacity.max(1);
        self.learning_interval_hours = self
            .learning_interval_hours
            .clamp(1, MAX_LEARNING_INTERVAL_HOURS);
        self.match_threshold = self.match_threshold.clamp(0.0, 1.0);
        self.early_exit_score = self.early_exit_score.clamp(0.0, 1.0);
        self
    }

    pub fn await_timeout(&self) -> Duration {
        Duration::from_secs(self.await_timeout_secs)
    }

    pub fn learning_interval(&self) -> Duration {
        Duration::from_secs(self.learning_interval_hours.saturating_mul(3600))
    }
}
