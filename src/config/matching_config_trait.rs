// ==========================================
// 定额匹配系统 - 匹配配置读取 Trait
// ==========================================
// 职责: 定义匹配/学习引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// MatchingConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
// 所有方法在配置缺失或格式错误时返回默认值
#[async_trait]
pub trait MatchingConfigReader: Send + Sync {
    // ===== 批处理 =====

    /// 每个派发批次的条目数（默认 200）
    async fn get_matching_batch_size(&self) -> ConfigResult<usize>;

    /// 每个保存分片的记录数（默认 100）
    async fn get_save_batch_size(&self) -> ConfigResult<usize>;

    // ===== 匹配线程池 =====

    /// 工作线程数（默认 8）
    async fn get_pool_size(&self) -> ConfigResult<usize>;

    /// 线程全忙时可排队的批次数（默认 1000），超出由调用线程执行
    async fn get_pool_queue_capacity(&self) -> ConfigResult<usize>;

    /// 批次完成等待超时秒数（默认 1800）
    async fn get_await_timeout_secs(&self) -> ConfigResult<u64>;

    // ===== 学习线程池 =====

    async fn get_learning_pool_size(&self) -> ConfigResult<usize>;

    async fn get_learning_queue_capacity(&self) -> ConfigResult<usize>;

    // ===== 评分阈值 =====

    /// 最低接受得分（默认 0.30）
    async fn get_match_threshold(&self) -> ConfigResult<f64>;

    /// 扫描提前结束得分（默认 0.80）
    async fn get_early_exit_score(&self) -> ConfigResult<f64>;

    // ===== 学习 =====

    /// 权重分析所需最少学习记录数（默认 10）
    async fn get_learning_min_records(&self) -> ConfigResult<usize>;

    /// 同义词发现所需最少人工记录数（默认 5）
    async fn get_synonym_min_manual_records(&self) -> ConfigResult<usize>;

    /// 学习调度周期小时数（默认 24）
    async fn get_learning_interval_hours(&self) -> ConfigResult<u64>;
}
