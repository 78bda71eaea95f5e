// ==========================================
// 定额匹配系统 - 引擎层错误类型
// ==========================================
// 超时与学习失败在批量匹配中只记录日志，不作为运行结果返回
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("持久化失败 (stage={stage}): {message}")]
    PersistenceFailure { stage: String, message: String },

    #[error("学习数据处理失败: {0}")]
    LearningFailure(String),

    #[error("批量匹配等待超时: 已等待 {waited_secs}s, 完成批次 {completed}/{total}")]
    Timeout {
        waited_secs: u64,
        completed: usize,
        total: usize,
    },

    #[error("工作线程启动失败: {0}")]
    WorkerSpawn(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EngineError {
    pub fn persistence(stage: &str, message: impl ToString) -> Self {
        EngineError::PersistenceFailure {
            stage: stage.to_string(),
            message: message.to_string(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
