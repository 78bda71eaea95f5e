// ==========================================
// 定额匹配系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，把仓储/引擎错误转换为用户可读的错误消息
// 约束: 错误消息必须带出原因和涉及的对象
// ==========================================

use crate::engine::error::EngineError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("该定额已添加: item_id={item_id}, quota_id={quota_id}")]
    DuplicateAssociation { item_id: i64, quota_id: i64 },

    #[error("无效输入: {0}")]
    InvalidInput(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("保存失败: {0}")]
    PersistenceFailure(String),

    #[error("数据库错误: {0}")]
    DatabaseError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::PersistenceFailure(format!("事务失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::InvalidInput(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::InvalidInput(format!("外键约束违反: {}", msg))
            }
            RepositoryError::SerializationError { field, message } => {
                ApiError::InternalError(format!("字段{}序列化失败: {}", field, message))
            }
            RepositoryError::ValidationError(msg) => ApiError::InvalidInput(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Repository(e) => e.into(),
            EngineError::PersistenceFailure { stage, message } => {
                ApiError::PersistenceFailure(format!("{}: {}", stage, message))
            }
            other => ApiError::InternalError(other.to_string()),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_conversion() {
        let api_err: ApiError = RepositoryError::not_found("ProjectLineItem", 42).into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("ProjectLineItem"));
                assert!(msg.contains("42"));
            }
            other => panic!("Expected NotFound, got {:?}", other),
        }

        let api_err: ApiError = RepositoryError::LockError("poisoned".to_string()).into();
        assert!(matches!(api_err, ApiError::DatabaseError(_)));
    }

    #[test]
    fn test_engine_error_conversion() {
        let api_err: ApiError = EngineError::persistence("save_batch", "disk full").into();
        match api_err {
            ApiError::PersistenceFailure(msg) => {
                assert!(msg.contains("save_batch"));
                assert!(msg.contains("disk full"));
            }
            other => panic!("Expected PersistenceFailure, got {:?}", other),
        }

        let api_err: ApiError =
            EngineError::Repository(RepositoryError::not_found("EnterpriseQuota", 7)).into();
        assert!(matches!(api_err, ApiError::NotFound(_)), "仓储错误应透传为 NotFound");

        let api_err: ApiError = EngineError::WorkerSpawn("thread limit".to_string()).into();
        assert!(matches!(api_err, ApiError::InternalError(_)));
    }

    #[test]
    fn test_duplicate_association_message() {
        let err = ApiError::DuplicateAssociation {
            item_id: 1,
            quota_id: 2,
        };
        assert_eq!(err.to_string(), "该定额已添加: item_id=1, quota_id=2");
    }
}
