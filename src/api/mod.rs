// ==========================================
// 定额匹配系统 - API 层
// ==========================================
// 职责: 对外提供匹配/人工调整/多定额管理接口
// ==========================================

pub mod error;
pub mod quota_match_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use quota_match_api::QuotaMatchApi;
