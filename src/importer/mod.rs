// ==========================================
// 定额匹配系统 - 导入层
// ==========================================
// 职责: 从 CSV 载入企业定额与工程量清单（开发与演示用）
// ==========================================

pub mod csv_importer;
pub mod error;

// 重导出核心类型
pub use csv_importer::{CsvImporter, ImportSummary, ItemRow, QuotaRow};
pub use error::{ImportError, ImportResult};
