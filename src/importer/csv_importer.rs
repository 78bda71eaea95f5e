// ==========================================
// 定额匹配系统 - CSV 导入
// ==========================================
// 表头支持英文字段名与中文列名两种写法
// 空白行跳过；数值列无法解析时按空值处理
// ==========================================

use crate::domain::project_item::ProjectLineItem;
use crate::domain::quota::EnterpriseQuota;
use crate::domain::types::round_money;
use crate::importer::error::{ImportError, ImportResult};
use crate::repository::{EnterpriseQuotaRepository, ProjectItemRepository};
use csv::{ReaderBuilder, Trim};
use rusqlite::Connection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ==========================================
// 行结构
// ==========================================

/// 企业定额 CSV 行
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaRow {
    #[serde(alias = "定额编号")]
    pub quota_code: Option<String>,
    #[serde(alias = "定额名称")]
    pub quota_name: Option<String>,
    #[serde(default, alias = "项目特征")]
    pub feature_value: Option<String>,
    #[serde(default, alias = "单位")]
    pub unit: Option<String>,
    #[serde(default, alias = "单价", deserialize_with = "csv::invalid_option")]
    pub unit_price: Option<f64>,
    #[serde(default, alias = "人工费", deserialize_with = "csv::invalid_option")]
    pub labor_cost: Option<f64>,
    #[serde(default, alias = "材料费", deserialize_with = "csv::invalid_option")]
    pub material_cost: Option<f64>,
    #[serde(default, alias = "机械费", deserialize_with = "csv::invalid_option")]
    pub machine_cost: Option<f64>,
    #[serde(default, alias = "备注")]
    pub remark: Option<String>,
    #[serde(default, alias = "版本", deserialize_with = "csv::invalid_option")]
    pub version_id: Option<i64>,
}

/// 工程量清单 CSV 行
#[derive(Debug, Clone, Deserialize)]
pub struct ItemRow {
    #[serde(default, alias = "项目编码")]
    pub item_code: Option<String>,
    #[serde(alias = "项目名称")]
    pub item_name: Option<String>,
    #[serde(default, alias = "项目特征")]
    pub feature_value: Option<String>,
    #[serde(default, alias = "计量单位")]
    pub unit: Option<String>,
    #[serde(default, alias = "工程量", deserialize_with = "csv::invalid_option")]
    pub quantity: Option<f64>,
    #[serde(default, alias = "备注")]
    pub remark: Option<String>,
}

impl QuotaRow {
    fn into_quota(self, row: usize, version_override: Option<i64>) -> ImportResult<EnterpriseQuota> {
        let quota_name = non_blank(self.quota_name).ok_or_else(|| ImportError::MissingField {
            row,
            field: "quota_name".to_string(),
        })?;
        Ok(EnterpriseQuota {
            id: 0,
            quota_code: non_blank(self.quota_code),
            quota_name: Some(quota_name),
            feature_value: non_blank(self.feature_value),
            unit: non_blank(self.unit),
            unit_price: self.unit_price.map(round_money),
            labor_cost: self.labor_cost.map(round_money),
            material_cost: self.material_cost.map(round_money),
            machine_cost: self.machine_cost.map(round_money),
            remark: non_blank(self.remark),
            version_id: version_override.or(self.version_id),
        })
    }
}

impl ItemRow {
    /// 单位原样保留（空单位的条目在匹配时会被置为未匹配）
    fn into_item(self, row: usize, user_id: Option<i64>) -> ImportResult<ProjectLineItem> {
        let item_name = non_blank(self.item_name).ok_or_else(|| ImportError::MissingField {
            row,
            field: "item_name".to_string(),
        })?;
        Ok(ProjectLineItem {
            user_id,
            item_code: non_blank(self.item_code),
            item_name: Some(item_name),
            feature_value: non_blank(self.feature_value),
            unit: self.unit,
            quantity: self.quantity,
            remark: non_blank(self.remark),
            ..Default::default()
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ==========================================
// 导入结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub rows_read: usize,
    pub imported: usize,
    pub skipped_blank: usize,
}

// ==========================================
// CsvImporter
// ==========================================
pub struct CsvImporter {
    item_repo: ProjectItemRepository,
    quota_repo: EnterpriseQuotaRepository,
}

impl CsvImporter {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            item_repo: ProjectItemRepository::new(conn.clone()),
            quota_repo: EnterpriseQuotaRepository::new(conn),
        }
    }

    /// 导入企业定额；version_id 非空时覆盖文件中的版本列
    pub fn import_quotas(&self, path: &Path, version_id: Option<i64>) -> ImportResult<ImportSummary> {
        let (rows, mut summary) = read_rows::<QuotaRow>(path)?;
        let quotas = rows
            .into_iter()
            .map(|(row, record)| record.into_quota(row, version_id))
            .collect::<ImportResult<Vec<_>>>()?;

        for quota in &quotas {
            self.quota_repo.insert(quota)?;
        }
        summary.imported = quotas.len();
        tracing::info!(
            "定额导入完成: file={}, rows={}, imported={}, skipped_blank={}",
            path.display(),
            summary.rows_read,
            summary.imported,
            summary.skipped_blank
        );
        Ok(summary)
    }

    pub fn import_items(&self, path: &Path, user_id: Option<i64>) -> ImportResult<ImportSummary> {
        let (rows, mut summary) = read_rows::<ItemRow>(path)?;
        let items = rows
            .into_iter()
            .map(|(row, record)| record.into_item(row, user_id))
            .collect::<ImportResult<Vec<_>>>()?;

        for item in &items {
            self.item_repo.insert(item)?;
        }
        summary.imported = items.len();
        tracing::info!(
            "清单导入完成: file={}, rows={}, imported={}, skipped_blank={}",
            path.display(),
            summary.rows_read,
            summary.imported,
            summary.skipped_blank
        );
        Ok(summary)
    }
}

/// 读取 CSV 并反序列化，返回 (行号, 记录)；行号从 2 开始（第 1 行为表头）
fn read_rows<T: DeserializeOwned>(path: &Path) -> ImportResult<(Vec<(usize, T)>, ImportSummary)> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    if let Some(ext) = path.extension() {
        if !ext.eq_ignore_ascii_case("csv") {
            return Err(ImportError::UnsupportedFormat(ext.to_string_lossy().to_string()));
        }
    }

    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| ImportError::CsvParseError {
            row: 1,
            message: e.to_string(),
        })?
        .clone();

    let mut summary = ImportSummary::default();
    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let row = idx + 2;
        let record = result.map_err(|e| ImportError::CsvParseError {
            row,
            message: e.to_string(),
        })?;
        summary.rows_read += 1;

        // 跳过完全空白的行
        if record.iter().all(|v| v.is_empty()) {
            summary.skipped_blank += 1;
            continue;
        }

        let parsed: T = record
            .deserialize(Some(&headers))
            .map_err(|e| ImportError::CsvParseError {
                row,
                message: e.to_string(),
            })?;
        rows.push((row, parsed));
    }

    Ok((rows, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_with_schema;
    use std::io::Write;

    fn csv_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn importer() -> (Arc<Mutex<Connection>>, CsvImporter) {
        let conn = Arc::new(Mutex::new(open_in_memory_with_schema().unwrap()));
        (conn.clone(), CsvImporter::new(conn))
    }

    #[test]
    fn test_import_quotas_with_chinese_headers() {
        let (conn, importer) = importer();
        let file = csv_file(
            "定额编号,定额名称,项目特征,单位,单价\n\
             Q-001,高清摄像机,200万像素,台,500\n\
             ,,,,\n\
             Q-002,网络交换机,24口,台,abc\n",
        );

        let summary = importer.import_quotas(file.path(), Some(3)).unwrap();
        assert_eq!(summary.rows_read, 3);
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.skipped_blank, 1);

        let quotas = EnterpriseQuotaRepository::new(conn).find_all(Some(3)).unwrap();
        assert_eq!(quotas.len(), 2, "导入的定额应归属指定版本");
        assert_eq!(quotas[0].unit_price, Some(500.0));
        assert_eq!(quotas[1].unit_price, None, "无法解析的单价按空值处理");
    }

    #[test]
    fn test_import_items_keeps_blank_unit() {
        let (conn, importer) = importer();
        let file = csv_file(
            "item_code,item_name,feature_value,unit,quantity\n\
             A1,监控摄像机,室外,台,2\n\
             A2,线缆敷设,,,100\n",
        );

        let summary = importer.import_items(file.path(), None).unwrap();
        assert_eq!(summary.imported, 2);

        let items = ProjectItemRepository::new(conn).find_all().unwrap();
        assert_eq!(items.len(), 2);
        assert!(items[1].has_blank_unit(), "空单位应原样保留");
        assert_eq!(items[0].quantity, Some(2.0));
    }

    #[test]
    fn test_missing_name_rejected() {
        let (_conn, importer) = importer();
        let file = csv_file("quota_code,quota_name,unit_price\nQ-1,,10\n");

        let err = importer.import_quotas(file.path(), None).unwrap_err();
        match err {
            ImportError::MissingField { row, field } => {
                assert_eq!(row, 2);
                assert_eq!(field, "quota_name");
            }
            other => panic!("Expected MissingField, got {:?}", other),
        }
    }

    #[test]
    fn test_file_checks() {
        let (_conn, importer) = importer();
        let err = importer
            .import_items(Path::new("not_exists.csv"), None)
            .unwrap_err();
        assert!(matches!(err, ImportError::FileNotFound(_)));

        let file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        let err = importer.import_items(file.path(), None).unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat(_)));
    }
}
