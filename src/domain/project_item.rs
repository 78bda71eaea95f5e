// ==========================================
// 定额匹配系统 - 工程量清单领域模型
// ==========================================
// 对齐: project_item 表
// 用途: 匹配层与 CRUD 层写入，其他层只读
// ==========================================

use crate::domain::quota::EnterpriseQuota;
use crate::domain::types::{round_money, MatchStatus};
use serde::{Deserialize, Serialize};

// ==========================================
// ProjectLineItem - 工程量清单条目
// ==========================================
// 不变量: total_price = quantity * matched_unit_price（两者都存在时），否则为 None
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProjectLineItem {
    // ===== 主键 =====
    pub id: i64,

    // ===== 归属 =====
    pub user_id: Option<i64>, // 所属用户

    // ===== 清单信息 =====
    pub item_code: Option<String>,     // 项目编码
    pub item_name: Option<String>,     // 项目名称
    pub feature_value: Option<String>, // 项目特征描述
    pub unit: Option<String>,          // 计量单位
    pub quantity: Option<f64>,         // 工程量

    // ===== 匹配结果 =====
    pub match_status: MatchStatus,
    pub matched_quota_id: Option<i64>,
    pub matched_quota_code: Option<String>,
    pub matched_quota_name: Option<String>,
    pub matched_quota_feature_value: Option<String>,
    pub matched_unit_price: Option<f64>, // 综合单价（多定额时为单价之和）
    pub total_price: Option<f64>,        // 合价

    pub remark: Option<String>,
}

impl ProjectLineItem {
    /// 计量单位是否为空（空单位的条目不参与自动匹配）
    pub fn has_blank_unit(&self) -> bool {
        self.unit.as_deref().map(|u| u.trim().is_empty()).unwrap_or(true)
    }

    /// 按当前单价重算合价
    pub fn recompute_total(&mut self) {
        self.total_price = match (self.quantity, self.matched_unit_price) {
            (Some(q), Some(p)) => Some(round_money(q * p)),
            _ => None,
        };
    }

    /// 写入匹配到的定额快照并重算合价
    pub fn apply_quota(&mut self, quota: &EnterpriseQuota, status: MatchStatus) {
        self.matched_quota_id = Some(quota.id);
        self.matched_quota_code = quota.quota_code.clone();
        self.matched_quota_name = quota.quota_name.clone();
        self.matched_quota_feature_value = quota.feature_value.clone();
        self.matched_unit_price = quota.unit_price;
        self.match_status = status;
        self.recompute_total();
    }

    /// 标记为未匹配并清除定额快照、单价与合价
    pub fn mark_unmatched(&mut self) {
        self.match_status = MatchStatus::Unmatched;
        self.matched_quota_id = None;
        self.matched_quota_code = None;
        self.matched_quota_name = None;
        self.matched_quota_feature_value = None;
        self.matched_unit_price = None;
        self.total_price = None;
    }
}
