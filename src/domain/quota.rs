// ==========================================
// 定额匹配系统 - 企业定额领域模型
// ==========================================
// 对齐: enterprise_quota / project_item_quota 表
// 红线: 匹配运行期间定额只读
// ==========================================

use serde::{Deserialize, Serialize};

// ==========================================
// EnterpriseQuota - 企业定额
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EnterpriseQuota {
    pub id: i64,
    pub quota_code: Option<String>,    // 定额编号
    pub quota_name: Option<String>,    // 定额名称
    pub feature_value: Option<String>, // 项目特征
    pub unit: Option<String>,
    pub unit_price: Option<f64>, // 单价

    // ===== 费用组成 =====
    pub labor_cost: Option<f64>,    // 人工费
    pub material_cost: Option<f64>, // 材料费
    pub machine_cost: Option<f64>,  // 机械费

    pub remark: Option<String>,
    pub version_id: Option<i64>, // 定额版本（可选）
}

// ==========================================
// ItemQuotaAssociation - 清单条目与定额的多对多关联
// ==========================================
// 定额字段为添加时的快照，定额后续变更不回写
// 不变量: status=多定额 时，合价 = Σ unit_price × 工程量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ItemQuotaAssociation {
    pub id: i64,
    pub project_item_id: i64,
    pub quota_id: i64,
    pub quota_code: Option<String>,
    pub quota_name: Option<String>,
    pub quota_feature_value: Option<String>,
    pub unit_price: Option<f64>,
    pub sort_order: i32,
}

impl ItemQuotaAssociation {
    /// 由定额生成关联快照（id 由存储层分配）
    pub fn snapshot(project_item_id: i64, quota: &EnterpriseQuota, sort_order: i32) -> Self {
        Self {
            id: 0,
            project_item_id,
            quota_id: quota.id,
            quota_code: quota.quota_code.clone(),
            quota_name: quota.quota_name.clone(),
            quota_feature_value: quota.feature_value.clone(),
            unit_price: quota.unit_price,
            sort_order,
        }
    }
}

/// 关联单价之和（忽略缺失单价）
pub fn sum_unit_prices(associations: &[ItemQuotaAssociation]) -> f64 {
    associations.iter().filter_map(|a| a.unit_price).sum()
}
