// ==========================================
// 定额匹配系统 - 匹配学习领域模型
// ==========================================
// 对齐: keyword_weight / matching_rule / matching_learning_record 表
// ==========================================

use crate::domain::types::{MatchType, RuleType};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 关键词权重下限
pub const MIN_KEYWORD_WEIGHT: f64 = 0.5;
/// 关键词权重上限
pub const MAX_KEYWORD_WEIGHT: f64 = 2.0;
/// 默认关键词权重
pub const NEUTRAL_KEYWORD_WEIGHT: f64 = 1.0;

// ==========================================
// KeywordList - 关键词有序列表
// ==========================================
// 存储格式: {"v":1,"keywords":[...]}
// 读取时兼容旧数据的裸 JSON 数组
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeywordList(pub Vec<String>);

/// 当前存储格式版本
pub const KEYWORD_LIST_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct KeywordListEnvelope {
    v: u32,
    keywords: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredKeywordList {
    Envelope(KeywordListEnvelope),
    Legacy(Vec<String>),
}

impl KeywordList {
    pub fn new(keywords: Vec<String>) -> Self {
        Self(keywords)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    /// 编码为存储格式
    pub fn to_storage(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&KeywordListEnvelope {
            v: KEYWORD_LIST_FORMAT_VERSION,
            keywords: self.0.clone(),
        })
    }

    /// 从存储格式解码（空字符串视为空列表）
    pub fn from_storage(raw: &str) -> Result<Self, serde_json::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        match serde_json::from_str::<StoredKeywordList>(raw)? {
            StoredKeywordList::Envelope(env) => Ok(Self(env.keywords)),
            StoredKeywordList::Legacy(list) => Ok(Self(list)),
        }
    }
}

impl From<Vec<String>> for KeywordList {
    fn from(v: Vec<String>) -> Self {
        Self(v)
    }
}

// ==========================================
// KeywordWeight - 关键词权重
// ==========================================
// 首次观察到时创建，由学习引擎更新
// 约束: weight ∈ [0.5, 2.0]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordWeight {
    pub id: Option<i64>,
    pub keyword: String, // 唯一
    pub weight: f64,
    pub match_count: f64, // 加权成功次数（手动记录计 1.0，自动记录计 0.5）
    pub total_count: i64, // 出现总次数
    pub success_rate: f64,
    pub is_core_concept: bool,
    pub update_time: Option<NaiveDateTime>,
}

impl KeywordWeight {
    pub fn new(keyword: impl Into<String>, is_core_concept: bool) -> Self {
        Self {
            id: None,
            keyword: keyword.into(),
            weight: NEUTRAL_KEYWORD_WEIGHT,
            match_count: 0.0,
            total_count: 0,
            success_rate: 0.0,
            is_core_concept,
            update_time: None,
        }
    }

    /// 累计一次观察并重算成功率与权重
    ///
    /// weight = clamp(1.0 + (success_rate - 0.5) * 2.0, 0.5, 2.0)
    pub fn observe(&mut self, learning_weight: f64) {
        self.total_count += 1;
        self.match_count += learning_weight;
        self.recompute();
    }

    pub fn recompute(&mut self) {
        if self.total_count > 0 {
            self.success_rate = self.match_count / self.total_count as f64;
        }
        let raw = NEUTRAL_KEYWORD_WEIGHT + (self.success_rate - 0.5) * 2.0;
        self.weight = raw.clamp(MIN_KEYWORD_WEIGHT, MAX_KEYWORD_WEIGHT);
    }
}

// ==========================================
// MatchingRule - 匹配规则
// ==========================================
// rule_value: 相关词集合（存储为 KeywordList 格式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingRule {
    pub id: Option<i64>,
    pub rule_type: RuleType,
    pub source_text: String,
    pub target_text: String,
    pub rule_value: KeywordList,
    pub confidence: f64,
    pub usage_count: i64,
    pub create_time: Option<NaiveDateTime>,
    pub update_time: Option<NaiveDateTime>,
}

impl MatchingRule {
    /// 新建同义词规则（目标词指向自身）
    pub fn synonym(keyword: impl Into<String>, related: Vec<String>, confidence: f64) -> Self {
        let keyword = keyword.into();
        Self {
            id: None,
            rule_type: RuleType::Synonym,
            source_text: keyword.clone(),
            target_text: keyword,
            rule_value: KeywordList::new(related),
            confidence,
            usage_count: 0,
            create_time: None,
            update_time: None,
        }
    }

    /// 规则是否覆盖该关键词
    pub fn covers(&self, keyword: &str) -> bool {
        self.source_text == keyword || self.target_text == keyword
    }
}

// ==========================================
// LearningRecord - 匹配学习记录
// ==========================================
// 追加写入，创建后不再修改（仅刷新时间戳）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRecord {
    pub id: Option<i64>,
    pub item_name: Option<String>,
    pub item_feature_value: Option<String>,
    pub quota_name: Option<String>,
    pub quota_feature_value: Option<String>,
    pub match_score: f64,
    pub match_type: MatchType,
    pub item_keywords: KeywordList,
    pub quota_keywords: KeywordList,
    pub common_keywords: KeywordList,
    pub learning_weight: f64, // 手动 > 自动
    pub create_time: Option<NaiveDateTime>,
    pub update_time: Option<NaiveDateTime>,
}

impl LearningRecord {
    /// 同义词分组键: 定额名称 + 定额特征
    pub fn quota_group_key(&self) -> String {
        format!(
            "{}|{}",
            self.quota_name.as_deref().unwrap_or(""),
            self.quota_feature_value.as_deref().unwrap_or("")
        )
    }
}
