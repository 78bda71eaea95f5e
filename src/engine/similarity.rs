// ==========================================
// 定额匹配系统 - 相似度评分
// ==========================================
// 双向评分: 名称 0.4 / 特征 0.3 / 关键词集合 0.3
// 缺失的一侧不参与加权，按实际参与的权重归一化
// 设备类型冲突（热成像/抓拍/普通）直接判 0
// ==========================================

use crate::engine::keyword_extractor::{strip_bracketed, KeywordExtractor};
use crate::engine::lexicon::{Lexicon, SynonymHit};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub const NAME_WEIGHT: f64 = 0.4;
pub const FEATURE_WEIGHT: f64 = 0.3;
pub const KEYWORD_SET_WEIGHT: f64 = 0.3;

const CORE_EXACT_SCORE: f64 = 2.0;
const EXACT_SCORE: f64 = 1.0;
const CORE_SYNONYM_SCORE: f64 = 1.5;
const SYNONYM_SCORE: f64 = 0.8;
const PARTIAL_SCORE: f64 = 0.5;
const CORE_MATCH_BOOST: f64 = 1.3;

/// 关键词提取失败时，文本互相包含的兜底得分
const CONTAINMENT_FALLBACK_SCORE: f64 = 0.3;
/// 文本互相包含时的保底得分
const CONTAINMENT_FLOOR_SCORE: f64 = 0.7;

// ==========================================
// TextProfile / MatchProfile - 评分输入的预处理结果
// ==========================================

/// 单段文本：去括号内容后的文本及其关键词
#[derive(Debug, Clone, PartialEq)]
pub struct TextProfile {
    pub cleaned: String,
    pub keywords: Vec<String>,
}

impl TextProfile {
    /// 空白文本返回 None（该侧不参与评分）
    pub fn build(extractor: &KeywordExtractor, raw: Option<&str>) -> Option<Self> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
        let cleaned = strip_bracketed(raw);
        let keywords = extractor.extract(&cleaned);
        Some(Self { cleaned, keywords })
    }
}

/// 清单条目或定额的评分画像
#[derive(Debug, Clone, PartialEq)]
pub struct MatchProfile {
    pub name: Option<TextProfile>,
    pub feature: Option<TextProfile>,
    /// 名称 + 特征的原文关键词
    pub keywords: Vec<String>,
}

impl MatchProfile {
    pub fn view(&self) -> ProfileView<'_> {
        ProfileView {
            name: self.name.as_ref(),
            feature: self.feature.as_ref(),
            keywords: &self.keywords,
        }
    }

    pub fn build(extractor: &KeywordExtractor, name: Option<&str>, feature: Option<&str>) -> Self {
        Self {
            name: TextProfile::build(extractor, name),
            feature: TextProfile::build(extractor, feature),
            keywords: extractor.extract_fields(name, feature),
        }
    }
}

/// 借用形式的评分画像（定额侧由 MatchCache 提供）
#[derive(Debug, Clone, Copy)]
pub struct ProfileView<'a> {
    pub name: Option<&'a TextProfile>,
    pub feature: Option<&'a TextProfile>,
    pub keywords: &'a [String],
}

// ==========================================
// SimilarityScorer
// ==========================================
#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    lexicon: Arc<Lexicon>,
    /// 学习得到的关键词权重（缺省 1.0），只作用于关键词集合子分
    keyword_weights: HashMap<String, f64>,
}

impl SimilarityScorer {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self {
            lexicon,
            keyword_weights: HashMap::new(),
        }
    }

    pub fn with_keyword_weights(mut self, weights: HashMap<String, f64>) -> Self {
        self.keyword_weights = weights;
        self
    }

    /// 条目与定额的综合得分，范围 [0, 1]
    pub fn score(&self, item: ProfileView<'_>, quota: ProfileView<'_>) -> f64 {
        if let (Some(a), Some(b)) = (item.name, quota.name) {
            if self.lexicon.has_conflicting_types(&a.cleaned, &b.cleaned) {
                return 0.0;
            }
        }

        let mut score = 0.0;
        let mut total_weight = 0.0;

        if let (Some(a), Some(b)) = (item.name, quota.name) {
            score += self.text_match_score(a, b) * NAME_WEIGHT;
            total_weight += NAME_WEIGHT;
        }

        if let (Some(a), Some(b)) = (item.feature, quota.feature) {
            score += self.text_match_score(a, b) * FEATURE_WEIGHT;
            total_weight += FEATURE_WEIGHT;
        }

        if !quota.keywords.is_empty() {
            let sim = self.set_similarity(item.keywords, quota.keywords, true, None);
            score += sim * KEYWORD_SET_WEIGHT;
            total_weight += KEYWORD_SET_WEIGHT;
        }

        if total_weight > 0.0 {
            score / total_weight
        } else {
            score
        }
    }

    /// 两段文本的匹配得分
    pub fn text_match_score(&self, a: &TextProfile, b: &TextProfile) -> f64 {
        let (t1, t2) = (a.cleaned.as_str(), b.cleaned.as_str());

        if a.keywords.is_empty() || b.keywords.is_empty() {
            return if t1.contains(t2) || t2.contains(t1) {
                CONTAINMENT_FALLBACK_SCORE
            } else {
                0.0
            };
        }

        if self.lexicon.has_conflicting_types(t1, t2) {
            return 0.0;
        }

        if t1 == t2 {
            return 1.0;
        }

        let similarity = self.set_similarity(&a.keywords, &b.keywords, false, None);
        if t1.contains(t2) || t2.contains(t1) {
            return similarity.max(CONTAINMENT_FLOOR_SCORE);
        }
        similarity
    }

    /// 关键词集合相似度（不含学习权重）
    pub fn keyword_similarity(&self, a: &[String], b: &[String]) -> f64 {
        self.set_similarity(a, b, false, None)
    }

    /// 关键词集合子分，同时记录命中的学习规则 ID
    pub fn keyword_similarity_traced(&self, a: &[String], b: &[String], rule_hits: &mut Vec<i64>) -> f64 {
        self.set_similarity(a, b, true, Some(rule_hits))
    }

    /// 核心算法
    ///
    /// - 完全相同: 核心词 2.0，其余 1.0
    /// - 同义词: 核心词 1.5，其余 0.8
    /// - 互相包含: 0.5
    /// - 除以两集合大小之和；存在核心词完全相同则 ×1.3
    fn set_similarity(
        &self,
        a: &[String],
        b: &[String],
        weighted: bool,
        mut rule_hits: Option<&mut Vec<i64>>,
    ) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }

        let set1: BTreeSet<&str> = a.iter().map(String::as_str).collect();
        let set2: BTreeSet<&str> = b.iter().map(String::as_str).collect();

        let mut intersection = 0.0;
        for k in &set1 {
            let weight = if weighted {
                self.keyword_weights.get(*k).copied().unwrap_or(1.0)
            } else {
                1.0
            };
            let core = self.lexicon.is_core_concept(k);

            if set2.contains(k) {
                intersection += weight * if core { CORE_EXACT_SCORE } else { EXACT_SCORE };
                continue;
            }

            let synonym = set2
                .iter()
                .find_map(|k2| self.lexicon.synonym_hit(k, k2));
            if let Some(hit) = synonym {
                intersection += weight * if core { CORE_SYNONYM_SCORE } else { SYNONYM_SCORE };
                if let (SynonymHit::Learned(rule_id), Some(hits)) = (hit, rule_hits.as_deref_mut()) {
                    hits.push(rule_id);
                }
                continue;
            }

            if set2.iter().any(|k2| k.contains(k2) || k2.contains(k)) {
                intersection += weight * PARTIAL_SCORE;
            }
        }

        let union = (set1.len() + set2.len()) as f64;
        let mut similarity = intersection / union;

        let core_match = set1
            .iter()
            .any(|k| self.lexicon.is_core_concept(k) && set2.contains(k));
        if core_match {
            similarity *= CORE_MATCH_BOOST;
        }

        similarity.min(1.0)
    }
}
