// ==========================================
// 定额匹配系统 - 词典（停用词 / 核心概念词 / 同义词 / 冲突类型词）
// ==========================================
// 静态词表在进程内只构建一次，之后只读共享
// 学习得到的同义词规则通过 with_learned_rules 叠加，不替换静态表
// ==========================================

use crate::domain::learning::MatchingRule;
use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

const STOP_WORDS: &[&str] = &[
    "的", "了", "在", "是", "和", "与", "或", "及", "等", "为", "由", "从", "到", "有", "无", "不",
    "非", "未", "已", "将", "要", "可", "能", "应", "该", "一", "二", "三", "四", "五", "六", "七",
    "八", "九", "十", "百", "千", "万", "m", "m²", "m³", "kg", "t", "mm", "cm", "dm", "km", "g",
    "个", "项", "套", "元", "块", "片", "根", "条", "张", "台", "辆", "座", "处", "段", "层", "级",
    "含", "包括", "包含", "配", "件", "路", "T", "G", "M",
];

/// 设备类型核心概念词（单字词在长度过滤后不会成为关键词，但仍参与核心判定）
const CORE_CONCEPTS: &[&str] = &[
    "摄像机", "摄像头", "录像机", "NVR", "硬盘录像机", "网络硬盘录像机", "监控", "设备", "系统",
    "装置", "机", "器", "仪", "表",
];

const STATIC_SYNONYM_GROUPS: &[&[&str]] = &[
    &["NVR", "网络硬盘录像机", "硬盘录像机", "录像机"],
    &["摄像机", "摄像头", "监控摄像头", "监控摄像机"],
];

/// 互斥的设备类型词：两段文本各含其中不同的一个即视为类型冲突
const CONFLICTING_TYPE_TERMS: &[&str] = &["热成像", "抓拍", "普通"];

/// 大小写不敏感识别的拉丁缩写
const CASE_INSENSITIVE_ACRONYM: &str = "NVR";

static STANDARD: Lazy<Arc<Lexicon>> = Lazy::new(|| Arc::new(Lexicon::build_standard()));

// ==========================================
// SynonymGroup - 同义词组
// ==========================================
#[derive(Debug, Clone)]
pub struct SynonymGroup {
    pub terms: HashSet<String>,
    /// 来源规则 ID（静态表为 None）
    pub rule_id: Option<i64>,
}

impl SynonymGroup {
    fn contains_both(&self, a: &str, b: &str) -> bool {
        self.terms.contains(a) && self.terms.contains(b)
    }
}

/// 同义词命中来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynonymHit {
    /// 仅大小写不同
    SameTerm,
    Static,
    Learned(i64),
}

// ==========================================
// Lexicon
// ==========================================
#[derive(Debug, Clone)]
pub struct Lexicon {
    stop_words: HashSet<String>,
    core_concepts: HashSet<String>,
    /// 文本扫描词（核心概念词 + 静态/学习同义词），有序以保证提取结果稳定
    scan_terms: Vec<String>,
    static_groups: Vec<SynonymGroup>,
    learned_groups: Vec<SynonymGroup>,
}

impl Lexicon {
    fn build_standard() -> Self {
        let static_groups: Vec<SynonymGroup> = STATIC_SYNONYM_GROUPS
            .iter()
            .map(|group| SynonymGroup {
                terms: group.iter().map(|t| t.to_string()).collect(),
                rule_id: None,
            })
            .collect();

        let scan_terms: BTreeSet<String> = CORE_CONCEPTS
            .iter()
            .chain(STATIC_SYNONYM_GROUPS.iter().flat_map(|g| g.iter()))
            .map(|t| t.to_string())
            .collect();

        Self {
            stop_words: STOP_WORDS.iter().map(|w| w.to_string()).collect(),
            core_concepts: CORE_CONCEPTS.iter().map(|w| w.to_string()).collect(),
            scan_terms: scan_terms.into_iter().collect(),
            static_groups,
            learned_groups: Vec::new(),
        }
    }

    /// 进程共享的标准词典
    pub fn standard() -> Arc<Lexicon> {
        Arc::clone(&STANDARD)
    }

    /// 叠加学习得到的同义词规则（组 = 源词 ∪ 规则相关词）
    ///
    /// 组内词同时加入扫描词，名称中无分隔的学习词也能被提取
    pub fn with_learned_rules(&self, rules: &[MatchingRule]) -> Lexicon {
        let mut lexicon = self.clone();
        lexicon.learned_groups = rules
            .iter()
            .map(|rule| {
                let mut terms: HashSet<String> = rule.rule_value.iter().cloned().collect();
                terms.insert(rule.source_text.clone());
                terms.insert(rule.target_text.clone());
                terms.retain(|t| !t.trim().is_empty());
                SynonymGroup {
                    terms,
                    rule_id: rule.id,
                }
            })
            .collect();

        let mut scan_terms: BTreeSet<String> = lexicon.scan_terms.drain(..).collect();
        scan_terms.extend(
            lexicon
                .learned_groups
                .iter()
                .flat_map(|g| g.terms.iter().cloned()),
        );
        lexicon.scan_terms = scan_terms.into_iter().collect();
        lexicon
    }

    pub fn learned_group_count(&self) -> usize {
        self.learned_groups.len()
    }

    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }

    pub fn is_core_concept(&self, word: &str) -> bool {
        self.core_concepts.contains(word) || word.eq_ignore_ascii_case(CASE_INSENSITIVE_ACRONYM)
    }

    pub fn scan_terms(&self) -> &[String] {
        &self.scan_terms
    }

    /// 文本是否包含大小写不敏感的缩写词
    pub fn acronym_in(&self, text: &str) -> Option<&'static str> {
        text.to_uppercase()
            .contains(CASE_INSENSITIVE_ACRONYM)
            .then_some(CASE_INSENSITIVE_ACRONYM)
    }

    /// 判断两个词是否同义，返回命中来源
    pub fn synonym_hit(&self, a: &str, b: &str) -> Option<SynonymHit> {
        if a.eq_ignore_ascii_case(b) {
            return Some(SynonymHit::SameTerm);
        }
        if self.static_groups.iter().any(|g| g.contains_both(a, b)) {
            return Some(SynonymHit::Static);
        }
        self.learned_groups
            .iter()
            .find(|g| g.contains_both(a, b))
            .map(|g| match g.rule_id {
                Some(id) => SynonymHit::Learned(id),
                None => SynonymHit::Static,
            })
    }

    /// 两段文本是否含互斥的设备类型词
    pub fn has_conflicting_types(&self, text1: &str, text2: &str) -> bool {
        CONFLICTING_TYPE_TERMS.iter().any(|a| {
            text1.contains(a)
                && CONFLICTING_TYPE_TERMS
                    .iter()
                    .any(|b| a != b && text2.contains(b))
        })
    }
}
