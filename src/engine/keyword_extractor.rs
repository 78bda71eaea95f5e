// ==========================================
// 定额匹配系统 - 关键词提取
// ==========================================
// 输入: 清单/定额的名称或特征描述
// 输出: 去重、去停用词、按区分度排序的关键词列表
// 约束: 纯函数，相同输入总是得到相同的有序输出；空输入返回空列表
// ==========================================

use crate::engine::lexicon::Lexicon;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\p{Z}]+").expect("whitespace pattern"));
static BRACKET_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[（）()【】\[\]《》<>]").expect("bracket pattern"));
static DIGIT_WITH_UNIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+[路块个套台TGMK]+").expect("digit unit pattern"));
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("digit pattern"));
static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s\p{P}\p{S}\d]+").expect("separator pattern"));
/// 括号及其内容（配件、规格等次要信息）
static BRACKETED_CONTENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[（(].*?[）)]").expect("bracketed content pattern"));

const MIN_FRAGMENT_CHARS: usize = 2;
const MAX_FRAGMENT_CHARS: usize = 20;
const MAX_PHRASE_CHARS: usize = 4;
const MIN_PHRASE_CHARS: usize = 2;
const MIN_KEYWORD_CHARS: usize = 2;

/// CJK 统一表意文字基本区
pub fn is_cjk(c: char) -> bool {
    ('\u{4E00}'..='\u{9FA5}').contains(&c)
}

/// 去除括号及括号内内容并去除首尾空白
pub fn strip_bracketed(text: &str) -> String {
    BRACKETED_CONTENT.replace_all(text, "").trim().to_string()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

// ==========================================
// KeywordExtractor
// ==========================================
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    lexicon: Arc<Lexicon>,
}

impl KeywordExtractor {
    pub fn new(lexicon: Arc<Lexicon>) -> Self {
        Self { lexicon }
    }

    pub fn lexicon(&self) -> &Arc<Lexicon> {
        &self.lexicon
    }

    /// 提取关键词
    ///
    /// # 步骤
    /// 1. 合并空白、去括号字符、去数字+单位与纯数字
    /// 2. 按标点/空白/数字切分，保留 2-20 字的中文与拉丁字母片段
    /// 3. 4→2 字滑动窗口提取全中文词组
    /// 4. 核心概念词与同义词表命中词无条件加入
    /// 5. 去停用词、去重后排序
    pub fn extract(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        let cleaned = Self::clean(trimmed);
        let mut candidates: Vec<String> = Vec::new();

        self.collect_fragments(&cleaned, &mut candidates);
        Self::collect_phrases(&cleaned, &mut candidates);
        self.collect_known_terms(text, &mut candidates);

        let mut seen: HashSet<String> = HashSet::new();
        let mut keywords: Vec<String> = candidates
            .into_iter()
            .filter(|k| char_len(k) >= MIN_KEYWORD_CHARS)
            .filter(|k| !self.lexicon.is_stop_word(k))
            .filter(|k| seen.insert(k.clone()))
            .collect();

        keywords.sort_by(|a, b| self.compare_importance(a, b));
        keywords
    }

    /// 名称与特征分别提取后拼接（名称在前）
    pub fn extract_fields(&self, name: Option<&str>, feature: Option<&str>) -> Vec<String> {
        let mut keywords = Vec::new();
        for text in [name, feature].into_iter().flatten() {
            if !text.trim().is_empty() {
                keywords.extend(self.extract(text));
            }
        }
        keywords
    }

    pub fn is_core_concept(&self, keyword: &str) -> bool {
        self.lexicon.is_core_concept(keyword)
    }

    fn clean(text: &str) -> String {
        let s = WHITESPACE.replace_all(text, " ");
        let s = BRACKET_CHARS.replace_all(&s, "");
        let s = DIGIT_WITH_UNIT.replace_all(&s, "");
        DIGITS.replace_all(&s, "").into_owned()
    }

    fn collect_fragments(&self, cleaned: &str, out: &mut Vec<String>) {
        for part in SEPARATORS.split(cleaned) {
            let len = char_len(part);
            if !(MIN_FRAGMENT_CHARS..=MAX_FRAGMENT_CHARS).contains(&len) {
                continue;
            }
            let kept: String = part
                .chars()
                .filter(|c| is_cjk(*c) || c.is_ascii_alphabetic())
                .collect();
            if char_len(&kept) >= MIN_FRAGMENT_CHARS {
                out.push(kept);
            }
        }
    }

    fn collect_phrases(cleaned: &str, out: &mut Vec<String>) {
        let chars: Vec<char> = cleaned.chars().collect();
        for len in (MIN_PHRASE_CHARS..=MAX_PHRASE_CHARS).rev() {
            if chars.len() < len {
                continue;
            }
            for window in chars.windows(len) {
                if window.iter().all(|c| is_cjk(*c)) {
                    out.push(window.iter().collect());
                }
            }
        }
    }

    fn collect_known_terms(&self, text: &str, out: &mut Vec<String>) {
        for term in self.lexicon.scan_terms() {
            if text.contains(term.as_str()) {
                out.push(term.clone());
            }
        }
        if let Some(acronym) = self.lexicon.acronym_in(text) {
            out.push(acronym.to_string());
        }
    }

    /// 核心概念词优先，其次按长度降序，最后按字典序
    fn compare_importance(&self, a: &str, b: &str) -> Ordering {
        let a_core = self.lexicon.is_core_concept(a);
        let b_core = self.lexicon.is_core_concept(b);
        b_core
            .cmp(&a_core)
            .then_with(|| char_len(b).cmp(&char_len(a)))
            .then_with(|| a.cmp(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> KeywordExtractor {
        KeywordExtractor::new(Lexicon::standard())
    }

    #[test]
    fn test_empty_input() {
        let ex = extractor();
        assert!(ex.extract("").is_empty());
        assert!(ex.extract("   ").is_empty());
        assert!(ex.extract_fields(None, Some("  ")).is_empty());
    }

    #[test]
    fn test_scenario_compound_phrase_recovery() {
        let kws = extractor().extract("网络硬盘录像机");
        for expected in ["网络硬盘", "硬盘录像", "录像机", "硬盘录像机", "网络硬盘录像机"] {
            assert!(kws.contains(&expected.to_string()), "应提取出 {}: {:?}", expected, kws);
        }
    }

    #[test]
    fn test_scenario_digit_units_removed() {
        let kws = extractor().extract("16路NVR 8T硬盘");
        assert!(kws.iter().all(|k| !k.chars().any(|c| c.is_ascii_digit())), "{:?}", kws);
        assert!(!kws.contains(&"路".to_string()));
        assert_eq!(kws[0], "NVR", "核心概念词应排在最前: {:?}", kws);
    }

    #[test]
    fn test_scenario_core_concepts_first_then_length() {
        let kws = extractor().extract("监控摄像机");
        let first_non_core = kws
            .iter()
            .position(|k| !Lexicon::standard().is_core_concept(k))
            .unwrap();
        assert!(
            kws[..first_non_core].iter().all(|k| Lexicon::standard().is_core_concept(k)),
            "核心概念词应全部排在前面: {:?}",
            kws
        );
        let tail = &kws[first_non_core..];
        for pair in tail.windows(2) {
            assert!(
                char_len(&pair[0]) >= char_len(&pair[1]),
                "非核心词应按长度降序: {:?}",
                tail
            );
        }
    }

    #[test]
    fn test_scenario_lowercase_acronym() {
        let kws = extractor().extract("海康nvr");
        assert!(kws.contains(&"NVR".to_string()), "{:?}", kws);
    }

    #[test]
    fn test_stop_words_and_single_chars_dropped() {
        let kws = extractor().extract("台 套 的");
        assert!(kws.is_empty(), "{:?}", kws);
    }

    #[test]
    fn test_extract_is_deterministic() {
        let ex = extractor();
        let text = "室外高清网络摄像机（含支架）200万像素 POE供电";
        let first = ex.extract(text);
        for _ in 0..5 {
            assert_eq!(ex.extract(text), first, "同一输入应得到相同有序输出");
        }
        let unique: HashSet<&String> = first.iter().collect();
        assert_eq!(unique.len(), first.len(), "关键词不应重复");
    }

    #[test]
    fn test_scenario_learned_term_found_without_separator() {
        use crate::domain::learning::MatchingRule;

        let text = "华为ONU设备";
        assert!(
            !extractor().extract(text).contains(&"ONU".to_string()),
            "无学习规则时 ONU 不应单独出现"
        );

        let rule = MatchingRule::synonym("ONU", vec!["ONU".to_string(), "光网络单元".to_string()], 0.9);
        let learned = KeywordExtractor::new(Arc::new(Lexicon::standard().with_learned_rules(&[rule])));
        let kws = learned.extract(text);
        assert!(kws.contains(&"ONU".to_string()), "学习到的词应被扫描提取: {:?}", kws);
    }

    #[test]
    fn test_strip_bracketed() {
        assert_eq!(strip_bracketed("摄像机（含支架）"), "摄像机");
        assert_eq!(strip_bracketed("录像机(16路) "), "录像机");
        assert_eq!(strip_bracketed("（全部）"), "");
    }
}
