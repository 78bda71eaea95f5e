// ==========================================
// 定额匹配系统 - 领域类型定义
// ==========================================
// 匹配状态 / 学习记录类型 / 规则类型
// 数据库存储均为整数或小写字符串
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 匹配状态 (Match Status)
// ==========================================
// 0=未匹配, 1=自动匹配, 2=手动单定额, 3=手动多定额
// 红线: 2/3 状态不参与自动重匹配，直到被显式清除
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MatchStatus {
    #[default]
    Unmatched,    // 未匹配
    AutoMatched,  // 自动匹配
    ManualSingle, // 手动设置单定额
    ManualMulti,  // 手动设置多定额
}

impl MatchStatus {
    pub fn as_code(&self) -> i32 {
        match self {
            MatchStatus::Unmatched => 0,
            MatchStatus::AutoMatched => 1,
            MatchStatus::ManualSingle => 2,
            MatchStatus::ManualMulti => 3,
        }
    }

    /// 未知编码按未匹配处理
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => MatchStatus::AutoMatched,
            2 => MatchStatus::ManualSingle,
            3 => MatchStatus::ManualMulti,
            _ => MatchStatus::Unmatched,
        }
    }

    /// 是否为人工锁定状态（不参与自动匹配）
    pub fn is_manual(&self) -> bool {
        matches!(self, MatchStatus::ManualSingle | MatchStatus::ManualMulti)
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStatus::Unmatched => write!(f, "UNMATCHED"),
            MatchStatus::AutoMatched => write!(f, "AUTO_MATCHED"),
            MatchStatus::ManualSingle => write!(f, "MANUAL_SINGLE"),
            MatchStatus::ManualMulti => write!(f, "MANUAL_MULTI"),
        }
    }
}

// ==========================================
// 匹配类型 (Match Type)
// ==========================================
// 学习记录的来源标签，与匹配状态 1/2/3 对齐
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    Auto,         // 自动匹配
    ManualSingle, // 手动单定额
    ManualMulti,  // 手动多定额
}

impl MatchType {
    pub fn as_code(&self) -> i32 {
        match self {
            MatchType::Auto => 1,
            MatchType::ManualSingle => 2,
            MatchType::ManualMulti => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(MatchType::Auto),
            2 => Some(MatchType::ManualSingle),
            3 => Some(MatchType::ManualMulti),
            _ => None,
        }
    }

    pub fn is_manual(&self) -> bool {
        !matches!(self, MatchType::Auto)
    }

    /// 由条目的匹配状态推导（未匹配没有对应类型）
    pub fn from_status(status: MatchStatus) -> Option<Self> {
        match status {
            MatchStatus::Unmatched => None,
            MatchStatus::AutoMatched => Some(MatchType::Auto),
            MatchStatus::ManualSingle => Some(MatchType::ManualSingle),
            MatchStatus::ManualMulti => Some(MatchType::ManualMulti),
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchType::Auto => write!(f, "AUTO"),
            MatchType::ManualSingle => write!(f, "MANUAL_SINGLE"),
            MatchType::ManualMulti => write!(f, "MANUAL_MULTI"),
        }
    }
}

// ==========================================
// 规则类型 (Rule Type)
// ==========================================
// 目前只有 synonym 会被生成
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Synonym,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::Synonym => "synonym",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "synonym" => Some(RuleType::Synonym),
            _ => None,
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 金额统一保留两位小数（与 precision=18, scale=2 的存储口径一致）
pub fn round_money(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_status_code_roundtrip() {
        for status in [
            MatchStatus::Unmatched,
            MatchStatus::AutoMatched,
            MatchStatus::ManualSingle,
            MatchStatus::ManualMulti,
        ] {
            assert_eq!(MatchStatus::from_code(status.as_code()), status);
        }
        assert_eq!(MatchStatus::from_code(99), MatchStatus::Unmatched, "未知编码应视为未匹配");
    }

    #[test]
    fn test_manual_status_flags() {
        assert!(!MatchStatus::Unmatched.is_manual());
        assert!(!MatchStatus::AutoMatched.is_manual());
        assert!(MatchStatus::ManualSingle.is_manual());
        assert!(MatchStatus::ManualMulti.is_manual());
    }

    #[test]
    fn test_match_type_from_status() {
        assert_eq!(MatchType::from_status(MatchStatus::Unmatched), None);
        assert_eq!(
            MatchType::from_status(MatchStatus::ManualMulti),
            Some(MatchType::ManualMulti)
        );
        assert!(MatchType::ManualSingle.is_manual());
        assert!(!MatchType::Auto.is_manual());
    }

    #[test]
    fn test_round_money() {
        assert_eq!(round_money(12.346), 12.35);
        assert_eq!(round_money(75.0), 75.0);
        assert_eq!(round_money(0.1 + 0.2), 0.3);
    }
}
