//! 规则文件加载（TOML）
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

/// 单条规则的配置（正则规则支持 pattern 或 regex 字段；词典规则用 terms）
#[derive(Debug, Clone, Deserialize)]
struct RuleEntry {
    pub id: String,
    pub entity_type: String,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    pub case_insensitive: bool,
    #[serde(default)]
    pub score: Option<f32>,
    #[serde(default)]
    pub languages: Vec<String>,
}

/// 顶层规则文件结构
#[derive(Debug, Clone, Deserialize)]
struct RuleFile {
    #[serde(default)]
    pub rules: Vec<RuleEntry>,
}

/// 未写 score 的规则默认置信度
pub const DEFAULT_RULE_SCORE: f32 = 0.5;

/// 规则的匹配方式
#[derive(Debug, Clone, PartialEq)]
pub enum RuleKind {
    /// 正则；若有第 1 个捕获组则取捕获组范围
    Pattern(String),
    /// 词典字面量，整词匹配
    Terms { terms: Vec<String>, case_insensitive: bool },
}

/// 归一化后的规则规格
#[derive(Debug, Clone)]
pub struct RuleSpec {
    pub id: String,
    pub entity_type: String,
    pub kind: RuleKind,
    pub score: f32,
    /// 为空表示适用于所有语言
    pub languages: Vec<String>,
}

impl RuleSpec {
    pub fn applies_to(&self, language: &str) -> bool {
        self.languages.is_empty() || self.languages.iter().any(|l| l.eq_ignore_ascii_case(language))
    }
}

/// 从 TOML 规则文件加载并归一化为 RuleSpec 列表
pub fn load_rule_specs(path: &Path) -> Result<Vec<RuleSpec>> {
    let txt = std::fs::read_to_string(path).with_context(|| format!("read rule file {}", path.display()))?;
    parse_rule_specs(&txt).with_context(|| format!("parse rule file {}", path.display()))
}

/// 解析规则文本
pub fn parse_rule_specs(txt: &str) -> Result<Vec<RuleSpec>> {
    let parsed: RuleFile = toml::from_str(txt)?;
    let mut out = Vec::new();

    for e in parsed.rules {
        let score = e.score.unwrap_or(DEFAULT_RULE_SCORE);
        if !(0.0..=1.0).contains(&score) {
            bail!("rule `{}`: score {} outside [0, 1]", e.id, score);
        }
        if e.entity_type.trim().is_empty() {
            bail!("rule `{}`: empty entity_type", e.id);
        }
        // 兼容两种字段名：pattern 或 regex；都没有时看 terms
        let kind = match (e.pattern, e.regex) {
            (Some(p), _) => RuleKind::Pattern(p),
            (None, Some(r)) => RuleKind::Pattern(r),
            (None, None) if !e.terms.is_empty() => RuleKind::Terms { terms: e.terms, case_insensitive: e.case_insensitive },
            _ => continue,
        };
        out.push(RuleSpec { id: e.id, entity_type: e.entity_type, kind, score, languages: e.languages });
    }

    Ok(out)
}
