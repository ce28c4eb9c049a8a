//! 检测器接口与基于规则文件的检测器
use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{Result, ScrubError};
use crate::rules::{load_rule_specs, RuleKind, RuleSpec};
use crate::types::Span;

/// 实体检测器：给定文本、语言与阈值，返回候选区间（score ≥ threshold）
///
/// 空文本必须返回空集合。检测失败直接作为错误交给调用方。
pub trait Detector: Send + Sync {
    fn analyze(&self, text: &str, language: &str, threshold: f32) -> Result<Vec<Span>>;
}

/// 一条已编译的正则规则
struct PatternRule {
    rule: usize,
    regex: regex::Regex,
}

/// 同一大小写模式下的词典自动机
struct TermMatcher {
    ac: AhoCorasick,
    /// AC 模式索引 -> 规则索引
    pattern_to_rule: Vec<usize>,
}

/// 规则文件驱动的检测器：正则 + 词典
pub struct RuleDetector {
    specs: Vec<RuleSpec>,
    patterns: Vec<PatternRule>,
    terms: Vec<TermMatcher>,
}

impl RuleDetector {
    /// 从规则条目构建；无法编译的正则跳过并记录 warn
    pub fn from_specs(specs: Vec<RuleSpec>) -> Result<Self> {
        let mut patterns = Vec::new();
        let mut sensitive: (Vec<String>, Vec<usize>) = (Vec::new(), Vec::new());
        let mut insensitive: (Vec<String>, Vec<usize>) = (Vec::new(), Vec::new());

        for (idx, r) in specs.iter().enumerate() {
            match &r.kind {
                RuleKind::Pattern(pat) => match regex::Regex::new(pat) {
                    Ok(regex) => patterns.push(PatternRule { rule: idx, regex }),
                    Err(e) => warn!(rule = %r.id, error = %e, "skipping rule with invalid pattern"),
                },
                RuleKind::Terms { terms, case_insensitive } => {
                    let bucket = if *case_insensitive { &mut insensitive } else { &mut sensitive };
                    for t in terms.iter().filter(|t| !t.is_empty()) {
                        bucket.0.push(t.clone());
                        bucket.1.push(idx);
                    }
                }
            }
        }

        let mut terms = Vec::new();
        for ((words, owners), ci) in [(sensitive, false), (insensitive, true)] {
            if words.is_empty() {
                continue;
            }
            let ac = AhoCorasickBuilder::new()
                .match_kind(MatchKind::LeftmostLongest)
                .ascii_case_insensitive(ci)
                .build(&words)
                .map_err(|e| ScrubError::Rules(anyhow::anyhow!("build term automaton: {e}")))?;
            terms.push(TermMatcher { ac, pattern_to_rule: owners });
        }

        debug!(rules = specs.len(), patterns = patterns.len(), term_sets = terms.len(), "detector built");
        Ok(Self { specs, patterns, terms })
    }

    /// 从 TOML 规则文件构建
    pub fn from_path(path: &Path) -> Result<Self> {
        let specs = load_rule_specs(path).map_err(ScrubError::Rules)?;
        Self::from_specs(specs)
    }

    pub fn rule_count(&self) -> usize {
        self.specs.len()
    }
}

/// 词典命中须落在词边界上
fn on_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let before = text[..start].chars().next_back().map_or(true, |c| !is_word(c));
    let after = text[end..].chars().next().map_or(true, |c| !is_word(c));
    before && after
}

impl Detector for RuleDetector {
    fn analyze(&self, text: &str, language: &str, threshold: f32) -> Result<Vec<Span>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen: HashSet<(usize, usize, usize)> = HashSet::new();
        let mut spans = Vec::new();
        let mut push = |rule: usize, start: usize, end: usize| {
            let spec = &self.specs[rule];
            if end <= start || spec.score < threshold || !spec.applies_to(language) {
                return;
            }
            if seen.insert((start, end, rule)) {
                spans.push(Span::from_parts(start, end, &spec.entity_type, spec.score));
            }
        };

        for p in &self.patterns {
            // 优先使用第 1 个捕获组，便于规则携带前后文
            for caps in p.regex.captures_iter(text) {
                let Some(m) = caps.get(1).or_else(|| caps.get(0)) else { continue };
                push(p.rule, m.start(), m.end());
            }
        }

        for t in &self.terms {
            for m in t.ac.find_iter(text) {
                if !on_word_boundary(text, m.start(), m.end()) {
                    continue;
                }
                push(t.pattern_to_rule[m.pattern().as_usize()], m.start(), m.end());
            }
        }

        spans.sort_by_key(|s| (s.start(), s.end()));
        Ok(spans)
    }
}
