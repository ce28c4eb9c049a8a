//! 文本变换：脱敏（Anonymize）、去标识（Deidentify）、还原（Reidentify）
use std::cmp::Ordering;
use tracing::debug;

use crate::error::Result;
use crate::store::{allocate_placeholder, Mapping, Vault};
use crate::types::{Outcome, Span};

/// 选出实际参与替换的区间，按起点降序返回（从后往前替换，前面的偏移保持有效）
///
/// 解析结果里不同类型之间可能重叠，这里统一裁决：
/// 长度优先，其次分数高者，再其次起点靠前者；与已选区间相交的直接丢弃。
/// 不落在 `text` 字符边界内的区间同样丢弃。
pub fn select_for_substitution<'s>(text: &str, spans: &'s [Span]) -> Vec<&'s Span> {
    let mut candidates: Vec<&Span> = spans.iter().filter(|s| s.fits(text)).collect();
    candidates.sort_by(|a, b| {
        b.byte_len()
            .cmp(&a.byte_len())
            .then_with(|| b.score().partial_cmp(&a.score()).unwrap_or(Ordering::Equal))
            .then_with(|| a.start().cmp(&b.start()))
    });

    let mut chosen: Vec<&Span> = Vec::with_capacity(candidates.len());
    for s in candidates {
        if chosen.iter().all(|c| !c.overlaps(s.start(), s.end())) {
            chosen.push(s);
        }
    }
    if chosen.len() < spans.len() {
        debug!(dropped = spans.len() - chosen.len(), "spans dropped before substitution");
    }
    chosen.sort_by(|a, b| b.start().cmp(&a.start()));
    chosen
}

/// 不可逆脱敏：每个区间替换为 `<TYPE>`
///
/// 返回的数量是解析后的区间数，而不是实际替换次数。
pub fn anonymize(text: &str, spans: &[Span]) -> Outcome {
    let mut out = text.to_string();
    for s in select_for_substitution(text, spans) {
        out.replace_range(s.start()..s.end(), &format!("<{}>", s.entity_type()));
    }
    Outcome { result: out, entities_found: spans.len() }
}

/// 可逆去标识：每个区间替换为新分配的占位符，原值写入映射表
///
/// 整个过程在映射表写锁内完成；分配顺序为起点降序（文本中越靠后编号越小）。
/// 映射持久化失败时返回错误，调用方拿不到无法还原的文本。
pub fn deidentify(text: &str, spans: &[Span], vault: &Vault) -> Result<Outcome> {
    let chosen = select_for_substitution(text, spans);
    if chosen.is_empty() {
        return Ok(Outcome { result: text.to_string(), entities_found: spans.len() });
    }

    let result = vault.update(|mapping| {
        let mut out = text.to_string();
        for s in &chosen {
            let placeholder = allocate_placeholder(s.entity_type(), mapping);
            mapping.insert(placeholder.clone(), text[s.start()..s.end()].to_string());
            out.replace_range(s.start()..s.end(), &placeholder);
        }
        out
    })?;

    debug!(placeholders = chosen.len(), "text deidentified");
    Ok(Outcome { result, entities_found: spans.len() })
}

/// 按还原顺序排列映射条目：占位符长度降序，等长按字典序升序
///
/// 空键（只可能来自手工编辑的映射文件）不参与还原。
pub fn restore_order(mapping: &Mapping) -> Vec<(&str, &str)> {
    let mut entries: Vec<(&str, &str)> =
        mapping.iter().filter(|(k, _)| !k.is_empty()).map(|(k, v)| (k.as_str(), v.as_str())).collect();
    entries.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(b.0)));
    entries
}

/// 对给定映射执行还原
///
/// 依次对每个占位符做全局子串替换（不限定词边界）。若某原值本身包含另一个
/// 占位符，只有当后者排在更后面时才会被继续展开。
pub fn reidentify_with(text: &str, mapping: &Mapping) -> String {
    let mut out = text.to_string();
    for (placeholder, original) in restore_order(mapping) {
        if out.contains(placeholder) {
            out = out.replace(placeholder, original);
        }
    }
    out
}

/// 还原：不运行检测，实体数恒为 0，不修改映射表
pub fn reidentify(text: &str, vault: &Vault) -> Outcome {
    let result = vault.read(|mapping| reidentify_with(text, mapping));
    Outcome { result, entities_found: 0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::PERSON;

    fn span(start: usize, end: usize, ty: &str, score: f32) -> Span {
        Span::new(start, end, ty, score).unwrap()
    }

    fn mapping(pairs: &[(&str, &str)]) -> Mapping {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn anonymize_without_spans_is_identity() {
        let out = anonymize("nothing to see", &[]);
        assert_eq!(out, Outcome { result: "nothing to see".into(), entities_found: 0 });
    }

    #[test]
    fn anonymize_replaces_with_type_tags() {
        let text = "John Smith <john@example.com>";
        let spans = vec![span(0, 10, PERSON, 0.85), span(12, 28, "EMAIL_ADDRESS", 1.0)];
        let out = anonymize(text, &spans);
        assert_eq!(out.result, "<PERSON> <<EMAIL_ADDRESS>>");
        assert_eq!(out.entities_found, 2);
    }

    #[test]
    fn longest_span_wins_cross_type_overlap() {
        // "john@johnsmith.com"：PERSON 落在邮箱内部
        let text = "john@johnsmith.com";
        let spans = vec![span(5, 14, PERSON, 0.95), span(0, 18, "EMAIL_ADDRESS", 0.6)];
        let out = anonymize(text, &spans);
        assert_eq!(out.result, "<EMAIL_ADDRESS>");
        assert_eq!(out.entities_found, 2);
    }

    #[test]
    fn equal_length_overlap_prefers_higher_score() {
        let spans = vec![span(0, 5, "LOCATION", 0.4), span(2, 7, PERSON, 0.9)];
        let chosen = select_for_substitution("0123456789", &spans);
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].entity_type(), PERSON);
    }

    #[test]
    fn full_tie_prefers_earlier_start() {
        let spans = vec![span(2, 7, "B", 0.5), span(0, 5, "A", 0.5)];
        let chosen = select_for_substitution("0123456789", &spans);
        assert_eq!(chosen.len(), 1);
        assert_eq!(chosen[0].entity_type(), "A");
    }

    #[test]
    fn selection_is_descending_by_start() {
        let spans = vec![span(0, 2, "A", 0.5), span(10, 12, "B", 0.5), span(4, 6, "C", 0.5)];
        let starts: Vec<usize> = select_for_substitution("0123456789abcdef", &spans).iter().map(|s| s.start()).collect();
        assert_eq!(starts, vec![10, 4, 0]);
    }

    #[test]
    fn spans_outside_text_are_ignored() {
        let spans = vec![span(0, 3, "A", 0.5), span(2, 40, "B", 0.9)];
        let out = anonymize("abcdef", &spans);
        assert_eq!(out.result, "<A>def");
    }

    #[test]
    fn deidentify_numbers_from_the_end() {
        let vault = Vault::new(MemoryStore::default());
        let text = "Ann met Bob";
        let spans = vec![span(0, 3, PERSON, 0.9), span(8, 11, PERSON, 0.9)];
        let out = deidentify(text, &spans, &vault).unwrap();
        assert_eq!(out.result, "PERSON_002 met PERSON_001");
        let m = vault.snapshot();
        assert_eq!(m["PERSON_001"], "Bob");
        assert_eq!(m["PERSON_002"], "Ann");
    }

    #[test]
    fn deidentify_then_reidentify_round_trips() {
        let vault = Vault::new(MemoryStore::default());
        let text = "François <f@example.fr> lives in München";
        let spans = vec![span(0, 9, PERSON, 0.9), span(11, 23, "EMAIL_ADDRESS", 1.0), span(34, 42, "LOCATION", 0.7)];
        let out = deidentify(text, &spans, &vault).unwrap();
        assert_eq!(out.result, "PERSON_001 <EMAIL_ADDRESS_001> lives in LOCATION_001");
        assert_eq!(reidentify(&out.result, &vault).result, text);
    }

    #[test]
    fn deidentify_without_spans_leaves_store_untouched() {
        let vault = Vault::new(MemoryStore::default());
        let out = deidentify("plain", &[], &vault).unwrap();
        assert_eq!(out.result, "plain");
        assert!(vault.snapshot().is_empty());
    }

    #[test]
    fn reidentify_empty_mapping_is_identity() {
        let vault = Vault::new(MemoryStore::default());
        let out = reidentify("PERSON_001 says hi", &vault);
        assert_eq!(out, Outcome { result: "PERSON_001 says hi".into(), entities_found: 0 });
    }

    #[test]
    fn reidentify_longest_placeholder_first() {
        let m = mapping(&[("PERSON_100", "Short"), ("PERSON_1000", "Long")]);
        assert_eq!(reidentify_with("PERSON_1000 and PERSON_100", &m), "Long and Short");
    }

    #[test]
    fn reidentify_expands_nested_placeholder_sorting_later() {
        // 两个键等长，按字典序 PERSON_001 先展开，其值中的 PERSON_002 随后被展开
        let m = mapping(&[("PERSON_001", "John PERSON_002"), ("PERSON_002", "Smith")]);
        assert_eq!(reidentify_with("PERSON_001", &m), "John Smith");
    }

    #[test]
    fn reidentify_leaves_nested_placeholder_sorting_earlier() {
        // PERSON_001 已先处理完毕，PERSON_002 的值中再出现的 PERSON_001 不会被展开
        let m = mapping(&[("PERSON_001", "Smith"), ("PERSON_002", "John PERSON_001")]);
        assert_eq!(reidentify_with("PERSON_002", &m), "John PERSON_001");
    }

    #[test]
    fn reidentify_ignores_empty_placeholder() {
        let m = mapping(&[("", "x"), ("PERSON_001", "Ann")]);
        assert_eq!(restore_order(&m), vec![("PERSON_001", "Ann")]);
        assert_eq!(reidentify_with("abc PERSON_001", &m), "abc Ann");
    }

    #[test]
    fn reidentify_is_not_anchored_to_token_boundaries() {
        let m = mapping(&[("PERSON_001", "Ann")]);
        assert_eq!(reidentify_with("xPERSON_001y", &m), "xAnny");
    }
}
