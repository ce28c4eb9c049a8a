//! 候选区间解析：把检测器的原始输出 + 策略输入整理为最终替换集合
//!
//! 流水线顺序固定，每一步消费上一步的输出：
//! 1. 类型过滤（`EntityFilter`，Unset/Empty 全部放行）
//! 2. 忽略名单（覆盖文本与名单条目精确相等则丢弃，区分大小写）
//! 3. 自定义人名注入（大小写不敏感、整词匹配，score = 1.0）
//! 4. “姓, 名” 模式补全（需名字已被独立检测到，score = 0.85）
//! 5. 相邻 PERSON 合并（间隔 ≤ 3 字节，覆盖 ", "）
//!
//! 输出按起始偏移升序；不同类型之间的重叠在这里不处理，留给替换阶段。
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::options::{EntityFilter, ResolvePolicy};
use crate::types::{Span, PERSON};

/// 自定义人名命中的置信度
pub const CUSTOM_NAME_SCORE: f32 = 1.0;
/// “姓, 名” 补全出的姓氏置信度
pub const LASTNAME_SCORE: f32 = 0.85;
/// 名字起点相对逗号后位置允许的偏移（容忍 0–2 个空白）
pub const FIRSTNAME_SLACK: usize = 2;
/// 相邻 PERSON 合并允许的最大间隔
pub const MERGE_GAP: usize = 3;

fn lastname_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 首字母大写的单词 + 逗号 + 至少一个空白
    RE.get_or_init(|| Regex::new(r"\b([A-Z][a-z]+),\s+").expect("compile lastname pattern"))
}

/// 运行完整解析流水线
pub fn resolve(text: &str, spans: Vec<Span>, policy: &ResolvePolicy) -> Vec<Span> {
    if text.is_empty() {
        return Vec::new();
    }

    let before = spans.len();
    let spans: Vec<Span> = spans
        .into_iter()
        .filter(|s| {
            let ok = s.fits(text);
            if !ok {
                debug!(start = s.start(), end = s.end(), entity_type = s.entity_type(), "dropping span outside text");
            }
            ok
        })
        .collect();

    let spans = filter_by_entity_types(spans, &policy.enabled);
    let spans = filter_ignore_list(text, spans, &policy.ignore_list);
    let spans = add_custom_names(text, spans, &policy.custom_names);
    let spans = add_lastname_firstname(text, spans);
    let spans = merge_adjacent_persons(spans);

    debug!(input = before, output = spans.len(), "spans resolved");
    spans
}

/// 步骤 1：按启用类型过滤
pub fn filter_by_entity_types(spans: Vec<Span>, enabled: &EntityFilter) -> Vec<Span> {
    if !enabled.is_restrictive() {
        return spans;
    }
    spans.into_iter().filter(|s| enabled.allows(s.entity_type())).collect()
}

/// 步骤 2：忽略名单精确匹配
pub fn filter_ignore_list(text: &str, spans: Vec<Span>, ignore_list: &[String]) -> Vec<Span> {
    if ignore_list.is_empty() {
        return spans;
    }
    spans
        .into_iter()
        .filter(|s| match s.covered(text) {
            Some(covered) => !ignore_list.iter().any(|w| w == covered),
            None => true,
        })
        .collect()
}

/// 步骤 3：注入自定义人名
///
/// 每个名字产出全部命中；只与进入本步骤前已保留的区间做相交判断，
/// 名字之间互相重叠的命中交给第 5 步合并。
pub fn add_custom_names(text: &str, spans: Vec<Span>, custom_names: &[String]) -> Vec<Span> {
    if custom_names.is_empty() {
        return spans;
    }

    let mut additional = Vec::new();
    for name in custom_names {
        if name.trim().is_empty() {
            continue;
        }
        let pattern = format!(r"(?i)\b{}\b", regex::escape(name));
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                warn!(error = %e, "skipping custom name that does not compile");
                continue;
            }
        };
        for m in re.find_iter(text) {
            if m.start() == m.end() {
                continue;
            }
            if spans.iter().any(|s| s.overlaps(m.start(), m.end())) {
                continue;
            }
            additional.push(Span::from_parts(m.start(), m.end(), PERSON, CUSTOM_NAME_SCORE));
        }
    }

    if !additional.is_empty() {
        debug!(count = additional.len(), "custom names injected");
    }
    let mut out = spans;
    out.extend(additional);
    out
}

/// 步骤 4：“姓, 名” 模式补全
///
/// 只有当逗号之后 0–2 个字节内已经有独立检测到的 PERSON 起点时才接受候选姓氏，
/// 避免把普通句子里的 “Word, ” 误判为人名。
pub fn add_lastname_firstname(text: &str, spans: Vec<Span>) -> Vec<Span> {
    let mut additional = Vec::new();

    for caps in lastname_pattern().captures_iter(text) {
        let (Some(whole), Some(word)) = (caps.get(0), caps.get(1)) else { continue };
        let comma_end = whole.end();

        let firstname_follows = spans
            .iter()
            .any(|s| s.is_person() && s.start() >= comma_end && s.start() <= comma_end + FIRSTNAME_SLACK);
        if !firstname_follows {
            continue;
        }
        if spans.iter().any(|s| s.overlaps(word.start(), word.end())) {
            continue;
        }
        additional.push(Span::from_parts(word.start(), word.end(), PERSON, LASTNAME_SCORE));
    }

    let mut out = spans;
    out.extend(additional);
    out
}

/// 步骤 5：相邻 PERSON 合并
///
/// 按起点排序后从左到右扫描；连续的 PERSON 只要间隔 ≤ `MERGE_GAP` 就并入同一段，
/// 合并结果沿用第一段的分数。非 PERSON 区间原样保留，并会打断合并链。
pub fn merge_adjacent_persons(mut spans: Vec<Span>) -> Vec<Span> {
    if spans.is_empty() {
        return spans;
    }
    spans.sort_by_key(|s| s.start());

    let mut merged = Vec::with_capacity(spans.len());
    let mut i = 0;
    while i < spans.len() {
        let cur = &spans[i];
        if !cur.is_person() {
            merged.push(cur.clone());
            i += 1;
            continue;
        }

        let mut end = cur.end();
        let mut j = i + 1;
        while j < spans.len() && spans[j].is_person() && spans[j].start() <= end + MERGE_GAP {
            end = end.max(spans[j].end());
            j += 1;
        }
        if j == i + 1 {
            merged.push(cur.clone());
        } else {
            merged.push(Span::from_parts(cur.start(), end, PERSON, cur.score()));
        }
        i = j;
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(start: usize, end: usize) -> Span {
        Span::new(start, end, PERSON, 0.85).unwrap()
    }

    fn span(start: usize, end: usize, ty: &str) -> Span {
        Span::new(start, end, ty, 0.7).unwrap()
    }

    fn ranges(spans: &[Span]) -> Vec<(usize, usize, &str)> {
        spans.iter().map(|s| (s.start(), s.end(), s.entity_type())).collect()
    }

    #[test]
    fn empty_text_yields_nothing() {
        let policy = ResolvePolicy { custom_names: vec!["John".into()], ..Default::default() };
        assert!(resolve("", vec![], &policy).is_empty());
    }

    #[test]
    fn empty_filter_keeps_every_span() {
        let spans = vec![person(0, 4), span(5, 10, "LOCATION"), span(11, 20, "EMAIL_ADDRESS")];
        let out = filter_by_entity_types(spans.clone(), &EntityFilter::Empty);
        assert_eq!(out, spans);
        let out = filter_by_entity_types(spans.clone(), &EntityFilter::Unset);
        assert_eq!(out, spans);
    }

    #[test]
    fn restrictive_filter_keeps_members() {
        let spans = vec![person(0, 4), span(5, 10, "LOCATION"), span(11, 20, "EMAIL_ADDRESS")];
        let out = filter_by_entity_types(spans, &EntityFilter::from_list(["PERSON", "EMAIL_ADDRESS"]));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|s| s.entity_type() != "LOCATION"));
    }

    #[test]
    fn ignore_list_is_exact_and_case_sensitive() {
        let text = "John lives in Australia";
        let spans = vec![person(0, 4), span(14, 23, "LOCATION")];

        let out = filter_ignore_list(text, spans.clone(), &["Australia".to_string()]);
        assert_eq!(ranges(&out), vec![(0, 4, PERSON)]);

        let out = filter_ignore_list(text, spans.clone(), &["australia".to_string()]);
        assert_eq!(out.len(), 2);
        let out = filter_ignore_list(text, spans, &["Austral".to_string()]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn custom_names_are_case_insensitive() {
        let text = "john smith works here";
        let out = add_custom_names(text, vec![], &["John Smith".to_string()]);
        assert_eq!(ranges(&out), vec![(0, 10, PERSON)]);
        assert_eq!(out[0].score(), CUSTOM_NAME_SCORE);
    }

    #[test]
    fn custom_names_yield_every_occurrence_on_word_boundaries() {
        let text = "Jane Doe met JANE DOE; Janedoe is someone else";
        let out = add_custom_names(text, vec![], &["Jane Doe".to_string(), "  ".to_string()]);
        assert_eq!(ranges(&out), vec![(0, 8, PERSON), (13, 21, PERSON)]);
    }

    #[test]
    fn custom_names_skip_already_covered_text() {
        let text = "mail jo@jane.org please";
        let existing = vec![span(5, 16, "EMAIL_ADDRESS")];
        let out = add_custom_names(text, existing, &["jane".to_string()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].entity_type(), "EMAIL_ADDRESS");
    }

    #[test]
    fn lastname_added_when_firstname_detected() {
        let text = "Smith, John is a person";
        let out = add_lastname_firstname(text, vec![person(7, 11)]);
        assert_eq!(out.len(), 2);
        assert!(out.iter().any(|s| s.start() == 0 && s.end() == 5 && s.score() == LASTNAME_SCORE));
    }

    #[test]
    fn lastname_requires_corroborating_firstname() {
        let text = "Smith, but no firstname detected";
        assert!(add_lastname_firstname(text, vec![]).is_empty());

        // 名字太远（超出 0–2 的容差）也不接受
        let text = "Smith, and then John";
        let out = add_lastname_firstname(text, vec![person(16, 20)]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn lastname_handles_multiple_pairs() {
        let text = "Smith, John and Doe, Jane are people";
        let out = add_lastname_firstname(text, vec![person(7, 11), person(21, 25)]);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn lastname_not_added_over_existing_span() {
        let text = "Smith, John";
        let out = add_lastname_firstname(text, vec![span(0, 5, "ORGANIZATION"), person(7, 11)]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn adjacent_persons_merge() {
        let out = merge_adjacent_persons(vec![person(7, 11), person(0, 5)]);
        assert_eq!(ranges(&out), vec![(0, 11, PERSON)]);
    }

    #[test]
    fn distant_persons_stay_apart() {
        // "John works with Jane"
        let out = merge_adjacent_persons(vec![person(0, 4), person(16, 20)]);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn merge_is_transitive_and_keeps_first_score() {
        let first = Span::new(0, 3, PERSON, 0.4).unwrap();
        let out = merge_adjacent_persons(vec![first, person(5, 8), person(10, 14)]);
        assert_eq!(ranges(&out), vec![(0, 14, PERSON)]);
        assert_eq!(out[0].score(), 0.4);
    }

    #[test]
    fn non_person_passes_through_and_breaks_run() {
        let out = merge_adjacent_persons(vec![person(0, 4), span(5, 9, "LOCATION"), person(10, 14)]);
        assert_eq!(ranges(&out), vec![(0, 4, PERSON), (5, 9, "LOCATION"), (10, 14, PERSON)]);
    }

    #[test]
    fn nested_person_spans_do_not_shrink() {
        let out = merge_adjacent_persons(vec![person(0, 10), person(0, 4)]);
        assert_eq!(ranges(&out), vec![(0, 10, PERSON)]);
    }

    #[test]
    fn full_pipeline_smith_john() {
        let text = "Smith, John";
        let out = resolve(text, vec![person(0, 5), person(7, 11)], &ResolvePolicy::default());
        assert_eq!(ranges(&out), vec![(0, 11, PERSON)]);
    }

    #[test]
    fn full_pipeline_lastname_then_merge() {
        let text = "Contact Smith, John today";
        let out = resolve(text, vec![person(15, 19)], &ResolvePolicy::default());
        assert_eq!(ranges(&out), vec![(8, 19, PERSON)]);
        assert_eq!(out[0].score(), LASTNAME_SCORE);
    }

    #[test]
    fn out_of_range_spans_are_dropped() {
        let out = resolve("short", vec![person(0, 50), person(0, 5)], &ResolvePolicy::default());
        assert_eq!(ranges(&out), vec![(0, 5, PERSON)]);
    }
}
