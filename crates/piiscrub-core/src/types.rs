//! 公共类型（对外暴露）
use serde::Serialize;

use crate::error::{Result, ScrubError};

/// 实体类型标签：开放字符串，不做枚举收敛（检测器给什么就接受什么）
pub type EntityType = String;

/// 人名类型标签，解析流水线中多处按它做特殊处理
pub const PERSON: &str = "PERSON";

/// 检测结果：文本中的半开区间 `[start, end)`，附带类型与置信度
///
/// - 偏移为 UTF-8 字节偏移，且必须落在字符边界上
/// - 值对象：创建后不可修改，解析各阶段只会产生新的 Span
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Span {
    start: usize,
    end: usize,
    entity_type: EntityType,
    score: f32,
}

impl Span {
    /// 构造并校验：`start < end`，`score` 位于 [0, 1]
    pub fn new(start: usize, end: usize, entity_type: impl Into<EntityType>, score: f32) -> Result<Self> {
        if start >= end {
            return Err(ScrubError::InvalidSpan { start, end, reason: "start must be before end" });
        }
        if !(0.0..=1.0).contains(&score) {
            return Err(ScrubError::InvalidSpan { start, end, reason: "score outside [0, 1]" });
        }
        Ok(Self { start, end, entity_type: entity_type.into(), score })
    }

    /// 内部构造：调用方已保证区间与分数合法
    pub(crate) fn from_parts(start: usize, end: usize, entity_type: &str, score: f32) -> Self {
        debug_assert!(start < end);
        Self { start, end, entity_type: entity_type.to_string(), score }
    }

    pub fn start(&self) -> usize { self.start }
    pub fn end(&self) -> usize { self.end }
    pub fn entity_type(&self) -> &str { &self.entity_type }
    pub fn score(&self) -> f32 { self.score }

    /// 覆盖的字节数（构造保证大于 0）
    pub fn byte_len(&self) -> usize { self.end - self.start }

    pub fn is_person(&self) -> bool { self.entity_type == PERSON }

    /// 区间相交（半开区间语义，首尾相接不算相交）
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.start < end && start < self.end
    }

    /// 是否是 `text` 内合法的切片位置
    pub fn fits(&self, text: &str) -> bool {
        self.end <= text.len() && text.is_char_boundary(self.start) && text.is_char_boundary(self.end)
    }

    /// 覆盖的原文片段；越界时返回 None
    pub fn covered<'t>(&self, text: &'t str) -> Option<&'t str> {
        text.get(self.start..self.end)
    }
}

/// 处理结果：变换后的文本 + 实体数量（对应原服务的 `result` / `entities_found`）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub result: String,
    pub entities_found: usize,
}
