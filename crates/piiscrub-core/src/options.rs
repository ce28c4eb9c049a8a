//! 处理选项、实体类型过滤与统计信息（模块）
use std::collections::BTreeSet;
use std::str::FromStr;

use crate::error::ScrubError;

/// 文本变换动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// 不可逆脱敏：替换为 `<TYPE>`
    Anonymize,
    /// 可逆去标识：替换为编号占位符并写入映射表
    Deidentify,
    /// 还原：按映射表把占位符替换回原值
    Reidentify,
}

impl Action {
    /// 宽松解析：未知动作返回 None，调用方原样回显文本（实体数为 0）
    pub fn parse_lenient(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Anonymize => "anonymize",
            Action::Deidentify => "deidentify",
            Action::Reidentify => "reidentify",
        }
    }
}

impl FromStr for Action {
    type Err = ScrubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anonymize" => Ok(Action::Anonymize),
            "deidentify" => Ok(Action::Deidentify),
            "reidentify" => Ok(Action::Reidentify),
            other => Err(ScrubError::UnknownAction(other.to_string())),
        }
    }
}

/// 启用的实体类型（三态）
///
/// 兼容约定：`Unset` 与 `Empty` 都表示“不过滤”，所有类型都通过。
/// 只有 `Only` 才会真正按集合成员筛选。想表达“什么都不启用”请不要传空集合，
/// 空集合在这里同样意味着全部放行。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EntityFilter {
    #[default]
    Unset,
    Empty,
    Only(BTreeSet<String>),
}

impl EntityFilter {
    /// 从列表构建：空列表映射为 `Empty`
    pub fn from_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set: BTreeSet<String> = items.into_iter().map(Into::into).collect();
        if set.is_empty() { EntityFilter::Empty } else { EntityFilter::Only(set) }
    }

    /// 是否真正进行筛选
    pub fn is_restrictive(&self) -> bool {
        matches!(self, EntityFilter::Only(_))
    }

    pub fn allows(&self, entity_type: &str) -> bool {
        match self {
            EntityFilter::Unset | EntityFilter::Empty => true,
            EntityFilter::Only(set) => set.contains(entity_type),
        }
    }
}

/// 解析策略：显式传入的只读输入，解析器因此保持为纯函数
#[derive(Debug, Clone, Default)]
pub struct ResolvePolicy {
    pub enabled: EntityFilter,
    /// 精确匹配（区分大小写）的忽略词
    pub ignore_list: Vec<String>,
    /// 自定义人名（大小写不敏感、整词匹配）
    pub custom_names: Vec<String>,
}

/// 单次处理选项
#[derive(Debug, Clone)]
pub struct ScrubOptions {
    /// 检测置信度阈值（低于该值的候选被检测器丢弃）
    pub threshold: f32,
    /// 语言代码，透传给检测器
    pub language: String,
    /// 启用的实体类型
    pub enabled: EntityFilter,
}

impl Default for ScrubOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            language: "en".to_string(),
            enabled: EntityFilter::Unset,
        }
    }
}

/// 批处理选项
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// 最大文件大小（字节）；超过则跳过
    pub max_file_size: Option<u64>,
    /// 线程数：None 表示自动（等于 CPU 核数）；Some(1) 走串行
    pub threads: Option<usize>,
}

/// 批处理统计信息（便于 CLI 打印）
#[derive(Debug, Default, Clone)]
pub struct BatchStats {
    pub files_processed: usize,
    /// 过大或非 UTF-8，按规则跳过
    pub files_skipped: usize,
    /// 读取或检测出错
    pub files_failed: usize,
    pub entities_found: usize,
}
