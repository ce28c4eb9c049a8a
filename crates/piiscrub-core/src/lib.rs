//! 敏感实体处理核心库
//!
//! 设计要点：
//! - 检测器只负责给出候选区间；这里负责把相互重叠、来源不同的候选整理成一致的替换集合。
//! - 解析是纯函数：忽略名单、自定义人名、启用类型都以 `ResolvePolicy` 显式传入。
//! - 三种变换：不可逆脱敏、可逆去标识（占位符写入映射表）、按映射表还原。
//! - 映射表的读改写在同一把锁内完成，保证占位符编号不重复。

mod config;
mod detectors;
mod engine;
mod error;
mod lists;
mod options;
mod resolver;
mod rules;
mod store;
mod transform;
mod types;

pub use config::{Config, CUSTOM_NAMES_FILE, IGNORE_LIST_FILE, MAPPING_FILE};
pub use detectors::{Detector, RuleDetector};
pub use engine::Scrubber;
pub use error::{Result, ScrubError};
pub use lists::{load_string_list, PolicyLists};
pub use options::{Action, BatchOptions, BatchStats, EntityFilter, ResolvePolicy, ScrubOptions};
pub use resolver::{
    add_custom_names, add_lastname_firstname, filter_by_entity_types, filter_ignore_list, merge_adjacent_persons,
    resolve as resolve_spans, CUSTOM_NAME_SCORE, LASTNAME_SCORE,
};
pub use rules::{load_rule_specs, parse_rule_specs, RuleKind, RuleSpec};
pub use store::{allocate_placeholder, JsonFileStore, LockMode, Mapping, MappingStore, MemoryStore, StoreLock, Vault};
pub use transform::{anonymize, deidentify, reidentify, reidentify_with, select_for_substitution};
pub use types::{EntityType, Outcome, Span, PERSON};
