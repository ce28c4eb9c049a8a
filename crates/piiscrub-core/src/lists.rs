//! 忽略名单与自定义人名（JSON 字符串数组文件）
//!
//! 每次处理都重新从磁盘读取，不做缓存；缺失视为空名单，损坏记录 warn 后同样视为空。
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::options::{EntityFilter, ResolvePolicy};

/// 读取一个 JSON 字符串数组文件
pub fn load_string_list(path: &Path) -> Vec<String> {
    let txt = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "list file unreadable, treating as empty");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Vec<String>>(&txt) {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "list file corrupt, treating as empty");
            Vec::new()
        }
    }
}

/// 名单文件位置
#[derive(Debug, Clone)]
pub struct PolicyLists {
    ignore_path: PathBuf,
    custom_names_path: PathBuf,
}

impl PolicyLists {
    pub fn new(ignore_path: impl Into<PathBuf>, custom_names_path: impl Into<PathBuf>) -> Self {
        Self { ignore_path: ignore_path.into(), custom_names_path: custom_names_path.into() }
    }

    pub fn load_ignore_list(&self) -> Vec<String> {
        load_string_list(&self.ignore_path)
    }

    pub fn load_custom_names(&self) -> Vec<String> {
        load_string_list(&self.custom_names_path)
    }

    /// 组装本次调用的解析策略（名单即时读取）
    pub fn policy(&self, enabled: EntityFilter) -> ResolvePolicy {
        ResolvePolicy {
            enabled,
            ignore_list: self.load_ignore_list(),
            custom_names: self.load_custom_names(),
        }
    }
}
