//! 运行配置：TOML 文件 → 环境变量 → 命令行（由 CLI 覆盖）
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Result, ScrubError};
use crate::options::{EntityFilter, ScrubOptions};

pub const MAPPING_FILE: &str = "pii_mappings.json";
pub const IGNORE_LIST_FILE: &str = "ignore_list.json";
pub const CUSTOM_NAMES_FILE: &str = "custom_names.json";

/// 配置项（均有默认值）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 映射表与名单文件所在目录
    pub data_dir: PathBuf,
    /// 检测规则文件（TOML）
    pub rules_path: PathBuf,
    pub language: String,
    pub threshold: f32,
    pub log_level: String,
    /// 未配置表示不过滤
    pub enabled_entities: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            rules_path: PathBuf::from("./rules/default.toml"),
            language: "en".to_string(),
            threshold: 0.5,
            log_level: "info".to_string(),
            enabled_entities: None,
        }
    }
}

impl Config {
    /// 加载配置：有文件先读文件，再用环境变量覆盖
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p).map_err(ScrubError::Config)?,
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let txt = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&txt).with_context(|| format!("parse config {}", path.display()))
    }

    /// 环境变量覆盖：DATA_DIR / RULES_PATH / LOG_LEVEL
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("DATA_DIR").filter(|v| !v.is_empty()) {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = var("RULES_PATH").filter(|v| !v.is_empty()) {
            self.rules_path = PathBuf::from(v);
        }
        if let Some(v) = var("LOG_LEVEL").filter(|v| !v.is_empty()) {
            self.log_level = v.to_ascii_lowercase();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ScrubError::Config(anyhow::anyhow!("threshold {} outside [0, 1]", self.threshold)));
        }
        Ok(())
    }

    pub fn mapping_path(&self) -> PathBuf {
        self.data_dir.join(MAPPING_FILE)
    }

    pub fn ignore_list_path(&self) -> PathBuf {
        self.data_dir.join(IGNORE_LIST_FILE)
    }

    pub fn custom_names_path(&self) -> PathBuf {
        self.data_dir.join(CUSTOM_NAMES_FILE)
    }

    /// 默认处理选项
    pub fn scrub_options(&self) -> ScrubOptions {
        ScrubOptions {
            threshold: self.threshold,
            language: self.language.clone(),
            enabled: match &self.enabled_entities {
                None => EntityFilter::Unset,
                Some(list) => EntityFilter::from_list(list.iter().cloned()),
            },
        }
    }
}
