//! 处理主流程：检测 → 解析 → 变换，以及目录批处理
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::detectors::{Detector, RuleDetector};
use crate::error::{Result, ScrubError};
use crate::lists::PolicyLists;
use crate::options::{Action, BatchOptions, BatchStats, ScrubOptions};
use crate::resolver::resolve;
use crate::store::{JsonFileStore, MappingStore, Vault};
use crate::transform::{anonymize, deidentify, reidentify};
use crate::types::{Outcome, Span};

/// 处理入口：持有检测器、名单位置与映射表
pub struct Scrubber {
    detector: Box<dyn Detector>,
    lists: PolicyLists,
    vault: Vault,
}

impl Scrubber {
    pub fn new(detector: impl Detector + 'static, lists: PolicyLists, store: impl MappingStore + 'static) -> Self {
        Self { detector: Box::new(detector), lists, vault: Vault::new(store) }
    }

    /// 按配置组装：规则文件检测器 + 数据目录下的 JSON 文件
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let detector = RuleDetector::from_path(&cfg.rules_path)?;
        let lists = PolicyLists::new(cfg.ignore_list_path(), cfg.custom_names_path());
        Ok(Self { detector: Box::new(detector), lists, vault: Self::vault_from_config(cfg) })
    }

    /// 只打开映射表，不加载规则；还原与清空只需要这一部分
    pub fn vault_from_config(cfg: &Config) -> Vault {
        Vault::new(JsonFileStore::new(cfg.mapping_path()))
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    /// 检测并解析出最终替换区间（名单每次重新读取）
    pub fn resolve(&self, text: &str, opts: &ScrubOptions) -> Result<Vec<Span>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let raw = self.detector.analyze(text, &opts.language, opts.threshold)?;
        let policy = self.lists.policy(opts.enabled.clone());
        Ok(resolve(text, raw, &policy))
    }

    pub fn anonymize(&self, text: &str, opts: &ScrubOptions) -> Result<Outcome> {
        let spans = self.resolve(text, opts)?;
        Ok(anonymize(text, &spans))
    }

    pub fn deidentify(&self, text: &str, opts: &ScrubOptions) -> Result<Outcome> {
        let spans = self.resolve(text, opts)?;
        deidentify(text, &spans, &self.vault)
    }

    pub fn reidentify(&self, text: &str) -> Outcome {
        reidentify(text, &self.vault)
    }

    pub fn process(&self, text: &str, action: Action, opts: &ScrubOptions) -> Result<Outcome> {
        info!(action = action.as_str(), threshold = opts.threshold, restricted = opts.enabled.is_restrictive(), "processing request");
        let outcome = match action {
            Action::Anonymize => self.anonymize(text, opts)?,
            Action::Deidentify => self.deidentify(text, opts)?,
            Action::Reidentify => self.reidentify(text),
        };
        info!(entities_found = outcome.entities_found, "processing complete");
        Ok(outcome)
    }

    /// 未知动作原样返回文本，实体数为 0
    pub fn process_lenient(&self, text: &str, action: &str, opts: &ScrubOptions) -> Result<Outcome> {
        match Action::parse_lenient(action) {
            Some(a) => self.process(text, a, opts),
            None => {
                warn!(action, "unknown action, echoing input");
                Ok(Outcome { result: text.to_string(), entities_found: 0 })
            }
        }
    }

    pub fn clear_mappings(&self) -> Result<()> {
        self.vault.clear()
    }

    /// 批处理一个目录（仅第一层普通文件）
    ///
    /// 稳定性保证：文件按文件名排序；检测与解析可并行，替换按文件名顺序串行执行，
    /// 因此去标识的编号与单线程逐个处理完全一致。
    pub fn process_dir(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        action: Action,
        opts: &ScrubOptions,
        batch: &BatchOptions,
    ) -> Result<BatchStats> {
        let mut stats = BatchStats::default();

        let mut files: Vec<PathBuf> = vec![];
        for entry in WalkDir::new(input_dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        std::fs::create_dir_all(output_dir).map_err(|e| ScrubError::Io { path: output_dir.to_path_buf(), source: e })?;

        // 读取 + 检测 + 解析：与映射表无关，可以并行
        let threads = batch.threads.unwrap_or(0);
        let prepared: Vec<Prepared> = if threads == 1 {
            files.iter().map(|p| self.prepare_file(p, action, opts, batch.max_file_size)).collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
            pool.install(|| files.par_iter().map(|p| self.prepare_file(p, action, opts, batch.max_file_size)).collect())
        };

        // 替换：按文件名顺序串行
        for (path, item) in files.iter().zip(prepared) {
            let (text, spans) = match item {
                Prepared::Ready(text, spans) => (text, spans),
                Prepared::Skipped => {
                    stats.files_skipped += 1;
                    continue;
                }
                Prepared::Failed => {
                    stats.files_failed += 1;
                    continue;
                }
            };
            let outcome = match action {
                Action::Anonymize => anonymize(&text, &spans),
                Action::Deidentify => deidentify(&text, &spans, &self.vault)?,
                Action::Reidentify => reidentify(&text, &self.vault),
            };
            let Some(name) = path.file_name() else { continue };
            let out_path = output_dir.join(name);
            std::fs::write(&out_path, &outcome.result).map_err(|e| ScrubError::Io { path: out_path.clone(), source: e })?;

            stats.files_processed += 1;
            stats.entities_found += outcome.entities_found;
            debug!(file = %path.display(), entities = outcome.entities_found, "file processed");
        }

        if stats.files_failed > 0 {
            warn!(files_failed = stats.files_failed, "some files could not be processed");
        }
        info!(
            files_processed = stats.files_processed,
            files_skipped = stats.files_skipped,
            files_failed = stats.files_failed,
            entities_found = stats.entities_found,
            "batch finished"
        );
        Ok(stats)
    }

    /// 读取单个文件并解析区间
    ///
    /// 过大或非 UTF-8 的文件按规则跳过；其他读取错误与检测失败记为失败，批处理继续。
    fn prepare_file(&self, path: &Path, action: Action, opts: &ScrubOptions, max_file_size: Option<u64>) -> Prepared {
        if let Some(max) = max_file_size {
            if let Ok(md) = std::fs::metadata(path) {
                if md.len() > max {
                    debug!(file = %path.display(), size = md.len(), "skipping oversized file");
                    return Prepared::Skipped;
                }
            }
        }
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                debug!(file = %path.display(), "skipping non UTF-8 file");
                return Prepared::Skipped;
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to read file");
                return Prepared::Failed;
            }
        };
        if action == Action::Reidentify {
            return Prepared::Ready(text, Vec::new());
        }
        match self.resolve(&text, opts) {
            Ok(spans) => Prepared::Ready(text, spans),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "detection failed");
                Prepared::Failed
            }
        }
    }
}

/// 单个文件的预处理结果
enum Prepared {
    Ready(String, Vec<Span>),
    Skipped,
    Failed,
}
