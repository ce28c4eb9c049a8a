//! 错误类型（对外暴露）
use std::path::PathBuf;
use thiserror::Error;

/// 核心库统一错误
///
/// 注意：映射文件损坏、名单文件缺失都不是错误（记录 warn 后按空处理），
/// 只有写入失败（`StoreWrite`）或拿不到独占文件锁（`StoreLock`）会返回给调用方。
#[derive(Debug, Error)]
pub enum ScrubError {
    #[error("invalid span [{start}, {end}): {reason}")]
    InvalidSpan { start: usize, end: usize, reason: &'static str },

    #[error("failed to persist mapping store {}: {source}", path.display())]
    StoreWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to lock mapping store {}: {source}", path.display())]
    StoreLock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("io error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("failed to serialize mapping: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("rule file error: {0:#}")]
    Rules(anyhow::Error),

    #[error("config error: {0:#}")]
    Config(anyhow::Error),

    #[error("unknown action: {0}")]
    UnknownAction(String),
}

pub type Result<T> = std::result::Result<T, ScrubError>;
