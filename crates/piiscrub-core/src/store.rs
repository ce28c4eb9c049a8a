//! 占位符映射表：占位符 → 原始值，持久化存储
//!
//! - 读：文件不存在、不可读或内容损坏时一律返回空表（损坏记录 warn，不报错）
//! - 写：先写同目录下的唯一临时文件再 rename，`load()` 不会看到写了一半的内容；写失败返回错误
//! - 并发：`Vault` 用进程内读写锁加后端的文件锁包住整个 load → 修改 → save 过程，
//!   多个进程共用一个数据目录时同样互斥
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Result, ScrubError};

/// 映射表（有序，落盘结果稳定）
pub type Mapping = BTreeMap<String, String>;

/// 映射表的持久化后端
pub trait MappingStore: Send + Sync {
    /// 读取当前映射；任何读取问题都退化为空表
    fn load(&self) -> Mapping;

    /// 用 `mapping` 整体替换持久化内容
    fn save(&self, mapping: &Mapping) -> Result<()>;

    /// 清空，等价于保存空表
    fn clear(&self) -> Result<()> {
        self.save(&Mapping::new())
    }

    /// 跨进程锁，守卫 drop 时释放；默认不加（内存后端只在进程内可见）
    fn lock(&self, _mode: LockMode) -> Result<Option<StoreLock>> {
        Ok(None)
    }
}

/// 文件锁模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// 只读，可与其他只读者共存
    Shared,
    /// 读改写
    Exclusive,
}

/// 持有中的文件锁
pub struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// 分配下一个占位符 `"{TYPE}_{n:03}"`
///
/// `n` 为当前映射中以 `"{TYPE}_"` 为前缀的键数量加一。若该键已被占用
/// （前缀相同的其他类型，或外部写入的键），继续递增直到空闲，保证键唯一。
/// 单类型超过 999 个时数字位数自然变长，不会回绕。
pub fn allocate_placeholder(entity_type: &str, mapping: &Mapping) -> String {
    let prefix = format!("{entity_type}_");
    let existing = mapping.keys().filter(|k| k.starts_with(&prefix)).count();
    let mut n = existing + 1;
    loop {
        let candidate = format!("{entity_type}_{n:03}");
        if !mapping.contains_key(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// JSON 文件后端
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 锁文件：`<映射文件名>.lock`，与映射文件同目录
    pub fn lock_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    fn dir(&self) -> &Path {
        self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."))
    }

    fn write_err(&self, path: &Path, source: std::io::Error) -> ScrubError {
        ScrubError::StoreWrite { path: path.to_path_buf(), source }
    }
}

impl MappingStore for JsonFileStore {
    fn load(&self) -> Mapping {
        let txt = match std::fs::read_to_string(&self.path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Mapping::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "mapping store unreadable, using empty mapping");
                return Mapping::new();
            }
        };
        match serde_json::from_str::<Mapping>(&txt) {
            Ok(mapping) => {
                debug!(path = %self.path.display(), count = mapping.len(), "mapping store loaded");
                mapping
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "mapping store corrupt, using empty mapping");
                Mapping::new()
            }
        }
    }

    fn save(&self, mapping: &Mapping) -> Result<()> {
        let json = serde_json::to_string_pretty(mapping)?;

        let dir = self.dir();
        std::fs::create_dir_all(dir).map_err(|e| self.write_err(dir, e))?;

        // 唯一临时文件 + rename；失败时临时文件随 drop 删除
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.write_err(dir, e))?;
        tmp.write_all(json.as_bytes()).map_err(|e| self.write_err(dir, e))?;
        tmp.as_file().sync_all().map_err(|e| self.write_err(dir, e))?;
        tmp.persist(&self.path).map_err(|e| self.write_err(&self.path, e.error))?;

        debug!(path = %self.path.display(), count = mapping.len(), "mapping store saved");
        Ok(())
    }

    fn lock(&self, mode: LockMode) -> Result<Option<StoreLock>> {
        let lock_path = self.lock_path();
        let lock_err = |source: std::io::Error| ScrubError::StoreLock { path: lock_path.clone(), source };

        if mode == LockMode::Exclusive {
            let dir = self.dir();
            std::fs::create_dir_all(dir).map_err(&lock_err)?;
        }
        let file = match OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&lock_path) {
            Ok(f) => f,
            // 数据目录不存在或只读：没有写者能改动映射，只读操作直接放行
            Err(e) if mode == LockMode::Shared => {
                debug!(path = %lock_path.display(), error = %e, "lock file unavailable, reading without lock");
                return Ok(None);
            }
            Err(e) => return Err(lock_err(e)),
        };
        match mode {
            LockMode::Shared => file.lock_shared(),
            LockMode::Exclusive => file.lock(),
        }
        .map_err(&lock_err)?;
        Ok(Some(StoreLock { file }))
    }
}

/// 内存后端（测试与嵌入场景）
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<Mapping>,
}

impl MemoryStore {
    pub fn with_mapping(mapping: Mapping) -> Self {
        Self { state: RwLock::new(mapping) }
    }
}

impl MappingStore for MemoryStore {
    fn load(&self) -> Mapping {
        self.state.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn save(&self, mapping: &Mapping) -> Result<()> {
        *self.state.write().unwrap_or_else(|e| e.into_inner()) = mapping.clone();
        Ok(())
    }
}

/// 带锁的映射表访问入口
///
/// 写操作（去标识、清空）持有写锁与后端的独占文件锁完成整个读改写；
/// 只读操作持有读锁与共享文件锁，可以彼此并发，但不会与写操作交错。
/// 先取进程内锁，再取文件锁。
pub struct Vault {
    store: Box<dyn MappingStore>,
    lock: RwLock<()>,
}

impl Vault {
    pub fn new(store: impl MappingStore + 'static) -> Self {
        Self { store: Box::new(store), lock: RwLock::new(()) }
    }

    /// 在读锁下访问当前映射
    pub fn read<T>(&self, f: impl FnOnce(&Mapping) -> T) -> T {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        let _file_lock = self.store.lock(LockMode::Shared).unwrap_or_else(|e| {
            warn!(error = %e, "failed to take shared store lock, reading anyway");
            None
        });
        let mapping = self.store.load();
        f(&mapping)
    }

    /// 在写锁下完成 load → 修改 → save；save 失败时错误向上传播
    pub fn update<T>(&self, f: impl FnOnce(&mut Mapping) -> T) -> Result<T> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let _file_lock = self.store.lock(LockMode::Exclusive)?;
        let mut mapping = self.store.load();
        let out = f(&mut mapping);
        self.store.save(&mapping)?;
        Ok(out)
    }

    pub fn snapshot(&self) -> Mapping {
        self.read(Mapping::clone)
    }

    pub fn clear(&self) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let _file_lock = self.store.lock(LockMode::Exclusive)?;
        self.store.clear()?;
        info!("mapping store cleared");
        Ok(())
    }
}
