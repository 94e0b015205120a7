pub mod datajs;
mod file;
mod history;
#[cfg(test)]
mod memory;

use std::fs::File;

use fs2::FileExt;
use log::warn;

use crate::error::Result;
use crate::models::BenchmarkDocument;

pub use file::FileStorage;
pub use history::HistoryStore;
#[cfg(test)]
pub use memory::MemoryStorage;

/// Durable home of repository documents.
///
/// `save` must be all-or-nothing: after an error the previously saved
/// document is still the one `load` returns.
pub trait Storage: Send + Sync {
    fn load(&self, repository: &str) -> Result<Option<BenchmarkDocument>>;

    fn save(&self, repository: &str, document: &BenchmarkDocument) -> Result<()>;

    /// Blocks until this caller is the only writer of `repository`,
    /// across processes sharing the same storage.
    fn lock(&self, repository: &str) -> Result<RepositoryLock>;

    fn repositories(&self) -> Result<Vec<String>>;
}

/// Exclusive hold on one repository. Released on drop.
pub struct RepositoryLock {
    file: Option<File>,
}

impl RepositoryLock {
    /// Takes an exclusive advisory lock on `file`.
    pub(crate) fn exclusive(file: File) -> std::io::Result<Self> {
        FileExt::lock_exclusive(&file)?;
        Ok(Self { file: Some(file) })
    }

    /// For storages whose writers all live in one process.
    #[cfg(test)]
    pub(crate) fn in_process() -> Self {
        Self { file: None }
    }
}

impl Drop for RepositoryLock {
    fn drop(&mut self) {
        if let Some(file) = &self.file {
            if let Err(e) = FileExt::unlock(file) {
                warn!("Failed to release repository lock: {e}");
            }
        }
    }
}
