use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::{RepositoryLock, Storage};
use crate::error::{BenchlogError, Result};
use crate::models::BenchmarkDocument;

/// In-memory storage that can be switched offline to exercise failures.
#[derive(Default)]
pub struct MemoryStorage {
    documents: Mutex<HashMap<String, BenchmarkDocument>>,
    offline: AtomicBool,
}

impl MemoryStorage {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BenchlogError::StorageUnavailable("memory storage offline".into()));
        }
        Ok(())
    }

    fn documents(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, BenchmarkDocument>>> {
        self.documents
            .lock()
            .map_err(|_| BenchlogError::StorageUnavailable("memory storage poisoned".into()))
    }
}

impl Storage for MemoryStorage {
    fn load(&self, repository: &str) -> Result<Option<BenchmarkDocument>> {
        self.check_online()?;
        Ok(self.documents()?.get(repository).cloned())
    }

    fn save(&self, repository: &str, document: &BenchmarkDocument) -> Result<()> {
        self.check_online()?;
        self.documents()?
            .insert(repository.to_string(), document.clone());
        Ok(())
    }

    fn lock(&self, _repository: &str) -> Result<RepositoryLock> {
        self.check_online()?;
        Ok(RepositoryLock::in_process())
    }

    fn repositories(&self) -> Result<Vec<String>> {
        self.check_online()?;
        let mut names: Vec<String> = self.documents()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
