use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;

use super::{datajs, RepositoryLock, Storage};
use crate::error::{BenchlogError, Result};
use crate::models::BenchmarkDocument;

const DATA_FILE: &str = "data.js";
const LOCK_FILE: &str = "data.js.lock";

/// Keeps one `data.js` per repository under `<root>/<owner>/<name>/`.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn document_path(&self, repository: &str) -> Result<PathBuf> {
        let segments: Vec<&str> = repository.split('/').collect();

        let valid = segments.iter().all(|segment| {
            !segment.is_empty()
                && *segment != "."
                && *segment != ".."
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        });

        if !valid {
            return Err(BenchlogError::Config(format!(
                "Invalid repository identifier: `{repository}`"
            )));
        }

        Ok(segments
            .iter()
            .fold(self.root.clone(), |path, segment| path.join(segment))
            .join(DATA_FILE))
    }

    fn prepare_parent(path: &Path) -> Result<&Path> {
        let parent = path
            .parent()
            .ok_or_else(|| BenchlogError::StorageUnavailable(format!("{} has no parent", path.display())))?;
        fs::create_dir_all(parent).map_err(|e| unavailable(parent, &e))?;
        Ok(parent)
    }

    fn collect_repositories(dir: &Path, prefix: &str, found: &mut Vec<String>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(unavailable(dir, &e)),
        };

        for entry in entries {
            let entry = entry.map_err(|e| unavailable(dir, &e))?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let repository = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };

            if path.join(DATA_FILE).is_file() {
                found.push(repository.clone());
            }
            Self::collect_repositories(&path, &repository, found)?;
        }

        Ok(())
    }
}

fn unavailable(path: &Path, error: &dyn std::fmt::Display) -> BenchlogError {
    BenchlogError::StorageUnavailable(format!("{}: {error}", path.display()))
}

impl Storage for FileStorage {
    fn load(&self, repository: &str) -> Result<Option<BenchmarkDocument>> {
        let path = self.document_path(repository)?;

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(unavailable(&path, &e)),
        };

        debug!("Loaded history for {repository} from {}", path.display());
        datajs::decode(&text).map(Some).map_err(|e| unavailable(&path, &e))
    }

    fn save(&self, repository: &str, document: &BenchmarkDocument) -> Result<()> {
        let path = self.document_path(repository)?;
        let parent = Self::prepare_parent(&path)?;

        let text = datajs::encode(document)?;
        let mut tmp_file = NamedTempFile::new_in(parent).map_err(|e| unavailable(parent, &e))?;
        tmp_file
            .write_all(text.as_bytes())
            .and_then(|()| tmp_file.as_file().sync_all())
            .map_err(|e| unavailable(tmp_file.path(), &e))?;
        tmp_file.persist(&path).map_err(|e| unavailable(&path, &e))?;

        debug!("Saved history for {repository} to {}", path.display());
        Ok(())
    }

    fn lock(&self, repository: &str) -> Result<RepositoryLock> {
        let path = self.document_path(repository)?;
        let lock_path = Self::prepare_parent(&path)?.join(LOCK_FILE);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| unavailable(&lock_path, &e))?;

        debug!("Waiting for lock on {}", lock_path.display());
        RepositoryLock::exclusive(file).map_err(|e| unavailable(&lock_path, &e))
    }

    fn repositories(&self) -> Result<Vec<String>> {
        let mut found = Vec::new();
        Self::collect_repositories(&self.root, "", &mut found)?;
        found.sort();
        Ok(found)
    }
}
