use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::Utc;
use log::{debug, info};

use super::Storage;
use crate::error::{BenchlogError, Result};
use crate::models::{BenchmarkDocument, BenchmarkRun, SeriesKey, TimeRange, TrendPoint};

struct RepositoryHandle {
    // Held for the whole reload-validate-save-publish cycle of an append.
    writer: Mutex<()>,
    published: RwLock<Arc<BenchmarkDocument>>,
}

impl RepositoryHandle {
    fn snapshot(&self) -> Result<Arc<BenchmarkDocument>> {
        Ok(Arc::clone(&*self.published.read().map_err(poisoned)?))
    }
}

fn poisoned<T>(_: PoisonError<T>) -> BenchlogError {
    BenchlogError::StorageUnavailable("history lock poisoned".into())
}

/// Append-only benchmark history over a pluggable [`Storage`].
///
/// Appends are serialized per repository, within the process by a mutex
/// and across processes by the storage lock. Readers work on immutable
/// snapshots and never wait on a writer's storage I/O.
pub struct HistoryStore {
    storage: Arc<dyn Storage>,
    repositories: RwLock<HashMap<String, Arc<RepositoryHandle>>>,
}

impl HistoryStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            repositories: RwLock::new(HashMap::new()),
        }
    }

    fn handle(&self, repository: &str) -> Result<Arc<RepositoryHandle>> {
        if let Some(handle) = self.repositories.read().map_err(poisoned)?.get(repository) {
            return Ok(Arc::clone(handle));
        }

        let mut repositories = self.repositories.write().map_err(poisoned)?;
        if let Some(handle) = repositories.get(repository) {
            return Ok(Arc::clone(handle));
        }

        let document = self.storage.load(repository)?.unwrap_or_default();
        debug!(
            "Opened history for {repository} with {} suites",
            document.entries.len()
        );

        let handle = Arc::new(RepositoryHandle {
            writer: Mutex::new(()),
            published: RwLock::new(Arc::new(document)),
        });
        repositories.insert(repository.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Current immutable state of a repository's history.
    pub fn snapshot(&self, repository: &str) -> Result<Arc<BenchmarkDocument>> {
        self.handle(repository)?.snapshot()
    }

    pub fn append(&self, key: &SeriesKey, run: BenchmarkRun) -> Result<Arc<BenchmarkRun>> {
        let run = self.commit_change(&key.repository, |document| {
            if let Some(series) = document.entries.get(&key.suite) {
                if series.contains(&run) {
                    return Err(BenchlogError::DuplicateCommit {
                        commit: run.commit.id.clone(),
                        tool: run.tool.clone(),
                    });
                }

                if let Some(latest) = series.latest() {
                    if run.date < latest.date {
                        return Err(BenchlogError::malformed(
                            "date",
                            format!(
                                "{} is older than the latest run of {key} ({})",
                                run.date, latest.date
                            ),
                        ));
                    }
                }
            }

            let run = Arc::new(run);
            document
                .entries
                .entry(key.suite.clone())
                .or_default()
                .push(Arc::clone(&run));
            Ok(run)
        })?;

        info!(
            "Appended {} benchmarks for commit {} to {key}",
            run.benches.len(),
            run.commit.id
        );
        Ok(run)
    }

    /// Records the public URL of a repository. No-op when already set.
    pub fn set_repo_url(&self, repository: &str, url: &str) -> Result<()> {
        if self.snapshot(repository)?.repo_url.as_deref() == Some(url) {
            return Ok(());
        }

        self.commit_change(repository, |document| {
            document.repo_url = Some(url.to_string());
            Ok(())
        })
    }

    /// Reloads the document under the repository lock, applies `change`,
    /// persists it, then publishes it. Nothing is published unless every
    /// step succeeds.
    fn commit_change<T>(
        &self,
        repository: &str,
        change: impl FnOnce(&mut BenchmarkDocument) -> Result<T>,
    ) -> Result<T> {
        let handle = self.handle(repository)?;
        let _writer = handle.writer.lock().map_err(poisoned)?;
        let _lock = self.storage.lock(repository)?;

        // Other processes may have written since this store last loaded.
        let mut next = self.storage.load(repository)?.unwrap_or_default();
        let outcome = change(&mut next)?;
        next.last_update = Utc::now();

        self.storage.save(repository, &next)?;
        *handle.published.write().map_err(poisoned)? = Arc::new(next);

        Ok(outcome)
    }

    pub fn runs(&self, key: &SeriesKey) -> Result<Vec<Arc<BenchmarkRun>>> {
        Ok(self
            .snapshot(&key.repository)?
            .entries
            .get(&key.suite)
            .map(|series| series.runs().to_vec())
            .unwrap_or_default())
    }

    /// Trend of one benchmark in append order, read lazily from a snapshot.
    pub fn query(&self, key: &SeriesKey, benchmark: &str, range: TimeRange) -> Result<TrendIter> {
        let document = self.snapshot(&key.repository)?;
        Ok(TrendIter::new(document, &key.suite, benchmark, range))
    }

    pub fn suites(&self, repository: &str) -> Result<Vec<String>> {
        Ok(self.snapshot(repository)?.entries.keys().cloned().collect())
    }

    pub fn benchmark_names(&self, key: &SeriesKey) -> Result<Vec<String>> {
        Ok(self
            .snapshot(&key.repository)?
            .entries
            .get(&key.suite)
            .map(|series| series.benchmark_names())
            .unwrap_or_default())
    }

    pub fn repositories(&self) -> Result<Vec<String>> {
        self.storage.repositories()
    }
}

pub struct TrendIter {
    document: Arc<BenchmarkDocument>,
    suite: String,
    benchmark: String,
    range: TimeRange,
    position: usize,
    end: usize,
}

impl TrendIter {
    fn new(document: Arc<BenchmarkDocument>, suite: &str, benchmark: &str, range: TimeRange) -> Self {
        let mut iter = Self {
            end: document.entries.get(suite).map_or(0, |s| s.len()),
            document,
            suite: suite.to_string(),
            benchmark: benchmark.to_string(),
            range,
            position: 0,
        };

        if let Some(last) = range.last {
            iter.position = iter.start_of_last(last);
        }

        iter
    }

    fn matches(&self, run: &BenchmarkRun) -> bool {
        self.range.contains(run.date) && run.sample(&self.benchmark).is_some()
    }

    fn start_of_last(&self, count: usize) -> usize {
        let Some(series) = self.document.entries.get(&self.suite) else {
            return self.end;
        };

        let mut start = self.end;
        let mut kept = 0;
        while start > 0 && kept < count {
            start -= 1;
            if self.matches(&series.runs()[start]) {
                kept += 1;
            }
        }

        // Fewer matches than requested: keep everything.
        if kept == count {
            start
        } else {
            0
        }
    }
}

impl Iterator for TrendIter {
    type Item = TrendPoint;

    fn next(&mut self) -> Option<TrendPoint> {
        let series = self.document.entries.get(&self.suite)?;

        while self.position < self.end {
            let run = &series.runs()[self.position];
            self.position += 1;

            if !self.range.contains(run.date) {
                continue;
            }
            if let Some(sample) = run.sample(&self.benchmark) {
                return Some(TrendPoint {
                    commit: run.commit.id.clone(),
                    date: run.date,
                    value: sample.value,
                    range: sample.range,
                    unit: sample.unit,
                });
            }
        }

        None
    }
}
