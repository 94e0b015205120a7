use log::{debug, warn};

use crate::error::{BenchlogError, Result};
use crate::ingest::{self, RawDocument};
use crate::models::SeriesKey;
use crate::report::ImportSummary;
use crate::store::HistoryStore;

/// Appends every run of a published document. Known commits are skipped and
/// malformed runs are rejected one by one; storage failures abort.
pub fn import_document(
    store: &HistoryStore,
    repository: &str,
    document: RawDocument,
    summary: &mut ImportSummary,
) -> Result<()> {
    if let Some(url) = &document.repo_url {
        store.set_repo_url(repository, url)?;
    }

    for (suite, raw_runs) in document.entries {
        let key = SeriesKey::new(repository, suite);

        for (index, raw) in raw_runs.into_iter().enumerate() {
            let outcome = ingest::parse_run_value(raw).and_then(|run| store.append(&key, run));

            match outcome {
                Ok(_) => summary.imported += 1,
                Err(e) if e.is_duplicate() => {
                    debug!("{e}");
                    summary.duplicates += 1;
                }
                Err(e @ BenchlogError::MalformedRun { .. }) => {
                    warn!("Rejected run #{index} of {key}: {e}");
                    summary.rejected += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{parse_document, tests::payload};
    use crate::models::TimeRange;
    use crate::store::MemoryStorage;
    use serde_json::json;
    use std::sync::Arc;

    fn published() -> String {
        let bench = |value: i64| json!([{"name": "perft_init/1", "value": value, "range": "± 114", "unit": "ns/iter"}]);
        let mut broken = payload("ccc", 3_000, bench(3));
        broken["benches"][0]["unit"] = json!("parsecs");

        format!(
            "window.BENCHMARK_DATA = {}",
            json!({
                "lastUpdate": 1_603_317_229_381_i64,
                "repoUrl": "https://github.com/aelred/skakoui",
                "entries": {
                    "Benchmark": [
                        payload("aaa", 1_000, bench(3078)),
                        payload("bbb", 2_000, bench(3100)),
                        broken,
                        payload("ddd", 4_000, bench(3050))
                    ]
                }
            })
        )
    }

    #[test]
    fn test_import_counts_and_appends_runs() {
        let store = HistoryStore::new(Arc::new(MemoryStorage::default()));
        let mut summary = ImportSummary::default();

        import_document(&store, "aelred/skakoui", parse_document(&published()).unwrap(), &mut summary).unwrap();

        assert_eq!(summary.imported, 3);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.duplicates, 0);

        let key = SeriesKey::new("aelred/skakoui", "Benchmark");
        let values: Vec<_> = store
            .query(&key, "perft_init/1", TimeRange::default())
            .unwrap()
            .map(|p| p.value)
            .collect();
        assert_eq!(values, vec![3078.0, 3100.0, 3050.0]);
        assert_eq!(
            store.snapshot("aelred/skakoui").unwrap().repo_url.as_deref(),
            Some("https://github.com/aelred/skakoui")
        );
    }

    #[test]
    fn test_wrong_typed_run_is_rejected_alone() {
        let bench = |value: i64| json!([{"name": "mate/in2", "value": value, "range": "± 9", "unit": "ns/iter"}]);
        let text = json!({
            "entries": {
                "Benchmark": [
                    payload("aaa", 1_000, bench(10)),
                    payload("bbb", 2_000, json!([{"name": 5, "value": 11, "range": "± 9", "unit": "ns/iter"}])),
                    {"commit": "bbb", "tool": 3},
                    "not a run",
                    payload("ccc", 3_000, bench(12))
                ]
            }
        })
        .to_string();
        let store = HistoryStore::new(Arc::new(MemoryStorage::default()));
        let mut summary = ImportSummary::default();

        import_document(&store, "aelred/skakoui", parse_document(&text).unwrap(), &mut summary).unwrap();

        assert_eq!(summary.imported, 2);
        assert_eq!(summary.rejected, 3);
        let commits: Vec<_> = store
            .runs(&SeriesKey::new("aelred/skakoui", "Benchmark"))
            .unwrap()
            .iter()
            .map(|r| r.commit.id.clone())
            .collect();
        assert_eq!(commits, vec!["aaa", "ccc"]);
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let store = HistoryStore::new(Arc::new(MemoryStorage::default()));
        let mut first = ImportSummary::default();
        let mut second = ImportSummary::default();

        import_document(&store, "aelred/skakoui", parse_document(&published()).unwrap(), &mut first).unwrap();
        import_document(&store, "aelred/skakoui", parse_document(&published()).unwrap(), &mut second).unwrap();

        assert_eq!(second.imported, 0);
        assert_eq!(second.duplicates, 3);
        assert_eq!(
            store.runs(&SeriesKey::new("aelred/skakoui", "Benchmark")).unwrap().len(),
            3
        );
    }

    #[test]
    fn test_storage_failure_aborts_import() {
        let storage = Arc::new(MemoryStorage::default());
        let store = HistoryStore::new(Arc::clone(&storage) as Arc<dyn crate::store::Storage>);
        storage.set_offline(true);

        let err = import_document(
            &store,
            "aelred/skakoui",
            parse_document(&published()).unwrap(),
            &mut ImportSummary::default(),
        )
        .unwrap_err();

        assert!(matches!(err, BenchlogError::StorageUnavailable(_)));
    }
}
