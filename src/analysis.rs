use std::sync::Arc;

use chrono::Utc;
use log::{info, warn};

use crate::config::AnalyzerConfig;
use crate::error::Result;
use crate::models::{BenchmarkRun, BenchmarkSample, SeriesKey};
use crate::report::{Finding, RegressionReport, Severity};
use crate::store::HistoryStore;

/// Analyzes the newest run of a series against the runs before it.
pub fn analyze_latest(
    store: &HistoryStore,
    key: &SeriesKey,
    config: &AnalyzerConfig,
) -> Result<Option<RegressionReport>> {
    let runs = store.runs(key)?;

    let Some((latest, history)) = runs.split_last() else {
        warn!("No runs recorded for {key}");
        return Ok(None);
    };

    Ok(Some(analyze(key, latest, history, config)))
}

/// Compares every sample of `run` with the same benchmark in `history`,
/// which must hold only runs older than `run`, oldest first.
pub fn analyze(
    key: &SeriesKey,
    run: &BenchmarkRun,
    history: &[Arc<BenchmarkRun>],
    config: &AnalyzerConfig,
) -> RegressionReport {
    let mut findings: Vec<Finding> = run
        .benches
        .iter()
        .map(|sample| {
            let baseline = collect_baseline(&sample.name, history, config.window);
            build_finding(sample, &baseline, config)
        })
        .collect();

    // Regressions first, largest slowdown first
    findings.sort_by(|a, b| {
        b.severity.rank().cmp(&a.severity.rank()).then_with(|| {
            b.delta_pct
                .partial_cmp(&a.delta_pct)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });

    let regressions = findings.iter().filter(|f| f.severity.is_regression()).count();

    for finding in findings.iter().filter(|f| f.severity.is_regression()) {
        warn!(
            "{:?} regression in {key} {}: {:+.2}% at commit {}",
            finding.severity,
            finding.name,
            finding.delta_pct.unwrap_or_default(),
            run.commit.id
        );
    }
    info!(
        "Analyzed {} benchmarks of commit {}: {regressions} regressions",
        findings.len(),
        run.commit.id
    );

    RegressionReport {
        repository: key.repository.clone(),
        suite: key.suite.clone(),
        commit: run.commit.id.clone(),
        tool: run.tool.clone(),
        run_date: run.date,
        analyzed_at: Utc::now(),
        config: *config,
        regressions,
        findings,
    }
}

/// Baseline values in nanoseconds from the newest `window` runs that
/// contain `name`.
fn collect_baseline(name: &str, history: &[Arc<BenchmarkRun>], window: usize) -> Vec<f64> {
    history
        .iter()
        .rev()
        .filter_map(|run| run.sample(name))
        .take(window)
        .map(BenchmarkSample::value_nanos)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct BaselineStats {
    mean: f64,
    stddev: f64,
}

#[allow(clippy::cast_precision_loss)]
fn compute_stats(values: &[f64]) -> Option<BaselineStats> {
    if values.is_empty() {
        return None;
    }

    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;

    Some(BaselineStats {
        mean,
        stddev: variance.sqrt(),
    })
}

fn delta_pct(value: f64, mean: f64) -> f64 {
    if mean > 0.0 {
        (value - mean) / mean * 100.0
    } else if value > 0.0 {
        // Anything above an all-zero baseline counts as doubling.
        100.0
    } else {
        0.0
    }
}

fn classify(value: f64, stats: BaselineStats, config: &AnalyzerConfig) -> Severity {
    let delta = delta_pct(value, stats.mean);
    let margin = config.threshold * stats.stddev;

    // With zero variance the margin is zero, so only the delta floor applies.
    let slower = value > stats.mean + margin && delta > config.min_delta_pct;
    let faster = value < stats.mean - margin && -delta > config.min_delta_pct;

    if slower && delta >= config.critical_delta_pct {
        Severity::Critical
    } else if slower {
        Severity::Warning
    } else if faster {
        Severity::Improved
    } else {
        Severity::Stable
    }
}

fn build_finding(sample: &BenchmarkSample, baseline: &[f64], config: &AnalyzerConfig) -> Finding {
    let value_nanos = sample.value_nanos();
    let scale = sample.unit.nanos_scale();

    let Some(stats) = compute_stats(baseline) else {
        return Finding {
            name: sample.name.clone(),
            unit: sample.unit,
            value: sample.value,
            baseline_runs: 0,
            baseline_mean: None,
            baseline_stddev: None,
            delta_pct: None,
            z_score: None,
            severity: Severity::NoBaseline,
        };
    };

    let z_score = (stats.stddev > 0.0).then(|| (value_nanos - stats.mean) / stats.stddev);

    Finding {
        name: sample.name.clone(),
        unit: sample.unit,
        value: sample.value,
        baseline_runs: baseline.len(),
        baseline_mean: Some(stats.mean / scale),
        baseline_stddev: Some(stats.stddev / scale),
        delta_pct: Some(delta_pct(value_nanos, stats.mean)),
        z_score,
        severity: classify(value_nanos, stats, config),
    }
}
