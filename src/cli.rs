use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use indexmap::IndexMap;
use log::{info, warn};
use serde::Serialize;

use crate::analysis;
use crate::config::{
    AnalyzerConfig, DEFAULT_CRITICAL_DELTA_PCT, DEFAULT_MIN_DELTA_PCT, DEFAULT_THRESHOLD,
    DEFAULT_WINDOW,
};
use crate::import::import_document;
use crate::ingest;
use crate::models::{SeriesKey, TimeRange};
use crate::report::{ImportSummary, RegressionReport, TrendReport};
use crate::source::{Source, SourceLoader, Token};
use crate::store::{FileStorage, HistoryStore};

#[derive(Parser)]
#[command(name = "benchlog")]
#[command(author, version, about = "Benchmark history store and regression detector", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding one history file per repository
    #[arg(short, long, global = true, env = "BENCHLOG_STORE", default_value = ".benchlog")]
    store: PathBuf,

    /// Output file path (defaults to stdout)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Pretty print JSON output
    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,
}

#[derive(Args)]
struct SeriesArgs {
    /// Repository identifier (e.g., "owner/name")
    #[arg(long, env = "BENCHLOG_REPO")]
    repo: String,

    /// Benchmark suite name
    #[arg(long, default_value = "Benchmark")]
    suite: String,
}

impl SeriesArgs {
    fn key(&self) -> SeriesKey {
        SeriesKey::new(&self.repo, &self.suite)
    }
}

#[derive(Args, Clone, Copy)]
struct AnalyzerArgs {
    /// Number of prior runs used as the baseline
    #[arg(long, env = "BENCHLOG_WINDOW", default_value_t = DEFAULT_WINDOW)]
    window: usize,

    /// Standard deviations above the baseline mean that count as a regression
    #[arg(long, env = "BENCHLOG_THRESHOLD", default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Minimum relative change (percent) worth reporting
    #[arg(long, env = "BENCHLOG_MIN_DELTA_PCT", default_value_t = DEFAULT_MIN_DELTA_PCT)]
    min_delta_pct: f64,

    /// Relative slowdown (percent) reported as critical
    #[arg(long, env = "BENCHLOG_CRITICAL_DELTA_PCT", default_value_t = DEFAULT_CRITICAL_DELTA_PCT)]
    critical_delta_pct: f64,
}

impl AnalyzerArgs {
    fn config(self) -> Result<AnalyzerConfig> {
        Ok(AnalyzerConfig {
            window: self.window,
            threshold: self.threshold,
            min_delta_pct: self.min_delta_pct,
            critical_delta_pct: self.critical_delta_pct,
        }
        .validate()?)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Append one benchmark run and report regressions against its baseline
    Ingest {
        #[command(flatten)]
        series: SeriesArgs,

        /// Run payload: file path, "-" for stdin, or URL
        source: String,

        #[command(flatten)]
        analyzer: AnalyzerArgs,

        /// Bearer token for URL sources
        #[arg(long, env = "BENCHLOG_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Import published data.js histories, skipping known commits
    Import {
        /// Repository identifier (e.g., "owner/name")
        #[arg(long, env = "BENCHLOG_REPO")]
        repo: String,

        /// data.js sources: file paths, "-" for stdin, or URLs
        #[arg(required = true)]
        sources: Vec<String>,

        /// Bearer token for URL sources
        #[arg(long, env = "BENCHLOG_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
    /// Print the trend of one benchmark
    Query {
        #[command(flatten)]
        series: SeriesArgs,

        /// Benchmark name (e.g., "perft_init/4")
        benchmark: String,

        /// Only points at or after this RFC 3339 instant
        #[arg(long)]
        since: Option<DateTime<Utc>>,

        /// Only points before this RFC 3339 instant
        #[arg(long)]
        until: Option<DateTime<Utc>>,

        /// Only the newest N points
        #[arg(long)]
        last: Option<usize>,
    },
    /// Report regressions of the newest run of a suite
    Analyze {
        #[command(flatten)]
        series: SeriesArgs,

        #[command(flatten)]
        analyzer: AnalyzerArgs,
    },
    /// List repositories, or the suites and benchmarks of one repository
    List {
        /// Repository identifier (e.g., "owner/name")
        #[arg(long)]
        repo: Option<String>,
    },
}

impl Cli {
    pub async fn execute(&self) -> Result<()> {
        let store = HistoryStore::new(Arc::new(FileStorage::new(&self.store)));
        info!("Using history store at: {}", self.store.display());

        match &self.command {
            Commands::Ingest {
                series,
                source,
                analyzer,
                token,
            } => {
                let config = analyzer.config()?;
                let key = series.key();

                let loader = SourceLoader::new(token.as_deref().and_then(Token::parse))?;
                let text = loader.load(&Source::parse(source)?).await?;
                let run = ingest::parse_run_str(&text)?;

                match store.append(&key, run) {
                    Ok(_) => {}
                    Err(e) if e.is_duplicate() => {
                        warn!("{e}, nothing to do");
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }

                if let Some(report) = analysis::analyze_latest(&store, &key, &config)? {
                    self.write_report(&report)?;
                }
                Ok(())
            }
            Commands::Import {
                repo,
                sources,
                token,
            } => {
                let loader = SourceLoader::new(token.as_deref().and_then(Token::parse))?;
                let sources = sources
                    .iter()
                    .map(|s| Source::parse(s))
                    .collect::<crate::error::Result<Vec<_>>>()?;
                let texts = loader.load_all(&sources).await?;

                let mut summary = ImportSummary {
                    repository: repo.clone(),
                    sources: sources.len(),
                    ..ImportSummary::default()
                };
                for (source, text) in sources.iter().zip(texts) {
                    info!("Importing {source}");
                    let document = ingest::parse_document(&text)?;
                    import_document(&store, repo, document, &mut summary)?;
                }

                info!(
                    "Imported {} runs ({} duplicates, {} rejected)",
                    summary.imported, summary.duplicates, summary.rejected
                );
                self.write_output(&summary)
            }
            Commands::Query {
                series,
                benchmark,
                since,
                until,
                last,
            } => {
                let key = series.key();
                let range = TimeRange {
                    since: *since,
                    until: *until,
                    last: *last,
                };

                let points: Vec<_> = store.query(&key, benchmark, range)?.collect();
                if points.is_empty() {
                    warn!("No points for {benchmark} in {key}");
                }

                self.write_output(&TrendReport {
                    repository: key.repository,
                    suite: key.suite,
                    benchmark: benchmark.clone(),
                    points,
                })
            }
            Commands::Analyze { series, analyzer } => {
                let config = analyzer.config()?;
                let key = series.key();

                let Some(report) = analysis::analyze_latest(&store, &key, &config)? else {
                    bail!("No runs recorded for {key}");
                };
                self.write_report(&report)
            }
            Commands::List { repo } => match repo {
                Some(repo) => {
                    let mut suites: IndexMap<String, Vec<String>> = IndexMap::new();
                    for suite in store.suites(repo)? {
                        let names = store.benchmark_names(&SeriesKey::new(repo, &suite))?;
                        suites.insert(suite, names);
                    }
                    self.write_output(&suites)
                }
                None => self.write_output(&store.repositories()?),
            },
        }
    }

    fn write_report(&self, report: &RegressionReport) -> Result<()> {
        if report.has_regression() {
            warn!(
                "{} regressions detected at commit {}",
                report.regressions, report.commit
            );
        }
        self.write_output(report)
    }

    fn write_output<T: Serialize>(&self, value: &T) -> Result<()> {
        // Serialize to JSON
        let json_output = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };

        // Write to output
        if let Some(output_path) = &self.output {
            std::fs::write(output_path, json_output)?;
            info!("Output written to: {}", output_path.display());
        } else {
            println!("{json_output}");
        }

        Ok(())
    }
}
