use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub author: Person,
    pub committer: Person,
    #[serde(default)]
    pub distinct: bool,
    pub id: String,
    pub message: String,
    pub timestamp: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Time units reported by benchmark harnesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    NsPerIter,
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
}

impl Unit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NsPerIter => "ns/iter",
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
        }
    }

    /// Multiplier converting a value in this unit to nanoseconds.
    pub fn nanos_scale(self) -> f64 {
        match self {
            Self::NsPerIter | Self::Nanoseconds => 1.0,
            Self::Microseconds => 1e3,
            Self::Milliseconds => 1e6,
            Self::Seconds => 1e9,
        }
    }
}

impl FromStr for Unit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ns/iter" => Ok(Self::NsPerIter),
            "ns" => Ok(Self::Nanoseconds),
            "us" | "µs" | "μs" => Ok(Self::Microseconds),
            "ms" => Ok(Self::Milliseconds),
            "s" => Ok(Self::Seconds),
            other => Err(format!("unsupported unit `{other}`")),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses an error range such as `"± 114"`, `"+/- 1,206"` or `"42"`.
pub fn parse_range(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let number = trimmed
        .strip_prefix('±')
        .or_else(|| trimmed.strip_prefix("+/-"))
        .unwrap_or(trimmed)
        .trim()
        .replace(',', "");

    number.parse::<f64>().ok()
}

/// Writes whole numbers without a fractional part, as published `data.js`
/// files do (`3078`, not `3078.0`).
#[allow(clippy::cast_possible_truncation)]
fn serialize_measure<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    // Integers are exact in f64 below 2^53.
    const EXACT_LIMIT: f64 = 9_007_199_254_740_992.0;

    if value.fract() == 0.0 && value.abs() < EXACT_LIMIT {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}

mod range_format {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawRange {
        Text(String),
        Number(f64),
    }

    pub fn serialize<S: Serializer>(range: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("± {range}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match RawRange::deserialize(deserializer)? {
            RawRange::Number(n) => Ok(n),
            RawRange::Text(text) => super::parse_range(&text)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid range `{text}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkSample {
    pub name: String,
    #[serde(serialize_with = "serialize_measure")]
    pub value: f64,
    #[serde(with = "range_format")]
    pub range: f64,
    pub unit: Unit,
}

impl BenchmarkSample {
    pub fn value_nanos(&self) -> f64 {
        self.value * self.unit.nanos_scale()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub commit: CommitInfo,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    pub tool: String,
    pub benches: Vec<BenchmarkSample>,
}

impl BenchmarkRun {
    pub fn sample(&self, name: &str) -> Option<&BenchmarkSample> {
        self.benches.iter().find(|b| b.name == name)
    }

    pub fn is_same_commit(&self, other: &BenchmarkRun) -> bool {
        self.commit.id == other.commit.id && self.tool == other.tool
    }
}

/// Append-only, time-ordered runs of a single suite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistorySeries {
    runs: Vec<Arc<BenchmarkRun>>,
}

impl HistorySeries {
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn runs(&self) -> &[Arc<BenchmarkRun>] {
        &self.runs
    }

    pub fn latest(&self) -> Option<&Arc<BenchmarkRun>> {
        self.runs.last()
    }

    pub fn contains(&self, run: &BenchmarkRun) -> bool {
        self.runs.iter().any(|r| r.is_same_commit(run))
    }

    /// Benchmark names in first-seen order.
    pub fn benchmark_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for sample in self.runs.iter().flat_map(|r| r.benches.iter()) {
            if !names.contains(&sample.name) {
                names.push(sample.name.clone());
            }
        }
        names
    }

    pub(crate) fn push(&mut self, run: Arc<BenchmarkRun>) {
        self.runs.push(run);
    }
}

/// Persisted history of one repository, laid out like a `data.js` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkDocument {
    #[serde(rename = "lastUpdate", with = "chrono::serde::ts_milliseconds")]
    pub last_update: DateTime<Utc>,
    #[serde(rename = "repoUrl", default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub entries: IndexMap<String, HistorySeries>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub repository: String,
    pub suite: String,
}

impl SeriesKey {
    pub fn new(repository: impl Into<String>, suite: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            suite: suite.into(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.suite)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub commit: String,
    pub date: DateTime<Utc>,
    #[serde(serialize_with = "serialize_measure")]
    pub value: f64,
    pub range: f64,
    pub unit: Unit,
}

/// Window of a trend query. `since` is inclusive, `until` exclusive and
/// `last` keeps only the newest matching points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub last: Option<usize>,
}

impl TimeRange {
    pub fn contains(&self, date: DateTime<Utc>) -> bool {
        self.since.map_or(true, |since| date >= since) && self.until.map_or(true, |until| date < until)
    }
}
