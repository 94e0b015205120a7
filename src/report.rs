use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AnalyzerConfig;
use crate::models::{TrendPoint, Unit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    NoBaseline,
    Improved,
    Stable,
    Warning,
    Critical,
}

impl Severity {
    pub fn is_regression(self) -> bool {
        matches!(self, Self::Warning | Self::Critical)
    }

    pub(crate) fn rank(self) -> u8 {
        match self {
            Self::Critical => 4,
            Self::Warning => 3,
            Self::Improved => 2,
            Self::Stable => 1,
            Self::NoBaseline => 0,
        }
    }
}

/// Outcome for one benchmark. Values are in the sample's own unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub name: String,
    pub unit: Unit,
    pub value: f64,
    pub baseline_runs: usize,
    pub baseline_mean: Option<f64>,
    pub baseline_stddev: Option<f64>,
    pub delta_pct: Option<f64>,
    pub z_score: Option<f64>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionReport {
    pub repository: String,
    pub suite: String,
    pub commit: String,
    pub tool: String,
    pub run_date: DateTime<Utc>,
    pub analyzed_at: DateTime<Utc>,
    pub config: AnalyzerConfig,
    pub regressions: usize,
    pub findings: Vec<Finding>,
}

impl RegressionReport {
    pub fn has_regression(&self) -> bool {
        self.regressions > 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendReport {
    pub repository: String,
    pub suite: String,
    pub benchmark: String,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportSummary {
    pub repository: String,
    pub sources: usize,
    pub imported: usize,
    pub duplicates: usize,
    pub rejected: usize,
}
