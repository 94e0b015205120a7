use serde::{Deserialize, Serialize};

use crate::error::{BenchlogError, Result};

pub const DEFAULT_WINDOW: usize = 5;
pub const DEFAULT_THRESHOLD: f64 = 2.0;
pub const DEFAULT_MIN_DELTA_PCT: f64 = 0.0;
pub const DEFAULT_CRITICAL_DELTA_PCT: f64 = 50.0;

/// Tuning of the regression analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Number of prior runs forming the baseline.
    pub window: usize,
    /// Multiple of the baseline standard deviation a value must exceed.
    pub threshold: f64,
    /// Relative change (percent) below which nothing is flagged.
    /// Also the only gate when the baseline has zero variance.
    pub min_delta_pct: f64,
    /// Relative slowdown (percent) at which a regression becomes critical.
    pub critical_delta_pct: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            threshold: DEFAULT_THRESHOLD,
            min_delta_pct: DEFAULT_MIN_DELTA_PCT,
            critical_delta_pct: DEFAULT_CRITICAL_DELTA_PCT,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(self) -> Result<Self> {
        if self.window == 0 {
            return Err(BenchlogError::Config("window must be at least 1".into()));
        }

        let non_negative = [
            ("threshold", self.threshold),
            ("min-delta-pct", self.min_delta_pct),
            ("critical-delta-pct", self.critical_delta_pct),
        ];
        if let Some((name, value)) = non_negative
            .iter()
            .find(|(_, value)| !value.is_finite() || *value < 0.0)
        {
            return Err(BenchlogError::Config(format!(
                "{name} must be a non-negative number, got {value}"
            )));
        }

        if self.critical_delta_pct < self.min_delta_pct {
            return Err(BenchlogError::Config(
                "critical-delta-pct must not be below min-delta-pct".into(),
            ));
        }

        Ok(self)
    }
}
