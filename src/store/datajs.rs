//! The `window.BENCHMARK_DATA = {...}` wrapper used by published history files.

use crate::error::Result;
use crate::models::BenchmarkDocument;

pub const VARIABLE: &str = "window.BENCHMARK_DATA";

/// Returns the JSON body of a `data.js` file. Plain JSON passes through.
pub fn strip_wrapper(text: &str) -> &str {
    let trimmed = text.trim();
    let body = match trimmed.strip_prefix(VARIABLE) {
        Some(rest) => rest.trim_start().trim_start_matches('=').trim_start(),
        None => trimmed,
    };
    body.trim_end().trim_end_matches(';').trim_end()
}

/// Writes the same text the benchmark action publishes: two-space
/// indentation and no trailing newline.
pub fn encode(document: &BenchmarkDocument) -> Result<String> {
    let json = serde_json::to_string_pretty(document)?;
    Ok(format!("{VARIABLE} = {json}"))
}

pub fn decode(text: &str) -> Result<BenchmarkDocument> {
    Ok(serde_json::from_str(strip_wrapper(text))?)
}
