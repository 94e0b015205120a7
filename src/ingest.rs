use std::collections::HashSet;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{BenchlogError, Result};
use crate::models::{parse_range, BenchmarkRun, BenchmarkSample, CommitInfo, Person, Unit};
use crate::store::datajs;

#[derive(Debug, Default, Deserialize)]
pub struct RawPerson {
    pub name: Option<Value>,
    pub email: Option<Value>,
    pub username: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawCommit {
    pub author: Option<Value>,
    pub committer: Option<Value>,
    pub distinct: Option<Value>,
    pub id: Option<Value>,
    pub message: Option<Value>,
    pub timestamp: Option<Value>,
    pub tree_id: Option<Value>,
    pub url: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawBench {
    pub name: Option<Value>,
    pub value: Option<Value>,
    pub range: Option<Value>,
    pub unit: Option<Value>,
}

/// One run as emitted by the benchmark action, before validation.
///
/// Fields stay untyped so that a value of the wrong JSON type is reported
/// against its own path rather than failing the whole payload.
#[derive(Debug, Default, Deserialize)]
pub struct RawRunPayload {
    pub commit: Option<Value>,
    pub date: Option<Value>,
    pub tool: Option<Value>,
    pub benches: Option<Value>,
}

/// A published `data.js` document. Runs are kept as raw JSON so each one is
/// validated on its own.
#[derive(Debug, Default, Deserialize)]
pub struct RawDocument {
    #[serde(rename = "repoUrl")]
    pub repo_url: Option<String>,
    #[serde(default)]
    pub entries: IndexMap<String, Vec<Value>>,
}

pub fn parse_run_str(text: &str) -> Result<BenchmarkRun> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| BenchlogError::malformed("payload", format!("is not valid JSON: {e}")))?;
    parse_run_value(value)
}

pub fn parse_run_value(value: Value) -> Result<BenchmarkRun> {
    parse_run(object(value, "payload")?)
}

pub fn parse_document(text: &str) -> Result<RawDocument> {
    serde_json::from_str(datajs::strip_wrapper(text))
        .map_err(|e| BenchlogError::malformed("document", format!("is not valid benchmark data: {e}")))
}

/// Validates a raw payload into an immutable run.
pub fn parse_run(raw: RawRunPayload) -> Result<BenchmarkRun> {
    let commit = parse_commit(object(require(raw.commit, "commit")?, "commit")?)?;
    let date = parse_date(require(raw.date, "date")?)?;
    let tool = require_text(raw.tool, "tool")?;

    let raw_benches = match require(raw.benches, "benches")? {
        Value::Array(items) => items,
        other => {
            return Err(BenchlogError::malformed(
                "benches",
                format!("must be an array, got {other}"),
            ))
        }
    };
    if raw_benches.is_empty() {
        return Err(BenchlogError::malformed("benches", "must not be empty"));
    }

    let mut seen = HashSet::new();
    let benches = raw_benches
        .into_iter()
        .enumerate()
        .map(|(i, bench)| {
            let sample = parse_bench(i, object(bench, &format!("benches[{i}]"))?)?;
            if !seen.insert(sample.name.clone()) {
                return Err(BenchlogError::malformed(
                    format!("benches[{i}].name"),
                    format!("duplicates benchmark `{}`", sample.name),
                ));
            }
            Ok(sample)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(BenchmarkRun {
        commit,
        date,
        tool,
        benches,
    })
}

fn parse_commit(raw: RawCommit) -> Result<CommitInfo> {
    let timestamp_text = require_text(raw.timestamp, "commit.timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(&timestamp_text).map_err(|e| {
        BenchlogError::malformed("commit.timestamp", format!("is not RFC 3339: {e}"))
    })?;

    let distinct = match raw.distinct {
        None => true,
        Some(Value::Bool(distinct)) => distinct,
        Some(other) => {
            return Err(BenchlogError::malformed(
                "commit.distinct",
                format!("must be a boolean, got {other}"),
            ))
        }
    };

    Ok(CommitInfo {
        author: parse_person(raw.author, "commit.author")?,
        committer: parse_person(raw.committer, "commit.committer")?,
        distinct,
        id: require_text(raw.id, "commit.id")?,
        message: require(optional_text(raw.message, "commit.message")?, "commit.message")?,
        timestamp,
        tree_id: optional_text(raw.tree_id, "commit.tree_id")?,
        url: optional_text(raw.url, "commit.url")?,
    })
}

fn parse_person(raw: Option<Value>, field: &str) -> Result<Person> {
    let raw: RawPerson = object(require(raw, field)?, field)?;

    Ok(Person {
        name: require_text(raw.name, &format!("{field}.name"))?,
        email: optional_text(raw.email, &format!("{field}.email"))?,
        username: optional_text(raw.username, &format!("{field}.username"))?,
    })
}

fn parse_bench(index: usize, raw: RawBench) -> Result<BenchmarkSample> {
    let field = |name: &str| format!("benches[{index}].{name}");

    let name = require_text(raw.name, &field("name"))?;
    let value = parse_measure(require(raw.value, &field("value"))?, &field("value"))?;
    let range = parse_measure(require(raw.range, &field("range"))?, &field("range"))?;
    let unit_text = require_text(raw.unit, &field("unit"))?;
    let unit = unit_text
        .parse::<Unit>()
        .map_err(|reason| BenchlogError::malformed(field("unit"), reason))?;

    Ok(BenchmarkSample {
        name,
        value,
        range,
        unit,
    })
}

fn parse_measure(raw: Value, field: &str) -> Result<f64> {
    let number = match &raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_range(s),
        _ => None,
    }
    .ok_or_else(|| BenchlogError::malformed(field, format!("is not a number: {raw}")))?;

    if !number.is_finite() || number < 0.0 {
        return Err(BenchlogError::malformed(
            field,
            format!("must be a non-negative number, got {number}"),
        ));
    }

    Ok(number)
}

fn parse_date(raw: Value) -> Result<DateTime<Utc>> {
    let millis = raw
        .as_i64()
        .ok_or_else(|| BenchlogError::malformed("date", format!("is not epoch millis: {raw}")))?;

    if millis < 0 {
        return Err(BenchlogError::malformed("date", "must be non-negative"));
    }

    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| BenchlogError::malformed("date", "is out of range"))
}

/// Reads a JSON object into one of the raw records above.
fn object<T: DeserializeOwned>(value: Value, field: &str) -> Result<T> {
    if !value.is_object() {
        return Err(BenchlogError::malformed(
            field,
            format!("must be an object, got {value}"),
        ));
    }
    serde_json::from_value(value).map_err(|e| BenchlogError::malformed(field, e.to_string()))
}

fn require<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| BenchlogError::malformed(field, "is missing"))
}

fn optional_text(value: Option<Value>, field: &str) -> Result<Option<String>> {
    match value {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(other) => Err(BenchlogError::malformed(
            field,
            format!("must be a string, got {other}"),
        )),
    }
}

fn require_text(value: Option<Value>, field: &str) -> Result<String> {
    let text = require(optional_text(value, field)?, field)?;
    if text.trim().is_empty() {
        return Err(BenchlogError::malformed(field, "must not be empty"));
    }
    Ok(text)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn payload(commit: &str, date: i64, benches: Value) -> Value {
        json!({
            "commit": {
                "author": {"email": "aelred717@gmail.com", "name": "Felix Chapman", "username": "aelred"},
                "committer": {"email": "aelred717@gmail.com", "name": "Felix Chapman", "username": "aelred"},
                "distinct": true,
                "id": commit,
                "message": "Disable benches to fix something",
                "timestamp": "2020-10-18T12:45:53+01:00",
                "tree_id": "ea9a7a08aa3b17fb854d1767169a5964a37eb135",
                "url": format!("https://github.com/aelred/skakoui/commit/{commit}")
            },
            "date": date,
            "tool": "cargo",
            "benches": benches
        })
    }

    fn run_from(value: Value) -> Result<BenchmarkRun> {
        parse_run_str(&value.to_string())
    }

    fn expect_field(result: Result<BenchmarkRun>, expected: &str) {
        match result {
            Err(BenchlogError::MalformedRun { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected MalformedRun on {expected}, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_valid_run() {
        let run = run_from(payload(
            "6b648cfbf736c2141d1fb405178f021a2375179c",
            1_603_021_807_453,
            json!([
                {"name": "perft_init/1", "value": 3078, "range": "± 114", "unit": "ns/iter"},
                {"name": "mate/in1", "value": 95666840, "range": "± 1865019", "unit": "ns/iter"}
            ]),
        ))
        .unwrap();

        assert_eq!(run.commit.id, "6b648cfbf736c2141d1fb405178f021a2375179c");
        assert_eq!(run.commit.author.username.as_deref(), Some("aelred"));
        assert_eq!(run.date.timestamp_millis(), 1_603_021_807_453);
        assert_eq!(run.tool, "cargo");
        assert_eq!(run.benches.len(), 2);
        assert_eq!(run.sample("mate/in1").unwrap().range, 1_865_019.0);
    }

    #[test]
    fn test_missing_commit_id_is_named() {
        let mut value = payload("abc", 1, json!([{"name": "a", "value": 1, "range": "± 0", "unit": "ns"}]));
        value["commit"].as_object_mut().unwrap().remove("id");

        expect_field(run_from(value), "commit.id");
    }

    #[test]
    fn test_missing_author_name_is_named() {
        let mut value = payload("abc", 1, json!([{"name": "a", "value": 1, "range": "± 0", "unit": "ns"}]));
        value["commit"]["author"].as_object_mut().unwrap().remove("name");

        expect_field(run_from(value), "commit.author.name");
    }

    #[test]
    fn test_negative_value_is_rejected() {
        let value = payload(
            "abc",
            1,
            json!([
                {"name": "a", "value": 1, "range": "± 0", "unit": "ns"},
                {"name": "b", "value": -5, "range": "± 0", "unit": "ns"}
            ]),
        );

        expect_field(run_from(value), "benches[1].value");
    }

    #[test]
    fn test_unparseable_range_is_rejected() {
        let value = payload("abc", 1, json!([{"name": "a", "value": 1, "range": "± n/a", "unit": "ns"}]));

        expect_field(run_from(value), "benches[0].range");
    }

    #[test]
    fn test_unknown_unit_is_rejected() {
        let value = payload("abc", 1, json!([{"name": "a", "value": 1, "range": "± 0", "unit": "furlongs"}]));

        expect_field(run_from(value), "benches[0].unit");
    }

    #[test]
    fn test_empty_benches_are_rejected() {
        expect_field(run_from(payload("abc", 1, json!([]))), "benches");
    }

    #[test]
    fn test_duplicate_bench_names_are_rejected() {
        let value = payload(
            "abc",
            1,
            json!([
                {"name": "mate/in2", "value": 1, "range": "± 0", "unit": "ns"},
                {"name": "mate/in2", "value": 2, "range": "± 0", "unit": "ns"}
            ]),
        );

        expect_field(run_from(value), "benches[1].name");
    }

    #[test]
    fn test_negative_date_is_rejected() {
        let value = payload("abc", -1, json!([{"name": "a", "value": 1, "range": "± 0", "unit": "ns"}]));

        expect_field(run_from(value), "date");
    }

    #[test]
    fn test_invalid_json_is_malformed_payload() {
        expect_field(parse_run_str("{ not json"), "payload");
    }

    #[test]
    fn test_wrong_typed_fields_are_named() {
        let bench = || json!([{"name": "a", "value": 1, "range": "± 0", "unit": "ns"}]);
        let cases: [(&str, fn(&mut Value)); 11] = [
            ("tool", |v: &mut Value| v["tool"] = json!(3)),
            ("commit", |v: &mut Value| v["commit"] = json!("6b648cf")),
            ("commit.id", |v: &mut Value| v["commit"]["id"] = json!(42)),
            ("commit.author", |v: &mut Value| v["commit"]["author"] = json!("Felix Chapman")),
            ("commit.committer.email", |v: &mut Value| v["commit"]["committer"]["email"] = json!(false)),
            ("commit.distinct", |v: &mut Value| v["commit"]["distinct"] = json!("yes")),
            ("commit.url", |v: &mut Value| v["commit"]["url"] = json!(7)),
            ("benches", |v: &mut Value| v["benches"] = json!({"name": "a"})),
            ("benches[0]", |v: &mut Value| v["benches"][0] = json!("perft_init/1")),
            ("benches[0].name", |v: &mut Value| v["benches"][0]["name"] = json!(5)),
            ("benches[0].unit", |v: &mut Value| v["benches"][0]["unit"] = json!(1)),
        ];

        for (field, corrupt) in cases {
            let mut value = payload("abc", 1, bench());
            corrupt(&mut value);
            expect_field(run_from(value), field);
        }
    }

    #[test]
    fn test_null_optional_fields_are_absent() {
        let mut value = payload("abc", 1, json!([{"name": "a", "value": 1, "range": 0, "unit": "ns"}]));
        value["commit"]["url"] = Value::Null;
        value["commit"]["author"]["email"] = Value::Null;

        let run = run_from(value).unwrap();

        assert!(run.commit.url.is_none());
        assert!(run.commit.author.email.is_none());
    }

    #[test]
    fn test_non_object_payload_is_malformed_payload() {
        expect_field(parse_run_str("[1, 2, 3]"), "payload");
    }

    #[test]
    fn test_parse_document_keeps_broken_runs_for_later() {
        let text = json!({
            "entries": {
                "Benchmark": [
                    payload("abc", 1, json!([{"name": 5, "value": 1, "range": "± 0", "unit": "ns"}])),
                    {"tool": 3}
                ]
            }
        })
        .to_string();

        let doc = parse_document(&text).unwrap();

        assert_eq!(doc.entries["Benchmark"].len(), 2);
        expect_field(parse_run_value(doc.entries["Benchmark"][0].clone()), "benches[0].name");
    }

    #[test]
    fn test_parse_document_with_js_wrapper() {
        let text = format!(
            "window.BENCHMARK_DATA = {};\n",
            json!({
                "lastUpdate": 1_603_021_810_692_i64,
                "repoUrl": "https://github.com/aelred/skakoui",
                "entries": {
                    "Benchmark": [payload("abc", 1, json!([{"name": "a", "value": 1, "range": "± 0", "unit": "ns"}]))]
                }
            })
        );

        let doc = parse_document(&text).unwrap();

        assert_eq!(doc.repo_url.as_deref(), Some("https://github.com/aelred/skakoui"));
        assert_eq!(doc.entries["Benchmark"].len(), 1);
    }
}
