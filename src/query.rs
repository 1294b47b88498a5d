//! Search, filter, sort and limit over an in-memory record collection.
//!
//! Stages run in a fixed order and each sees only the records admitted by
//! the previous one: search, filter, sort, limit.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A schema-less record: field name to tagged value.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Desc }
    }
}

/// Structured query over one resource's records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_term: Option<String>,
    /// Restricts search to these fields; all fields when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Vec<SortSpec>>,
    /// Non-positive values mean no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_records: Option<i64>,
}

impl QueryDescriptor {
    /// The positive record limit, if any.
    pub fn limit(&self) -> Option<usize> {
        self.max_records
            .filter(|n| *n > 0)
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
    }
}

/// Run `query` over `records`. Pure and deterministic.
pub fn execute(records: &[Record], query: &QueryDescriptor) -> Vec<Record> {
    let term = query
        .search_term
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase);

    let mut out: Vec<Record> = records
        .iter()
        .filter(|r| match &term {
            Some(t) => matches_search(r, t, query.fields.as_deref()),
            None => true,
        })
        .filter(|r| match &query.filter {
            Some(filter) => matches_filter(r, filter),
            None => true,
        })
        .cloned()
        .collect();

    if let Some(specs) = query.sort.as_deref().filter(|s| !s.is_empty()) {
        // `sort_by` is stable, so full ties keep their input order.
        out.sort_by(|a, b| compare_records(a, b, specs));
    }

    if let Some(n) = query.limit() {
        out.truncate(n);
    }

    out
}

fn matches_search(record: &Record, term: &str, fields: Option<&[String]>) -> bool {
    let hit = |value: &Value| searchable_text(value).is_some_and(|s| s.to_lowercase().contains(term));
    match fields {
        Some(fields) => fields.iter().filter_map(|f| record.get(f)).any(hit),
        None => record.values().any(hit),
    }
}

/// Only scalar strings, numbers and booleans take part in search.
fn searchable_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn matches_filter(record: &Record, filter: &Map<String, Value>) -> bool {
    filter
        .iter()
        .all(|(key, expected)| record.get(key).is_some_and(|actual| strict_eq(actual, expected)))
}

/// Exact equality without cross-type coercion. Numbers compare by value so
/// `1` and `1.0` are equal.
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn compare_records(a: &Record, b: &Record, specs: &[SortSpec]) -> Ordering {
    for spec in specs {
        let ord = match (a.get(&spec.field), b.get(&spec.field)) {
            (None, None) => Ordering::Equal,
            // Missing fields sort first ascending, last descending.
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => locale_cmp(&sort_text(x), &sort_text(y)),
        };
        let ord = match spec.direction {
            SortDirection::Asc => ord,
            SortDirection::Desc => ord.reverse(),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

fn sort_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Collation-style string comparison: letters compare case-insensitively
/// first, and only on a full tie does lowercase sort before uppercase.
/// Digits are compared as characters, so "10" sorts before "9".
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    let primary = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    if primary != Ordering::Equal {
        return primary;
    }
    a.chars()
        .map(|c| c.is_uppercase())
        .cmp(b.chars().map(|c| c.is_uppercase()))
}
