//! Determinism regression tests for the query engine.
//!
//! For a fixed record collection and query descriptor, the output must be
//! identical across runs, and re-running a limit-free query over its own
//! output must not change it.

use mcp_record_server::query::{execute, QueryDescriptor, Record, SortSpec};
use serde_json::{json, Map, Value};

fn fixture_records() -> Vec<Record> {
    let rows = json!([
        { "id": "r01", "team": "core", "name": "Delta", "score": 7 },
        { "id": "r02", "team": "edge", "name": "alpha", "score": 12 },
        { "id": "r03", "team": "core", "name": "Charlie", "active": true },
        { "id": "r04", "team": "edge", "name": "Bravo", "score": 7 },
        { "id": "r05", "team": "core", "name": "alpha", "score": 3 },
        { "id": "r06", "team": "ops", "name": "Echo", "score": null },
        { "id": "r07", "team": "core", "name": "delta", "score": 7 }
    ]);
    rows.as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect()
}

fn queries() -> Vec<QueryDescriptor> {
    let mut core = Map::new();
    core.insert("team".into(), json!("core"));

    vec![
        QueryDescriptor::default(),
        QueryDescriptor {
            search_term: Some("ALPHA".into()),
            ..Default::default()
        },
        QueryDescriptor {
            filter: Some(core.clone()),
            sort: Some(vec![SortSpec::asc("name")]),
            ..Default::default()
        },
        QueryDescriptor {
            sort: Some(vec![SortSpec::desc("score"), SortSpec::asc("id")]),
            ..Default::default()
        },
        QueryDescriptor {
            search_term: Some("7".into()),
            fields: Some(vec!["score".into()]),
            filter: Some(core),
            sort: Some(vec![SortSpec::desc("name")]),
            ..Default::default()
        },
    ]
}

fn ids(records: &[Record]) -> Vec<&str> {
    records.iter().map(|r| r["id"].as_str().unwrap()).collect()
}

#[test]
fn identical_runs_produce_identical_output() {
    let records = fixture_records();
    for query in queries() {
        let a = serde_json::to_string(&execute(&records, &query)).unwrap();
        let b = serde_json::to_string(&execute(&records, &query)).unwrap();
        assert_eq!(a, b, "query {query:?} is not deterministic");
    }
}

#[test]
fn limit_free_queries_are_idempotent() {
    let records = fixture_records();
    for query in queries() {
        let once = execute(&records, &query);
        let twice = execute(&once, &query);
        assert_eq!(once, twice, "query {query:?} is not idempotent");
    }
}

#[test]
fn equal_keys_keep_input_order() {
    let records = fixture_records();
    let query = QueryDescriptor {
        sort: Some(vec![SortSpec::asc("score")]),
        ..Default::default()
    };
    let out = execute(&records, &query);
    // r03 has no score and sorts first; "null" is compared as text; the
    // three 7s keep their input order.
    assert_eq!(ids(&out), vec!["r03", "r02", "r05", "r01", "r04", "r07", "r06"]);
}

#[test]
fn case_variants_sort_lowercase_first_and_stay_stable() {
    let records = fixture_records();
    let query = QueryDescriptor {
        sort: Some(vec![SortSpec::asc("name")]),
        ..Default::default()
    };
    let out = execute(&records, &query);
    let names: Vec<&str> = out.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["alpha", "alpha", "Bravo", "Charlie", "delta", "Delta", "Echo"]);
    assert_eq!(ids(&out)[..2], ["r02", "r05"]);
}

#[test]
fn combined_stages_apply_in_order() {
    let records = fixture_records();
    let query = queries().pop().unwrap();
    let out = execute(&records, &query);
    // search "7" in score → r01, r04, r07; filter core → r01, r07;
    // sort name desc → "delta" vs "Delta": primary tie, lowercase first
    // ascending, so descending puts "Delta" first.
    assert_eq!(ids(&out), vec!["r01", "r07"]);

    let limited = QueryDescriptor {
        max_records: Some(1),
        ..query
    };
    assert_eq!(ids(&execute(&records, &limited)), vec!["r01"]);
    assert!(execute(&[], &limited).is_empty());
}

#[test]
fn non_scalar_values_are_not_searched() {
    let records: Vec<Record> = vec![json!({ "id": "x", "tags": ["needle"], "meta": { "k": "needle" } })
        .as_object()
        .unwrap()
        .clone()];
    let query = QueryDescriptor {
        search_term: Some("needle".into()),
        ..Default::default()
    };
    assert!(execute(&records, &query).is_empty());

    let mut filter = Map::new();
    filter.insert("tags".into(), Value::Array(vec![json!("needle")]));
    let query = QueryDescriptor {
        filter: Some(filter),
        ..Default::default()
    };
    assert_eq!(execute(&records, &query).len(), 1);
}
