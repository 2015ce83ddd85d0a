//! End-to-end integration tests: tables on disk through full query plans.

use std::path::PathBuf;
use std::sync::Arc;

use quarry_codec::manifest::TableManifest;
use quarry_codec::table::{write_table, TableColumn};
use quarry_core::config::EngineConfig;
use quarry_core::value::{LogicalType, Value};
use quarry_exec::QueryEngine;
use quarry_operators::build;
use quarry_operators::UnaryFn;
use quarry_plan::{plan_from_json, plan_to_json};

fn engine(workers: usize, block_size: usize) -> QueryEngine {
    let cfg = EngineConfig {
        block_size,
        max_parallel_tasks: workers,
        ..EngineConfig::default()
    };
    QueryEngine::new(cfg).expect("engine config is valid")
}

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("quarry-it-{tag}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("temp dir");
    dir
}

/// A 100-row, two-column table split into three on-disk segments.
fn sample_table(tag: &str) -> PathBuf {
    let dir = temp_dir(tag);
    let ids: Vec<Value> = (0..100).map(Value::Int).collect();
    let scores: Vec<Value> = (0..100).map(|i| Value::Float(i as f64 / 2.0)).collect();
    write_table(
        &dir,
        "sample",
        &[
            TableColumn::new("id", LogicalType::Int, ids),
            TableColumn::new("score", LogicalType::Float, scores),
        ],
        &[40, 40, 20],
        16,
    )
    .expect("table write")
}

#[test]
fn scan_transform_filter_reduce_pipeline() {
    let manifest = sample_table("pipeline");
    let eng = engine(4, 8);

    let scan = build::scan_node(&manifest).unwrap();
    let ids = build::project_node(scan, &[0]).unwrap();
    let at_least_50: UnaryFn = Arc::new(|v| Value::Int(i64::from(v.as_int().unwrap_or(0) >= 50)));
    let mask = build::transform_node(Arc::clone(&ids), at_least_50, LogicalType::Int).unwrap();
    let kept = build::filter_node(ids, mask).unwrap();
    let plan = build::reduce_node(kept, "sum", eng.registry()).unwrap();

    let out = eng.run_auto(&plan).unwrap();
    let expected: i64 = (50..100).sum();
    assert_eq!(out.rows(), vec![vec![Value::Int(expected)]]);
}

#[test]
fn scan_respects_manifest_segments() {
    let manifest = sample_table("segments");
    let loaded = TableManifest::load(&manifest).unwrap();
    assert_eq!(loaded.segment_rows, vec![40, 40, 20]);

    let eng = engine(4, 16);
    let plan = build::scan_node(&manifest).unwrap();
    let out = eng.run_auto(&plan).unwrap();

    // Three on-disk segments drive three output segments, in table order.
    assert_eq!(out.segments.len(), 3);
    let ids: Vec<i64> = out
        .rows()
        .into_iter()
        .map(|row| row[0].as_int().unwrap())
        .collect();
    assert_eq!(ids, (0..100).collect::<Vec<_>>());
}

#[test]
fn reduce_below_a_transform_runs_whole() {
    let manifest = sample_table("interior");
    let eng = engine(4, 8);

    // The table has three on-disk segments, but a reduction feeding another
    // operator must not split: splitting would hand the transform partial
    // aggregator state instead of the reduced value.
    let scan = build::scan_node(&manifest).unwrap();
    let ids = build::project_node(scan, &[0]).unwrap();
    let total = build::reduce_node(ids, "sum", eng.registry()).unwrap();
    let doubled: UnaryFn = Arc::new(|v| Value::Int(v.as_int().unwrap_or(0) * 2));
    let plan = build::transform_node(total, doubled, LogicalType::Int).unwrap();

    let out = eng.run_auto(&plan).unwrap();
    let expected: i64 = (0..100).sum::<i64>() * 2;
    assert_eq!(out.rows(), vec![vec![Value::Int(expected)]]);
}

#[test]
fn union_of_scan_and_range() {
    let manifest = sample_table("union");
    let eng = engine(2, 32);

    let scan = build::scan_node(&manifest).unwrap();
    let ids = build::project_node(scan, &[0]).unwrap();
    let tags = build::range_node(1000, 1100).unwrap();
    let plan = build::union_node(ids, tags).unwrap();

    let out = eng.run_auto(&plan).unwrap();
    let rows = out.rows();
    assert_eq!(rows.len(), 100);
    assert_eq!(rows[0], vec![Value::Int(0), Value::Int(1000)]);
    assert_eq!(rows[99], vec![Value::Int(99), Value::Int(1099)]);
}

#[test]
fn string_column_round_trips_through_scan() {
    let dir = temp_dir("strings");
    let names: Vec<Value> = ["alpha", "beta", "", "delta with spaces", "épsilon"]
        .iter()
        .map(|s| Value::Str(s.to_string()))
        .collect();
    let manifest = write_table(
        &dir,
        "names",
        &[TableColumn::new("name", LogicalType::Str, names.clone())],
        &[5],
        2,
    )
    .unwrap();

    let eng = engine(1, 3);
    let plan = build::scan_node(&manifest).unwrap();
    let out = eng.run_auto(&plan).unwrap();
    let got: Vec<Value> = out.rows().into_iter().map(|mut r| r.remove(0)).collect();
    assert_eq!(got, names);
}

#[test]
fn serialized_plan_executes_identically() {
    let manifest = sample_table("serde");
    let eng = engine(2, 8);

    let scan = build::scan_node(&manifest).unwrap();
    let ids = build::project_node(scan, &[0]).unwrap();
    let plan = build::reduce_node(ids, "mean", eng.registry()).unwrap();

    let text = plan_to_json(&plan).unwrap();
    let rebuilt = plan_from_json(&text).unwrap();

    let direct = eng.run_auto(&plan).unwrap();
    let via_json = eng.run_auto(&rebuilt).unwrap();
    assert_eq!(direct.rows(), via_json.rows());
    assert_eq!(direct.rows(), vec![vec![Value::Float(49.5)]]);
}

#[test]
fn closure_plans_refuse_serialization() {
    let noop: UnaryFn = Arc::new(|v| v.clone());
    let plan = build::transform_node(
        build::range_node(0, 4).unwrap(),
        noop,
        LogicalType::Int,
    )
    .unwrap();
    assert!(plan_to_json(&plan).is_err());
}
