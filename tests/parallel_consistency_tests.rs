//! Parallel runs must agree with single-segment runs.

use std::sync::Arc;

use quarry_core::config::EngineConfig;
use quarry_core::value::{LogicalType, Value};
use quarry_exec::QueryEngine;
use quarry_operators::{build, BinaryFn, SegmentSpec, UnaryFn};
use quarry_plan::NodeRef;

fn engine(workers: usize, block_size: usize) -> QueryEngine {
    let cfg = EngineConfig {
        block_size,
        max_parallel_tasks: workers,
        ..EngineConfig::default()
    };
    QueryEngine::new(cfg).expect("engine config is valid")
}

/// Deterministic pseudo-random int column as a plan.
fn noisy_range(n: i64) -> NodeRef {
    let scramble: UnaryFn = Arc::new(|v| match v.as_int() {
        Some(i) => Value::Int((i.wrapping_mul(2654435761) >> 7) % 1000),
        None => Value::Null,
    });
    build::transform_node(
        build::range_node(0, n).unwrap(),
        scramble,
        LogicalType::Int,
    )
    .unwrap()
}

fn run_both_ways(plan: &NodeRef, rows: u64) -> (Vec<Vec<Value>>, Vec<Vec<Value>>) {
    let serial = engine(1, 7);
    let parallel = engine(4, 7);
    let single = serial
        .run(plan, &[SegmentSpec::whole(rows)])
        .unwrap()
        .rows();
    let split = parallel.run_auto(plan).unwrap().rows();
    (single, split)
}

#[test]
fn linear_pipeline_output_is_segment_order_stable() {
    let add: BinaryFn = Arc::new(|a, b| match (a.as_int(), b.as_int()) {
        (Some(x), Some(y)) => Value::Int(x + y),
        _ => Value::Null,
    });
    let plan = build::binary_transform_node(
        noisy_range(200),
        build::range_node(0, 200).unwrap(),
        add,
        LogicalType::Int,
    )
    .unwrap();

    let (single, split) = run_both_ways(&plan, 200);
    assert_eq!(single, split);
}

#[test]
fn reductions_agree_across_segmentations() {
    let eng = engine(4, 7);
    for agg in ["sum", "count", "min", "max"] {
        let plan = build::reduce_node(noisy_range(333), agg, eng.registry()).unwrap();
        let (single, split) = run_both_ways(&plan, 333);
        assert_eq!(single, split, "aggregator {agg} diverged");
    }
}

#[test]
fn mean_agrees_within_float_tolerance() {
    let eng = engine(4, 5);
    let plan = build::reduce_node(noisy_range(333), "mean", eng.registry()).unwrap();
    let (single, split) = run_both_ways(&plan, 333);
    let a = single[0][0].as_float().unwrap();
    let b = split[0][0].as_float().unwrap();
    assert!((a - b).abs() < 1e-9, "mean diverged: {a} vs {b}");
}

#[test]
fn filtered_reduction_matches_serial() {
    let eng = engine(4, 7);
    let values = noisy_range(500);
    let is_even: UnaryFn = Arc::new(|v| Value::Int(i64::from(v.as_int().unwrap_or(1) % 2 == 0)));
    let mask = build::transform_node(Arc::clone(&values), is_even, LogicalType::Int).unwrap();
    let kept = build::filter_node(values, mask).unwrap();
    let plan = build::reduce_node(kept, "sum", eng.registry()).unwrap();

    let (single, split) = run_both_ways(&plan, 500);
    assert_eq!(single, split);
}

#[test]
fn block_size_never_changes_results() {
    for block_size in [1usize, 3, 64, 1024] {
        let eng = engine(2, block_size);
        let plan = build::reduce_node(noisy_range(100), "sum", eng.registry()).unwrap();
        let out = eng.run_auto(&plan).unwrap();
        let baseline = engine(1, 11)
            .run(&plan, &[SegmentSpec::whole(100)])
            .unwrap();
        assert_eq!(out.rows(), baseline.rows(), "block size {block_size}");
    }
}
