//! The query driver: plans in, row batches out.
//!
//! One engine owns the block cache, the aggregator registry, and a worker
//! pool. `run` executes one plan across an explicit segment list; `run_auto`
//! derives the segment list from the plan's sources first.

use std::sync::Arc;
use std::thread::available_parallelism;

use rayon::prelude::*;
use uuid::Uuid;

use quarry_codec::cache::BlockCache;
use quarry_core::batch::RowBatch;
use quarry_core::config::EngineConfig;
use quarry_core::error::{Error, Result};
use quarry_core::value::Value;
use quarry_operators::{build_tree, AggregatorRegistry, OperatorEnv, SegmentSpec};
use quarry_plan::{infer_output_types, plan_hash, NodeRef, OperatorKind};

use crate::segments::{plan_segments, source_domain};

fn subtree_has_reduce(node: &NodeRef) -> bool {
    node.kind() == OperatorKind::Reduce || node.inputs().iter().any(subtree_has_reduce)
}

/// A reduction below the plan root emits per-segment partial state that the
/// operators above it would consume as data. Such plans only run whole.
fn has_interior_reduce(plan: &NodeRef) -> bool {
    plan.inputs().iter().any(subtree_has_reduce)
}

/// Per-segment batch lists, in segment order.
#[derive(Debug)]
pub struct QueryOutput {
    pub segments: Vec<Vec<RowBatch>>,
}

impl QueryOutput {
    pub fn num_rows(&self) -> usize {
        self.segments
            .iter()
            .flat_map(|batches| batches.iter())
            .map(RowBatch::num_rows)
            .sum()
    }

    /// Materialize every row in segment order.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        let mut out = Vec::with_capacity(self.num_rows());
        for batches in &self.segments {
            for batch in batches {
                for r in 0..batch.num_rows() {
                    out.push(batch.row(r));
                }
            }
        }
        out
    }
}

pub struct QueryEngine {
    cfg: EngineConfig,
    cache: Arc<BlockCache>,
    registry: Arc<AggregatorRegistry>,
    pool: rayon::ThreadPool,
}

impl QueryEngine {
    pub fn new(cfg: EngineConfig) -> Result<Self> {
        cfg.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(cfg.max_parallel_tasks)
            .thread_name(|i| format!("quarry-worker-{i}"))
            .build()
            .map_err(|e| Error::Config(format!("worker pool: {e}")))?;
        Ok(Self {
            cache: Arc::new(BlockCache::new(cfg.cache_sweep_interval)),
            registry: Arc::new(AggregatorRegistry::with_builtins()),
            cfg,
            pool,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &Arc<AggregatorRegistry> {
        &self.registry
    }

    fn env(&self) -> OperatorEnv {
        OperatorEnv {
            cache: Arc::clone(&self.cache),
            registry: Arc::clone(&self.registry),
            block_size: self.cfg.block_size,
        }
    }

    /// Execute `plan` over an explicit segment list.
    pub fn run(&self, plan: &NodeRef, segments: &[SegmentSpec]) -> Result<QueryOutput> {
        if segments.is_empty() {
            return Err(Error::Plan("query needs at least one segment".to_string()));
        }
        for (pos, seg) in segments.iter().enumerate() {
            if seg.index != pos || seg.num_segments != segments.len() || seg.row_begin > seg.row_end
            {
                return Err(Error::Plan(format!(
                    "inconsistent segment list at position {pos}: {seg:?}"
                )));
            }
        }
        if segments.len() > 1 && has_interior_reduce(plan) {
            return Err(Error::Plan(
                "a reduction below the plan root cannot split across segments; \
                 run this plan with a single segment"
                    .to_string(),
            ));
        }

        let query_id = Uuid::new_v4();
        let hash = plan_hash(plan)?;
        let span = tracing::info_span!("query", id = %query_id, plan = %hash);
        let _enter = span.enter();
        tracing::debug!(segments = segments.len(), "starting query");

        let template = build_tree(plan, &self.env())?;
        let outputs: Vec<Vec<RowBatch>> = if segments.len() == 1 {
            let mut tree = template;
            vec![tree.run_to_completion(segments[0])?]
        } else {
            let work: Vec<(SegmentSpec, _)> = segments
                .iter()
                .map(|seg| (*seg, template.clone_for_segment()))
                .collect();
            self.pool.install(|| {
                work.into_par_iter()
                    .map(|(seg, mut tree)| tree.run_to_completion(seg))
                    .collect::<Result<Vec<_>>>()
            })?
        };

        let output = if plan.kind() == OperatorKind::Reduce && segments.len() > 1 {
            self.finalize_reduce(plan, &outputs)?
        } else {
            QueryOutput { segments: outputs }
        };
        tracing::info!(rows = output.num_rows(), "query complete");
        Ok(output)
    }

    /// Execute `plan`, deriving segments from its sources. Scanned tables
    /// keep their on-disk segment boundaries; purely generated plans split
    /// evenly across the worker pool. Plans with a reduction anywhere below
    /// the root run as a single segment.
    pub fn run_auto(&self, plan: &NodeRef) -> Result<QueryOutput> {
        let domain = source_domain(plan)?;
        if has_interior_reduce(plan) {
            // Even a scanned table's segment boundaries are ignored here.
            let whole = [SegmentSpec::whole(domain.num_rows.unwrap_or(0))];
            return self.run(plan, &whole);
        }
        let workers = if self.cfg.max_parallel_tasks == 0 {
            available_parallelism().map(usize::from).unwrap_or(1)
        } else {
            self.cfg.max_parallel_tasks
        };
        let segments = plan_segments(&domain, workers);
        self.run(plan, &segments)
    }

    /// Merge per-segment partial aggregator states into the final value.
    fn finalize_reduce(&self, plan: &NodeRef, outputs: &[Vec<RowBatch>]) -> Result<QueryOutput> {
        let name = plan.str_param("aggregator")?;
        let input_types = infer_output_types(plan.input(0)?)?;
        let mut total = self.registry.build(name)?;
        total.set_input_types(&input_types)?;

        for batches in outputs {
            for batch in batches {
                for r in 0..batch.num_rows() {
                    let row = batch.row(r);
                    let state = row.first().and_then(Value::as_str).ok_or_else(|| {
                        Error::Invariant("reduce segment emitted no partial state".to_string())
                    })?;
                    let mut partial = self.registry.build(name)?;
                    partial.set_input_types(&input_types)?;
                    partial.load(state)?;
                    total.combine(partial.as_ref())?;
                }
            }
        }

        Ok(QueryOutput {
            segments: vec![vec![RowBatch::single_row(vec![total.emit()])]],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_operators::build;
    use quarry_operators::UnaryFn;
    use quarry_core::value::LogicalType;

    fn engine(workers: usize) -> QueryEngine {
        let cfg = EngineConfig {
            block_size: 16,
            max_parallel_tasks: workers,
            ..EngineConfig::default()
        };
        QueryEngine::new(cfg).unwrap()
    }

    #[test]
    fn parallel_reduce_merges_partials() {
        let eng = engine(4);
        let plan = build::reduce_node(
            build::range_node(0, 100).unwrap(),
            "sum",
            eng.registry(),
        )
        .unwrap();
        let out = eng.run_auto(&plan).unwrap();
        assert_eq!(out.rows(), vec![vec![Value::Int(4950)]]);
    }

    #[test]
    fn segment_outputs_preserve_order() {
        let eng = engine(3);
        let plan = build::range_node(0, 30).unwrap();
        let out = eng.run_auto(&plan).unwrap();
        let values: Vec<i64> = out
            .rows()
            .into_iter()
            .map(|row| row[0].as_int().unwrap())
            .collect();
        assert_eq!(values, (0..30).collect::<Vec<_>>());
    }

    #[test]
    fn filtered_pipeline_runs_in_parallel() {
        let eng = engine(4);
        let source = build::range_node(0, 50).unwrap();
        let is_big: UnaryFn =
            std::sync::Arc::new(|v| Value::Int(i64::from(v.as_int().unwrap_or(0) >= 40)));
        let mask = build::transform_node(
            std::sync::Arc::clone(&source),
            is_big,
            LogicalType::Int,
        )
        .unwrap();
        let plan = build::filter_node(source, mask).unwrap();
        let out = eng.run_auto(&plan).unwrap();
        let values: Vec<i64> = out
            .rows()
            .into_iter()
            .map(|row| row[0].as_int().unwrap())
            .collect();
        assert_eq!(values, (40..50).collect::<Vec<_>>());
    }

    #[test]
    fn interior_reduce_runs_whole() {
        let eng = engine(4);
        let total = build::reduce_node(
            build::range_node(0, 100).unwrap(),
            "sum",
            eng.registry(),
        )
        .unwrap();
        let doubled: UnaryFn =
            std::sync::Arc::new(|v| Value::Int(v.as_int().unwrap_or(0) * 2));
        let plan = build::transform_node(total, doubled, LogicalType::Int).unwrap();
        let out = eng.run_auto(&plan).unwrap();
        assert_eq!(out.rows(), vec![vec![Value::Int(9900)]]);
    }

    #[test]
    fn interior_reduce_rejects_explicit_multi_segment() {
        let eng = engine(2);
        let total = build::reduce_node(
            build::range_node(0, 10).unwrap(),
            "sum",
            eng.registry(),
        )
        .unwrap();
        let doubled: UnaryFn =
            std::sync::Arc::new(|v| Value::Int(v.as_int().unwrap_or(0) * 2));
        let plan = build::transform_node(total, doubled, LogicalType::Int).unwrap();
        let segs = [
            SegmentSpec {
                index: 0,
                num_segments: 2,
                row_begin: 0,
                row_end: 5,
            },
            SegmentSpec {
                index: 1,
                num_segments: 2,
                row_begin: 5,
                row_end: 10,
            },
        ];
        assert!(matches!(eng.run(&plan, &segs), Err(Error::Plan(_))));
    }

    #[test]
    fn inconsistent_segment_list_rejected() {
        let eng = engine(2);
        let plan = build::range_node(0, 10).unwrap();
        let bad = [SegmentSpec {
            index: 1,
            num_segments: 1,
            row_begin: 0,
            row_end: 10,
        }];
        assert!(eng.run(&plan, &bad).is_err());
    }
}
