//! Turning plan nodes into runnable operator trees.

use std::sync::Arc;

use quarry_codec::cache::BlockCache;
use quarry_codec::manifest::TableManifest;
use quarry_core::error::{Error, Result};
use quarry_plan::{infer_output_types, NodeRef, OpaqueParam, OperatorKind, PlanNode};

use crate::aggregate::AggregatorRegistry;
use crate::context::{Operator, OperatorTree};
use crate::filter::LogicalFilter;
use crate::project::Project;
use crate::range::RangeSource;
use crate::reduce::Reduce;
use crate::scan::ScanSource;
use crate::transform::{BinaryTransform, Transform};
use crate::union::Union;

/// Shared services operators draw on when a plan is instantiated.
pub struct OperatorEnv {
    pub cache: Arc<BlockCache>,
    pub registry: Arc<AggregatorRegistry>,
    pub block_size: usize,
}

/// Build the full operator tree for one segment worker. A node shared by two
/// consumers in the plan DAG becomes two independent subtrees.
pub fn build_tree(node: &NodeRef, env: &OperatorEnv) -> Result<OperatorTree> {
    let output_types = infer_output_types(node)?;
    let inputs = node
        .inputs()
        .iter()
        .map(|input| build_tree(input, env))
        .collect::<Result<Vec<_>>>()?;
    let op = instantiate(node, env)?;
    Ok(OperatorTree::new(op, inputs, output_types, env.block_size))
}

fn unary_fn(node: &PlanNode, key: &str) -> Result<crate::transform::UnaryFn> {
    match node.opaque_param(key)? {
        OpaqueParam::UnaryFn(f) => Ok(Arc::clone(f)),
        other => Err(Error::Plan(format!(
            "{} parameter {key:?} should be a unary function, got {other:?}",
            node.kind().name()
        ))),
    }
}

fn binary_fn(node: &PlanNode, key: &str) -> Result<crate::transform::BinaryFn> {
    match node.opaque_param(key)? {
        OpaqueParam::BinaryFn(f) => Ok(Arc::clone(f)),
        other => Err(Error::Plan(format!(
            "{} parameter {key:?} should be a binary function, got {other:?}",
            node.kind().name()
        ))),
    }
}

/// Build one node's operator, without its inputs.
pub fn instantiate(node: &PlanNode, env: &OperatorEnv) -> Result<Box<dyn Operator>> {
    Ok(match node.kind() {
        OperatorKind::Range => Box::new(RangeSource::new(
            node.int_param("start")?,
            node.int_param("end")?,
        )),
        OperatorKind::Scan => {
            let manifest = Arc::new(TableManifest::load(node.str_param("manifest")?)?);
            Box::new(ScanSource::open(manifest, Arc::clone(&env.cache))?)
        }
        OperatorKind::Transform => Box::new(Transform::new(
            unary_fn(node, "fn")?,
            node.type_param("output_type")?,
        )),
        OperatorKind::BinaryTransform => Box::new(BinaryTransform::new(
            binary_fn(node, "fn")?,
            node.type_param("output_type")?,
        )),
        OperatorKind::Project => Box::new(Project::new(node.index_list_param("columns")?)),
        OperatorKind::Union => Box::new(Union::new()),
        OperatorKind::LogicalFilter => Box::new(LogicalFilter::new()),
        OperatorKind::Reduce => {
            let mut agg = env.registry.build(node.str_param("aggregator")?)?;
            let input_types = infer_output_types(node.input(0)?)?;
            let bound = agg.set_input_types(&input_types)?;
            let declared = node.type_param("output_type")?;
            if bound != declared {
                return Err(Error::Plan(format!(
                    "reduce declares output type {declared} but {} produces {bound}",
                    node.str_param("aggregator")?
                )));
            }
            Box::new(Reduce::new(agg))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build;
    use crate::context::SegmentSpec;
    use quarry_core::value::Value;

    fn env() -> OperatorEnv {
        OperatorEnv {
            cache: Arc::new(BlockCache::new(64)),
            registry: Arc::new(AggregatorRegistry::with_builtins()),
            block_size: 4,
        }
    }

    #[test]
    fn builds_and_runs_a_reduce_plan() {
        let env = env();
        let plan = build::reduce_node(
            build::range_node(0, 10).unwrap(),
            "sum",
            &env.registry,
        )
        .unwrap();
        let mut tree = build_tree(&plan, &env).unwrap();
        let batches = tree.run_to_completion(SegmentSpec::whole(10)).unwrap();
        assert_eq!(batches[0].row(0), vec![Value::Int(45)]);
    }

    #[test]
    fn shared_plan_node_becomes_two_subtrees() {
        let env = env();
        let shared = build::range_node(0, 6).unwrap();
        let plan = build::union_node(Arc::clone(&shared), shared).unwrap();
        let mut tree = build_tree(&plan, &env).unwrap();
        let batches = tree.run_to_completion(SegmentSpec::whole(6)).unwrap();
        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 6);
        assert_eq!(batches[0].row(0), vec![Value::Int(0), Value::Int(0)]);
    }

    #[test]
    fn tree_output_types_match_inference() {
        let env = env();
        let source = build::range_node(0, 8).unwrap();
        let plan = build::union_node(Arc::clone(&source), source).unwrap();
        let tree = build_tree(&plan, &env).unwrap();
        assert_eq!(tree.output_types(), infer_output_types(&plan).unwrap());
    }

    #[test]
    fn unknown_aggregator_is_a_plan_error() {
        let env = env();
        let plan = build::reduce_node(build::range_node(0, 4).unwrap(), "median", &env.registry);
        assert!(matches!(plan, Err(Error::Plan(_))));
    }
}
