//! Convenience constructors for plan nodes.
//!
//! These are thin wrappers over `make_plan_node` that know each kind's
//! parameter names, so callers do not assemble parameter maps by hand.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;

use quarry_core::error::Result;
use quarry_core::value::{LogicalType, Value};
use quarry_plan::{infer_output_types, make_plan_node, NodeRef, OpaqueParam, OperatorKind};

use crate::aggregate::AggregatorRegistry;
use crate::transform::{BinaryFn, UnaryFn};

pub fn range_node(start: i64, end: i64) -> Result<NodeRef> {
    let mut params = BTreeMap::new();
    params.insert("start".to_string(), Value::Int(start));
    params.insert("end".to_string(), Value::Int(end));
    make_plan_node(OperatorKind::Range, params, HashMap::new(), vec![])
}

pub fn scan_node(manifest: impl AsRef<Path>) -> Result<NodeRef> {
    let mut params = BTreeMap::new();
    params.insert(
        "manifest".to_string(),
        Value::Str(manifest.as_ref().to_string_lossy().into_owned()),
    );
    make_plan_node(OperatorKind::Scan, params, HashMap::new(), vec![])
}

pub fn transform_node(input: NodeRef, f: UnaryFn, output_type: LogicalType) -> Result<NodeRef> {
    let mut params = BTreeMap::new();
    params.insert("output_type".to_string(), Value::Str(output_type.to_string()));
    let mut opaque = HashMap::new();
    opaque.insert("fn".to_string(), OpaqueParam::UnaryFn(f));
    make_plan_node(OperatorKind::Transform, params, opaque, vec![input])
}

pub fn binary_transform_node(
    left: NodeRef,
    right: NodeRef,
    f: BinaryFn,
    output_type: LogicalType,
) -> Result<NodeRef> {
    let mut params = BTreeMap::new();
    params.insert("output_type".to_string(), Value::Str(output_type.to_string()));
    let mut opaque = HashMap::new();
    opaque.insert("fn".to_string(), OpaqueParam::BinaryFn(f));
    make_plan_node(
        OperatorKind::BinaryTransform,
        params,
        opaque,
        vec![left, right],
    )
}

pub fn project_node(input: NodeRef, columns: &[usize]) -> Result<NodeRef> {
    let mut list = String::new();
    for (i, c) in columns.iter().enumerate() {
        if i > 0 {
            list.push(',');
        }
        let _ = write!(&mut list, "{c}");
    }
    let mut params = BTreeMap::new();
    params.insert("columns".to_string(), Value::Str(list));
    make_plan_node(OperatorKind::Project, params, HashMap::new(), vec![input])
}

pub fn union_node(left: NodeRef, right: NodeRef) -> Result<NodeRef> {
    make_plan_node(
        OperatorKind::Union,
        BTreeMap::new(),
        HashMap::new(),
        vec![left, right],
    )
}

pub fn filter_node(values: NodeRef, mask: NodeRef) -> Result<NodeRef> {
    make_plan_node(
        OperatorKind::LogicalFilter,
        BTreeMap::new(),
        HashMap::new(),
        vec![values, mask],
    )
}

/// Builds a reduce node, binding the aggregator to the input's column type to
/// record the declared output type on the node.
pub fn reduce_node(
    input: NodeRef,
    aggregator: &str,
    registry: &AggregatorRegistry,
) -> Result<NodeRef> {
    let mut prototype = registry.build(aggregator)?;
    let input_types = infer_output_types(&input)?;
    let output_type = prototype.set_input_types(&input_types)?;

    let mut params = BTreeMap::new();
    params.insert("aggregator".to_string(), Value::Str(aggregator.to_string()));
    params.insert("output_type".to_string(), Value::Str(output_type.to_string()));
    make_plan_node(OperatorKind::Reduce, params, HashMap::new(), vec![input])
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_plan::infer_output_length;

    #[test]
    fn reduce_node_records_output_type() {
        let reg = AggregatorRegistry::with_builtins();
        let node = reduce_node(range_node(0, 10).unwrap(), "mean", &reg).unwrap();
        assert_eq!(node.str_param("output_type").unwrap(), "float");
        assert_eq!(infer_output_length(&node).unwrap(), quarry_plan::UNKNOWN_LENGTH);
    }

    #[test]
    fn project_node_joins_indices() {
        let reg_input = range_node(0, 3).unwrap();
        let node = project_node(reg_input, &[0]).unwrap();
        assert_eq!(node.str_param("columns").unwrap(), "0");
        assert_eq!(node.index_list_param("columns").unwrap(), vec![0]);
    }
}
