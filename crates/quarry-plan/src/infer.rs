//! Output type/length inference over plan nodes, memoized per node.
//!
//! Inference runs per kind, bottom-up. Lengths that are not statically
//! knowable (downstream of a reduction or filter) report `UNKNOWN_LENGTH`.

use quarry_codec::manifest::TableManifest;
use quarry_core::error::{Error, Result};
use quarry_core::value::LogicalType;

use crate::hash::{hash_chunks, Hash256};
use crate::node::{NodeInfo, OperatorKind, PlanNode};

/// Sentinel for "not statically knowable".
pub const UNKNOWN_LENGTH: i64 = -1;

pub fn infer_output_types(node: &PlanNode) -> Result<Vec<LogicalType>> {
    Ok(node_info(node)?.output_types)
}

pub fn infer_output_length(node: &PlanNode) -> Result<i64> {
    Ok(node_info(node)?.output_length)
}

/// Stable content hash of the plan rooted at `node`.
pub fn plan_hash(node: &PlanNode) -> Result<Hash256> {
    Ok(node_info(node)?.hash)
}

/// Inferred output shape plus hash, cached in the node's sidecar.
pub fn node_info(node: &PlanNode) -> Result<NodeInfo> {
    if let Some(info) = node.cached.get() {
        return Ok(info.clone());
    }
    let info = compute_info(node)?;
    // Another thread may have raced us; either copy is identical.
    let _ = node.cached.set(info.clone());
    Ok(info)
}

fn compute_info(node: &PlanNode) -> Result<NodeInfo> {
    let inputs: Vec<NodeInfo> = node
        .inputs()
        .iter()
        .map(|input| node_info(input))
        .collect::<Result<_>>()?;

    let (output_types, output_length) = match node.kind() {
        OperatorKind::Range => {
            let start = node.int_param("start")?;
            let end = node.int_param("end")?;
            if end < start {
                return Err(Error::Plan(format!(
                    "range end {end} precedes start {start}"
                )));
            }
            (vec![LogicalType::Int], end - start)
        }
        OperatorKind::Scan => {
            let manifest = TableManifest::load(node.str_param("manifest")?)?;
            (manifest.column_types.clone(), manifest.num_rows as i64)
        }
        OperatorKind::Transform => {
            let out = node.type_param("output_type")?;
            (vec![out], inputs[0].output_length)
        }
        OperatorKind::BinaryTransform => {
            let out = node.type_param("output_type")?;
            let len = merged_linear_length(&inputs[0], &inputs[1], node)?;
            (vec![out], len)
        }
        OperatorKind::Project => {
            let indices = node.index_list_param("columns")?;
            let input_types = &inputs[0].output_types;
            let mut types = Vec::with_capacity(indices.len());
            for idx in indices {
                let t = input_types.get(idx).ok_or_else(|| {
                    Error::Plan(format!(
                        "project index {idx} out of range for {} columns",
                        input_types.len()
                    ))
                })?;
                types.push(*t);
            }
            (types, inputs[0].output_length)
        }
        OperatorKind::Union => {
            let mut types = inputs[0].output_types.clone();
            types.extend(&inputs[1].output_types);
            let len = merged_linear_length(&inputs[0], &inputs[1], node)?;
            (types, len)
        }
        OperatorKind::LogicalFilter => {
            (inputs[0].output_types.clone(), UNKNOWN_LENGTH)
        }
        OperatorKind::Reduce => {
            let out = node.type_param("output_type")?;
            (vec![out], UNKNOWN_LENGTH)
        }
    };

    // The node hash covers the kind, scalar params, opaque keys, and the
    // input hashes; opaque payloads are process-local and hash by key only.
    let params_json = serde_json::to_vec(node.params())?;
    let mut chunks: Vec<Vec<u8>> = Vec::with_capacity(3 + inputs.len());
    chunks.push(node.kind().name().as_bytes().to_vec());
    chunks.push(params_json);
    for key in node.opaque_keys() {
        chunks.push(key.as_bytes().to_vec());
    }
    for input in &inputs {
        chunks.push(input.hash.0.to_vec());
    }
    let hash = hash_chunks(chunks.iter().map(|c| c.as_slice()));

    Ok(NodeInfo {
        output_types,
        output_length,
        hash,
    })
}

/// Linear binary operators co-iterate their inputs; statically known lengths
/// must already agree.
fn merged_linear_length(a: &NodeInfo, b: &NodeInfo, node: &PlanNode) -> Result<i64> {
    match (a.output_length, b.output_length) {
        (UNKNOWN_LENGTH, len) | (len, UNKNOWN_LENGTH) => Ok(len),
        (la, lb) if la == lb => Ok(la),
        (la, lb) => Err(Error::Shape(format!(
            "{} inputs have mismatched lengths {la} and {lb}",
            node.kind().name()
        ))),
    }
}
