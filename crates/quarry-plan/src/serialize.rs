//! Plan (de)serialization.
//!
//! A plan serializes as a flat node list in dependency order plus a root
//! index. Diamond-shaped DAGs stay diamonds: a node reachable twice appears
//! once in the list and twice in input lists, and deserialization rebuilds the
//! same sharing. Plans carrying opaque (closure) parameters refuse to
//! serialize, since there is no portable representation for them.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use quarry_core::error::{Error, Result};
use quarry_core::value::Value;

use crate::node::{make_plan_node, NodeRef, OperatorKind, PlanNode};

pub const DOC_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatNode {
    pub kind: OperatorKind,
    pub params: BTreeMap<String, Value>,
    /// Indices into the document's node list; always smaller than this
    /// node's own index.
    pub inputs: Vec<usize>,
}

/// The portable form of a plan DAG.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDoc {
    pub version: u32,
    pub nodes: Vec<FlatNode>,
    pub root: usize,
}

pub fn serialize_plan(root: &NodeRef) -> Result<PlanDoc> {
    let mut ids: HashMap<*const PlanNode, usize> = HashMap::new();
    let mut nodes = Vec::new();
    let root_id = flatten(root, &mut ids, &mut nodes)?;
    Ok(PlanDoc {
        version: DOC_VERSION,
        nodes,
        root: root_id,
    })
}

fn flatten(
    node: &NodeRef,
    ids: &mut HashMap<*const PlanNode, usize>,
    nodes: &mut Vec<FlatNode>,
) -> Result<usize> {
    let ptr = Arc::as_ptr(node);
    if let Some(&id) = ids.get(&ptr) {
        return Ok(id);
    }
    if node.has_opaque() {
        return Err(Error::Plan(format!(
            "{} node carries opaque parameters and cannot be serialized",
            node.kind().name()
        )));
    }
    let inputs = node
        .inputs()
        .iter()
        .map(|input| flatten(input, ids, nodes))
        .collect::<Result<Vec<_>>>()?;
    let id = nodes.len();
    nodes.push(FlatNode {
        kind: node.kind(),
        params: node.params().clone(),
        inputs,
    });
    ids.insert(ptr, id);
    Ok(id)
}

pub fn deserialize_plan(doc: &PlanDoc) -> Result<NodeRef> {
    if doc.version != DOC_VERSION {
        return Err(Error::Plan(format!(
            "unsupported plan document version {}",
            doc.version
        )));
    }
    let mut built: Vec<NodeRef> = Vec::with_capacity(doc.nodes.len());
    for (idx, flat) in doc.nodes.iter().enumerate() {
        let inputs = flat
            .inputs
            .iter()
            .map(|&i| {
                if i >= idx {
                    return Err(Error::Plan(format!(
                        "plan document node {idx} references forward input {i}"
                    )));
                }
                Ok(Arc::clone(&built[i]))
            })
            .collect::<Result<Vec<_>>>()?;
        built.push(make_plan_node(
            flat.kind,
            flat.params.clone(),
            HashMap::new(),
            inputs,
        )?);
    }
    built
        .get(doc.root)
        .cloned()
        .ok_or_else(|| Error::Plan(format!("plan document root {} out of range", doc.root)))
}

pub fn plan_to_json(root: &NodeRef) -> Result<String> {
    let doc = serialize_plan(root)?;
    Ok(serde_json::to_string_pretty(&doc)?)
}

pub fn plan_from_json(text: &str) -> Result<NodeRef> {
    let doc: PlanDoc = serde_json::from_str(text)?;
    deserialize_plan(&doc)
}
