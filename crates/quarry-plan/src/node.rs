//! Logical plan nodes: immutable, shared, serializable DAG vertices.
//!
//! A node records which operator kind runs, its scalar parameters, any
//! process-local opaque parameters (closures), and its input nodes. Nodes are
//! never mutated once constructed; rewriting a plan means cloning nodes with
//! replaced fields.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use quarry_core::error::{Error, Result};
use quarry_core::value::{LogicalType, Value};

use crate::hash::Hash256;

/// Scalar parameter keys starting with this prefix are engine-private
/// (memoization, type caches) and are rejected from callers.
pub const RESERVED_PREFIX: &str = "__qy";

pub type NodeRef = Arc<PlanNode>;

/// How an operator's output row count relates to its input(s).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShapeClass {
    /// Accepts 0 inputs and manufactures rows.
    Source,
    /// Preserves row count 1:1 against its designated input.
    Linear,
    /// May consume many rows and emit fewer.
    SubLinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindAttributes {
    pub shape: ShapeClass,
    pub arity: usize,
}

/// The closed set of operator kinds the engine can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorKind {
    Range,
    Scan,
    Transform,
    BinaryTransform,
    Project,
    Union,
    LogicalFilter,
    Reduce,
}

impl OperatorKind {
    pub fn attributes(self) -> KindAttributes {
        use OperatorKind::*;
        match self {
            Range | Scan => KindAttributes {
                shape: ShapeClass::Source,
                arity: 0,
            },
            Transform | Project => KindAttributes {
                shape: ShapeClass::Linear,
                arity: 1,
            },
            BinaryTransform | Union => KindAttributes {
                shape: ShapeClass::Linear,
                arity: 2,
            },
            LogicalFilter => KindAttributes {
                shape: ShapeClass::SubLinear,
                arity: 2,
            },
            Reduce => KindAttributes {
                shape: ShapeClass::SubLinear,
                arity: 1,
            },
        }
    }

    pub fn name(self) -> &'static str {
        use OperatorKind::*;
        match self {
            Range => "range",
            Scan => "scan",
            Transform => "transform",
            BinaryTransform => "binary_transform",
            Project => "project",
            Union => "union",
            LogicalFilter => "logical_filter",
            Reduce => "reduce",
        }
    }
}

/// Process-local parameters (closures). Never serialized; plans that carry
/// them refuse serialization.
#[derive(Clone)]
pub enum OpaqueParam {
    UnaryFn(Arc<dyn Fn(&Value) -> Value + Send + Sync>),
    BinaryFn(Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>),
}

impl fmt::Debug for OpaqueParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpaqueParam::UnaryFn(_) => write!(f, "UnaryFn(..)"),
            OpaqueParam::BinaryFn(_) => write!(f, "BinaryFn(..)"),
        }
    }
}

/// Lazily-computed sidecar: inferred output shape and the stable node hash.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub output_types: Vec<LogicalType>,
    pub output_length: i64,
    pub hash: Hash256,
}

pub struct PlanNode {
    kind: OperatorKind,
    params: BTreeMap<String, Value>,
    opaque: HashMap<String, OpaqueParam>,
    inputs: Vec<NodeRef>,
    pub(crate) cached: OnceLock<NodeInfo>,
}

impl fmt::Debug for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlanNode")
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("opaque", &self.opaque)
            .field("inputs", &self.inputs.len())
            .finish()
    }
}

/// Structural equality over kind, params, opaque keys, and inputs.
impl PartialEq for PlanNode {
    fn eq(&self, other: &Self) -> bool {
        if self.kind != other.kind || self.params != other.params {
            return false;
        }
        let mut mine: Vec<&String> = self.opaque.keys().collect();
        let mut theirs: Vec<&String> = other.opaque.keys().collect();
        mine.sort();
        theirs.sort();
        if mine != theirs {
            return false;
        }
        self.inputs.len() == other.inputs.len()
            && self
                .inputs
                .iter()
                .zip(&other.inputs)
                .all(|(a, b)| a.as_ref() == b.as_ref())
    }
}

/// Build a plan node, validating arity and the reserved key prefix.
pub fn make_plan_node(
    kind: OperatorKind,
    params: BTreeMap<String, Value>,
    opaque: HashMap<String, OpaqueParam>,
    inputs: Vec<NodeRef>,
) -> Result<NodeRef> {
    let attrs = kind.attributes();
    if inputs.len() != attrs.arity {
        return Err(Error::Plan(format!(
            "{} expects {} inputs, got {}",
            kind.name(),
            attrs.arity,
            inputs.len()
        )));
    }
    for key in params.keys().chain(opaque.keys()) {
        if key.starts_with(RESERVED_PREFIX) {
            return Err(Error::Plan(format!(
                "parameter key {key:?} uses the engine-private prefix {RESERVED_PREFIX:?}"
            )));
        }
    }
    Ok(Arc::new(PlanNode {
        kind,
        params,
        opaque,
        inputs,
        cached: OnceLock::new(),
    }))
}

impl PlanNode {
    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    pub fn inputs(&self) -> &[NodeRef] {
        &self.inputs
    }

    pub fn input(&self, idx: usize) -> Result<&NodeRef> {
        self.inputs.get(idx).ok_or_else(|| {
            Error::Plan(format!(
                "{} has no input slot {idx}",
                self.kind.name()
            ))
        })
    }

    pub fn has_opaque(&self) -> bool {
        !self.opaque.is_empty()
    }

    /// Opaque parameter keys in sorted order.
    pub fn opaque_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.opaque.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Clone this node with a replaced input list (plan rewriting; shared
    /// nodes are never mutated in place).
    pub fn with_inputs(&self, inputs: Vec<NodeRef>) -> Result<NodeRef> {
        make_plan_node(self.kind, self.params.clone(), self.opaque.clone(), inputs)
    }

    // --- parameter accessors; all failures are construction errors ---

    fn missing(&self, key: &str) -> Error {
        Error::Plan(format!(
            "{} node is missing parameter {key:?}",
            self.kind.name()
        ))
    }

    pub fn int_param(&self, key: &str) -> Result<i64> {
        match self.params.get(key) {
            Some(Value::Int(v)) => Ok(*v),
            Some(other) => Err(Error::Plan(format!(
                "{} parameter {key:?} should be an int, got {other:?}",
                self.kind.name()
            ))),
            None => Err(self.missing(key)),
        }
    }

    pub fn str_param(&self, key: &str) -> Result<&str> {
        match self.params.get(key) {
            Some(Value::Str(s)) => Ok(s),
            Some(other) => Err(Error::Plan(format!(
                "{} parameter {key:?} should be a string, got {other:?}",
                self.kind.name()
            ))),
            None => Err(self.missing(key)),
        }
    }

    /// A comma-separated index list, e.g. project's `columns`.
    pub fn index_list_param(&self, key: &str) -> Result<Vec<usize>> {
        let raw = self.str_param(key)?;
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<usize>().map_err(|_| {
                    Error::Plan(format!(
                        "{} parameter {key:?} has non-index entry {s:?}",
                        self.kind.name()
                    ))
                })
            })
            .collect()
    }

    pub fn type_param(&self, key: &str) -> Result<LogicalType> {
        self.str_param(key)?.parse()
    }

    pub fn opaque_param(&self, key: &str) -> Result<&OpaqueParam> {
        self.opaque.get(key).ok_or_else(|| {
            Error::Plan(format!(
                "{} node is missing opaque parameter {key:?}",
                self.kind.name()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn range(start: i64, end: i64) -> NodeRef {
        make_plan_node(
            OperatorKind::Range,
            params(&[("start", Value::Int(start)), ("end", Value::Int(end))]),
            HashMap::new(),
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn arity_is_enforced() {
        let r = range(0, 10);
        let err = make_plan_node(
            OperatorKind::BinaryTransform,
            BTreeMap::new(),
            HashMap::new(),
            vec![r],
        );
        assert!(matches!(err, Err(Error::Plan(_))));
    }

    #[test]
    fn reserved_prefix_rejected() {
        let err = make_plan_node(
            OperatorKind::Range,
            params(&[("__qy_cache", Value::Int(0))]),
            HashMap::new(),
            vec![],
        );
        assert!(matches!(err, Err(Error::Plan(_))));
    }

    #[test]
    fn structural_equality_follows_shared_inputs() {
        let shared = range(0, 5);
        let a = make_plan_node(
            OperatorKind::Union,
            BTreeMap::new(),
            HashMap::new(),
            vec![Arc::clone(&shared), Arc::clone(&shared)],
        )
        .unwrap();
        let b = make_plan_node(
            OperatorKind::Union,
            BTreeMap::new(),
            HashMap::new(),
            vec![range(0, 5), range(0, 5)],
        )
        .unwrap();
        assert_eq!(a.as_ref(), b.as_ref());
    }

    #[test]
    fn param_accessors_report_kind_and_key() {
        let r = range(0, 5);
        assert_eq!(r.int_param("start").unwrap(), 0);
        let err = r.int_param("step").unwrap_err();
        assert!(err.to_string().contains("step"));
    }
}
