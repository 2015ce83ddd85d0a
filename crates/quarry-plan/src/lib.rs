#![forbid(unsafe_code)]
//! quarry-plan: the serializable logical plan layer.
//!
//! Plans are immutable, `Arc`-shared DAGs of `PlanNode`s. The generic driver
//! never inspects a node's parameters directly; it round-trips a node through
//! the owning operator kind's constructor and inference functions, which is
//! what lets a plan be serialized, cached, or rewritten by an external
//! optimizer without linking against the executor.

pub mod hash;
pub mod infer;
pub mod node;
pub mod serialize;

pub use hash::Hash256;
pub use infer::{infer_output_length, infer_output_types, plan_hash, UNKNOWN_LENGTH};
pub use node::{
    make_plan_node, KindAttributes, NodeRef, OpaqueParam, OperatorKind, PlanNode, ShapeClass,
    RESERVED_PREFIX,
};
pub use serialize::{deserialize_plan, plan_from_json, plan_to_json, serialize_plan, FlatNode, PlanDoc};
