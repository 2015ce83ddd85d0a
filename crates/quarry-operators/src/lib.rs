#![forbid(unsafe_code)]
//! quarry-operators: the physical operator layer.
//!
//! Design intent:
//! - Operators are pull-based and synchronous. Each `execute` call produces
//!   one slice of output and suspends; the tree buffers batches between
//!   operators so producers and consumers need not agree on pacing.
//! - Operators are segment-oblivious: the same tree runs any segment, and
//!   `clone_for_segment` stamps out fresh per-segment state.
//! - Column data moves by `Arc` handle; projection and fan-out never copy.

pub mod aggregate;
pub mod build;
pub mod context;
pub mod filter;
pub mod instantiate;
pub mod project;
pub mod range;
pub mod reduce;
pub mod scan;
pub mod transform;
pub mod union;

pub use aggregate::{AggregatorRegistry, GroupAggregator};
pub use context::{ExecutionContext, Operator, OperatorTree, SegmentSpec};
pub use instantiate::{build_tree, instantiate, OperatorEnv};
pub use transform::{BinaryFn, UnaryFn};
