#![forbid(unsafe_code)]
//! quarry-exec: the segment-parallel query driver.
//!
//! The driver clones one operator tree per segment, fans the clones out over
//! a rayon pool, and stitches the per-segment outputs back together in
//! segment order. Reductions get one extra merge step: segment workers emit
//! partial aggregator states, and the driver folds those into the final row.

pub mod engine;
pub mod segments;

pub use engine::{QueryEngine, QueryOutput};
pub use segments::{plan_segments, source_domain, SourceDomain};
