#![forbid(unsafe_code)]
//! quarry-core: values, logical types, copy-on-write row batches, configs,
//! strongly-typed ids, and the canonical error type.
//!
//! Design intent:
//! - Keep this crate pure and synchronous (no async, no IO).
//! - Everything here is shared by every other quarry crate; keep it lean.

pub mod batch;
pub mod config;
pub mod error;
pub mod id;
pub mod prelude;
pub mod value;

pub use error::{Error, Result};

/// Engine version string for provenance (manifests, tracing).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
