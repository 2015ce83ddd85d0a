//! Convenient re-exports for downstream crates.

pub use crate::batch::{ColumnArray, RowBatch};
pub use crate::config::EngineConfig;
pub use crate::error::{Error, Result};
pub use crate::id::BlockIndex;
pub use crate::value::{LogicalType, Value};
