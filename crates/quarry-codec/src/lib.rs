#![forbid(unsafe_code)]
//! quarry-codec: the on-disk encoded block layer.
//!
//! Design intent:
//! - `block` encodes/decodes one contiguous run of column values; decoding is
//!   a restartable state machine so long blocks can be consumed incrementally
//!   and torn down mid-decode.
//! - `file` is the `{header}{payload}` record layout with random access.
//! - `manifest` consumes the key/value table manifest (the engine does not
//!   own its format).
//! - `cache` is the weak-reference block cache with amortized sweeping.
//! - `cursor` streams one column's row range across block boundaries.
//!
//! No implicit caching happens inside the codec itself; released blocks drop
//! their buffers immediately.

pub mod block;
pub mod cache;
pub mod cursor;
pub mod file;
pub mod manifest;
pub mod table;

pub use block::{decode, decode_range, encode, BlockInfo, DecodeHandle, EncodingKind};
pub use cache::{BlockCache, BlockKey};
pub use cursor::ColumnCursor;
pub use file::{BlockFileReader, BlockFileWriter, LoadedBlock};
pub use manifest::TableManifest;
pub use table::{write_table, TableColumn};
