//! Stable hashing for plan nodes.

use blake3::Hasher;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{:02x}", b);
        }
        s
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Hash a sequence of byte chunks with length framing, so that chunk
/// boundaries cannot be shifted to forge a collision.
pub fn hash_chunks<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> Hash256 {
    let mut h = Hasher::new();
    for chunk in chunks {
        h.update(&(chunk.len() as u64).to_le_bytes());
        h.update(chunk);
    }
    Hash256(h.finalize().into())
}
