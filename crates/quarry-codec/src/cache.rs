//! Weak-reference block cache with amortized sweeping.
//!
//! The cache index holds `Weak` handles; strong references live only with
//! active consumers, so an entry is physically dropped when its last consumer
//! releases it. Expired weak entries are swept every N accesses rather than
//! on every access.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use quarry_core::error::Result;
use quarry_core::id::BlockIndex;

use crate::file::LoadedBlock;

/// Identifies one block within one column file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub file: PathBuf,
    pub block: BlockIndex,
}

pub struct BlockCache {
    // Lookups and insertions are mutually exclusive; decode work never
    // happens under this lock.
    index: Mutex<HashMap<BlockKey, Weak<LoadedBlock>>>,
    accesses: AtomicUsize,
    sweep_interval: usize,
}

impl BlockCache {
    pub fn new(sweep_interval: usize) -> Self {
        Self {
            index: Mutex::new(HashMap::new()),
            accesses: AtomicUsize::new(0),
            sweep_interval: sweep_interval.max(1),
        }
    }

    /// Fetch the block for `key`, loading it via `load` on a miss. The strong
    /// handle returned keeps the entry alive; the cache itself never does.
    ///
    /// The load runs without the index lock, so two segments missing the same
    /// key concurrently may both load it; the insert re-checks and the loser
    /// defers to the entry already present.
    pub fn get_or_load(
        &self,
        key: BlockKey,
        load: impl FnOnce() -> Result<LoadedBlock>,
    ) -> Result<Arc<LoadedBlock>> {
        let accesses = self.accesses.fetch_add(1, Ordering::Relaxed) + 1;

        {
            let mut index = self.index.lock().expect("block cache poisoned");
            if accesses % self.sweep_interval == 0 {
                let before = index.len();
                index.retain(|_, weak| weak.strong_count() > 0);
                tracing::trace!(
                    swept = before - index.len(),
                    live = index.len(),
                    "block cache sweep"
                );
            }
            if let Some(block) = index.get(&key).and_then(Weak::upgrade) {
                return Ok(block);
            }
        }

        let block = Arc::new(load()?);
        let mut index = self.index.lock().expect("block cache poisoned");
        if let Some(existing) = index.get(&key).and_then(Weak::upgrade) {
            return Ok(existing);
        }
        index.insert(key, Arc::downgrade(&block));
        Ok(block)
    }

    /// Number of index entries, including not-yet-swept expired ones.
    pub fn len(&self) -> usize {
        self.index.lock().expect("block cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired weak entry immediately (test/maintenance hook).
    pub fn sweep_now(&self) {
        let mut index = self.index.lock().expect("block cache poisoned");
        index.retain(|_, weak| weak.strong_count() > 0);
    }
}
