//! Streams one column's row range across block boundaries.
//!
//! The cursor holds a strong cache handle only for the block it is currently
//! decoding; finished blocks are released immediately. Abandoning a cursor
//! mid-block goes through the decode state machine's terminate path.

use std::sync::Arc;

use quarry_core::error::{Error, Result};
use quarry_core::id::BlockIndex;
use quarry_core::value::Value;

use crate::block::{decode_step, skip_step, DecodeProgress, ResumeTag};
use crate::cache::{BlockCache, BlockKey};
use crate::file::{BlockFileReader, LoadedBlock};

/// A restartable decoder that owns its block handle (unlike the borrowing
/// `DecodeHandle`), so it can live inside a long-lived cursor.
struct OwnedDecoder {
    block: Arc<LoadedBlock>,
    progress: DecodeProgress,
}

impl OwnedDecoder {
    fn new(block: Arc<LoadedBlock>) -> Self {
        Self {
            block,
            progress: DecodeProgress::new(),
        }
    }

    fn remaining(&self) -> u64 {
        if self.progress.is_done() {
            0
        } else {
            self.block.info.element_count - self.progress.produced
        }
    }

    fn fill(&mut self, out: &mut Vec<Value>, n: usize) -> Result<usize> {
        let mut produced = 0;
        while produced < n {
            match decode_step(&self.block.info, &self.block.bytes, &mut self.progress)? {
                Some(v) => {
                    out.push(v);
                    produced += 1;
                }
                None => break,
            }
        }
        Ok(produced)
    }

    fn skip(&mut self, n: usize) -> Result<usize> {
        let mut skipped = 0;
        while skipped < n {
            if !skip_step(&self.block.info, &self.block.bytes, &mut self.progress)? {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }

    fn terminate(&mut self) {
        if !self.progress.is_done() {
            tracing::trace!(
                produced = self.progress.produced,
                of = self.block.info.element_count,
                "terminating block decode early"
            );
        }
        self.progress.tag = ResumeTag::Done;
    }
}

impl Drop for OwnedDecoder {
    fn drop(&mut self) {
        // A consumer abandoning the cursor before end-of-stream must unwind
        // the in-flight decode explicitly rather than leak its state.
        self.terminate();
    }
}

/// Streams `[row_begin, row_end)` of one column file.
pub struct ColumnCursor {
    reader: Arc<BlockFileReader>,
    cache: Arc<BlockCache>,
    next_block: usize,
    pending_skip: u64,
    rows_left: u64,
    current: Option<OwnedDecoder>,
}

impl ColumnCursor {
    pub fn new(
        reader: Arc<BlockFileReader>,
        cache: Arc<BlockCache>,
        row_begin: u64,
        row_end: u64,
    ) -> Result<Self> {
        if row_begin > row_end || row_end > reader.total_rows() {
            return Err(Error::Shape(format!(
                "row range {row_begin}..{row_end} out of bounds for {} rows in {}",
                reader.total_rows(),
                reader.path().display()
            )));
        }

        let (next_block, pending_skip) = if row_begin == row_end {
            (reader.num_blocks(), 0)
        } else {
            // row_begin < total_rows here, so the block lookup succeeds.
            let block = reader
                .block_containing(row_begin)
                .ok_or_else(|| Error::Invariant("row range check failed".to_string()))?;
            let first = reader
                .first_row(block)
                .ok_or_else(|| Error::Invariant("missing block entry".to_string()))?;
            (block, row_begin - first)
        };

        Ok(Self {
            reader,
            cache,
            next_block,
            pending_skip,
            rows_left: row_end - row_begin,
            current: None,
        })
    }

    /// Rows not yet produced.
    pub fn remaining(&self) -> u64 {
        self.rows_left
    }

    /// Decode up to `n` rows into `out`, crossing block boundaries as needed.
    /// Short only when the row range is exhausted.
    pub fn fill(&mut self, out: &mut Vec<Value>, n: usize) -> Result<usize> {
        let mut produced = 0usize;
        while produced < n && self.rows_left > 0 {
            if self.current.is_none() {
                let block = self.next_block;
                let loaded = self.cache.get_or_load(
                    BlockKey {
                        file: self.reader.path().to_path_buf(),
                        block: BlockIndex::new(block as u64),
                    },
                    || self.reader.load_block(block),
                )?;
                let mut decoder = OwnedDecoder::new(loaded);
                if self.pending_skip > 0 {
                    decoder.skip(self.pending_skip as usize)?;
                    self.pending_skip = 0;
                }
                self.current = Some(decoder);
            }

            let decoder = self.current.as_mut().expect("decoder just installed");
            let want = (n - produced).min(self.rows_left as usize);
            let got = decoder.fill(out, want)?;
            produced += got;
            self.rows_left -= got as u64;

            if decoder.remaining() == 0 {
                self.current = None;
                self.next_block += 1;
            } else if got == 0 {
                return Err(Error::Decode(format!(
                    "block decode stalled in {}",
                    self.reader.path().display()
                )));
            }
        }
        Ok(produced)
    }

    /// Abandon the cursor: unwind any in-flight decode and release the block.
    pub fn terminate(&mut self) {
        if let Some(mut decoder) = self.current.take() {
            decoder.terminate();
        }
        self.rows_left = 0;
        self.next_block = self.reader.num_blocks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::BlockFileWriter;
    use std::path::PathBuf;

    fn write_column(name: &str, blocks: &[Vec<i64>]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("quarry-cursor-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut writer = BlockFileWriter::create(&path).unwrap();
        for block in blocks {
            let values: Vec<Value> = block.iter().map(|v| Value::Int(*v)).collect();
            writer.write_block(&values).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    #[test]
    fn fill_crosses_block_boundaries() {
        let path = write_column(
            "cross.qry",
            &[(0..40).collect(), (40..80).collect(), (80..100).collect()],
        );
        let reader = Arc::new(BlockFileReader::open(&path).unwrap());
        let cache = Arc::new(BlockCache::new(64));

        let mut cursor = ColumnCursor::new(reader, cache, 0, 100).unwrap();
        let mut out = Vec::new();
        // Odd batch size forces mid-block suspension and resumption.
        while cursor.fill(&mut out, 7).unwrap() > 0 {}
        let expected: Vec<Value> = (0..100).map(Value::Int).collect();
        assert_eq!(out, expected);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn range_skips_into_first_block() {
        let path = write_column("skip.qry", &[(0..50).collect(), (50..90).collect()]);
        let reader = Arc::new(BlockFileReader::open(&path).unwrap());
        let cache = Arc::new(BlockCache::new(64));

        let mut cursor = ColumnCursor::new(reader, cache, 35, 60).unwrap();
        let mut out = Vec::new();
        let got = cursor.fill(&mut out, 1000).unwrap();
        assert_eq!(got, 25);
        let expected: Vec<Value> = (35..60).map(Value::Int).collect();
        assert_eq!(out, expected);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn terminate_releases_block() {
        let path = write_column("term.qry", &[(0..64).collect()]);
        let reader = Arc::new(BlockFileReader::open(&path).unwrap());
        let cache = Arc::new(BlockCache::new(1024));

        let mut cursor = ColumnCursor::new(reader, Arc::clone(&cache), 0, 64).unwrap();
        let mut out = Vec::new();
        cursor.fill(&mut out, 10).unwrap();
        cursor.terminate();
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(cursor.fill(&mut out, 10).unwrap(), 0);

        // The cursor held the only strong handle; the entry is expired now.
        cache.sweep_now();
        assert_eq!(cache.len(), 0);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn empty_range_is_fine() {
        let path = write_column("empty.qry", &[(0..10).collect()]);
        let reader = Arc::new(BlockFileReader::open(&path).unwrap());
        let cache = Arc::new(BlockCache::new(64));
        let mut cursor = ColumnCursor::new(reader, cache, 10, 10).unwrap();
        let mut out = Vec::new();
        assert_eq!(cursor.fill(&mut out, 5).unwrap(), 0);
        std::fs::remove_file(&path).unwrap();
    }
}
