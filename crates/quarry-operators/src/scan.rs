//! Table scan source: streams a manifest's columns for one segment.
//!
//! Readers and the block cache are shared across segment clones; the cursors
//! (and with them any in-flight block decode) are per segment.

use std::sync::Arc;

use quarry_codec::cache::BlockCache;
use quarry_codec::cursor::ColumnCursor;
use quarry_codec::file::BlockFileReader;
use quarry_codec::manifest::TableManifest;
use quarry_core::batch::{ColumnArray, RowBatch};
use quarry_core::error::{Error, Result};

use crate::context::{ExecutionContext, Operator};

pub struct ScanSource {
    manifest: Arc<TableManifest>,
    readers: Vec<Arc<BlockFileReader>>,
    cache: Arc<BlockCache>,
    cursors: Option<Vec<ColumnCursor>>,
    started: bool,
}

impl ScanSource {
    /// Opens every column file up front so shape errors surface at build
    /// time, not mid-query.
    pub fn open(manifest: Arc<TableManifest>, cache: Arc<BlockCache>) -> Result<Self> {
        let mut readers = Vec::with_capacity(manifest.column_files.len());
        for path in &manifest.column_files {
            let reader = BlockFileReader::open(path)?;
            if reader.total_rows() != manifest.num_rows {
                return Err(Error::Manifest(format!(
                    "column file {} holds {} rows, manifest declares {}",
                    path.display(),
                    reader.total_rows(),
                    manifest.num_rows
                )));
            }
            readers.push(Arc::new(reader));
        }
        Ok(Self {
            manifest,
            readers,
            cache,
            cursors: None,
            started: false,
        })
    }
}

impl Operator for ScanSource {
    fn name(&self) -> &'static str {
        "scan"
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        if !self.started {
            let seg = ctx.segment();
            if seg.row_end > self.manifest.num_rows {
                return Err(Error::Shape(format!(
                    "segment rows {}..{} exceed table rows {}",
                    seg.row_begin, seg.row_end, self.manifest.num_rows
                )));
            }
            let cursors = self
                .readers
                .iter()
                .map(|r| {
                    ColumnCursor::new(
                        Arc::clone(r),
                        Arc::clone(&self.cache),
                        seg.row_begin,
                        seg.row_end,
                    )
                })
                .collect::<Result<Vec<_>>>()?;
            tracing::debug!(
                segment = seg.index,
                rows = seg.num_rows(),
                columns = self.readers.len(),
                "scan segment start"
            );
            self.cursors = Some(cursors);
            self.started = true;
        }

        let Some(cursors) = self.cursors.as_mut() else {
            return Ok(());
        };

        let want = ctx.block_size();
        let mut columns = Vec::with_capacity(cursors.len());
        let mut produced: Option<usize> = None;
        for cursor in cursors.iter_mut() {
            let mut values = Vec::with_capacity(want);
            let got = cursor.fill(&mut values, want)?;
            if let Some(prev) = produced {
                if got != prev {
                    return Err(Error::Decode(format!(
                        "column files disagree on row count ({prev} vs {got})"
                    )));
                }
            }
            produced = Some(got);
            columns.push(ColumnArray::from_values(values));
        }

        if produced.unwrap_or(0) == 0 {
            // Segment drained; drop the cursors so held blocks release.
            self.cursors = None;
            return Ok(());
        }
        ctx.emit(RowBatch::new(columns)?)
    }

    fn clone_for_segment(&self) -> Box<dyn Operator> {
        Box::new(ScanSource {
            manifest: Arc::clone(&self.manifest),
            readers: self.readers.iter().map(Arc::clone).collect(),
            cache: Arc::clone(&self.cache),
            cursors: None,
            started: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{OperatorTree, SegmentSpec};
    use quarry_codec::table::{write_table, TableColumn};
    use quarry_core::value::{LogicalType, Value};
    use std::path::PathBuf;

    fn make_table(name: &str, rows: u64, segment_rows: &[u64]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("quarry-scan-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let ints: Vec<Value> = (0..rows as i64).map(Value::Int).collect();
        let strs: Vec<Value> = (0..rows).map(|i| Value::Str(format!("r{i}"))).collect();
        write_table(
            &dir,
            name,
            &[
                TableColumn::new("id", LogicalType::Int, ints),
                TableColumn::new("label", LogicalType::Str, strs),
            ],
            segment_rows,
            16,
        )
        .unwrap()
    }

    fn scan_tree(manifest_path: &PathBuf, block_size: usize) -> OperatorTree {
        let manifest = Arc::new(TableManifest::load(manifest_path).unwrap());
        let types = manifest.column_types.clone();
        let op = ScanSource::open(manifest, Arc::new(BlockCache::new(64))).unwrap();
        OperatorTree::new(Box::new(op), vec![], types, block_size)
    }

    #[test]
    fn scans_whole_table() {
        let path = make_table("whole", 50, &[50]);
        let mut tree = scan_tree(&path, 8);
        let batches = tree.run_to_completion(SegmentSpec::whole(50)).unwrap();
        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 50);
        assert_eq!(batches[0].row(0), vec![Value::Int(0), Value::Str("r0".into())]);
    }

    #[test]
    fn scans_one_segment_of_many() {
        let path = make_table("seg", 60, &[20, 20, 20]);
        let mut tree = scan_tree(&path, 7);
        let seg = SegmentSpec {
            index: 1,
            num_segments: 3,
            row_begin: 20,
            row_end: 40,
        };
        let batches = tree.run_to_completion(seg).unwrap();
        let ids: Vec<i64> = batches
            .iter()
            .flat_map(|b| b.columns()[0].values().iter())
            .map(|v| v.as_int().unwrap())
            .collect();
        assert_eq!(ids, (20..40).collect::<Vec<_>>());
    }

    #[test]
    fn out_of_range_segment_errors() {
        let path = make_table("oob", 10, &[10]);
        let mut tree = scan_tree(&path, 4);
        let seg = SegmentSpec {
            index: 0,
            num_segments: 1,
            row_begin: 0,
            row_end: 11,
        };
        assert!(tree.run_to_completion(seg).is_err());
    }
}
