//! Helper for materializing a columnar table on disk: one block file per
//! column plus a manifest. Every segment boundary starts a new block in every
//! column file, so segments can be decoded independently.

use std::path::{Path, PathBuf};

use quarry_core::error::{Error, Result};
use quarry_core::value::{LogicalType, Value};

use crate::file::BlockFileWriter;
use crate::manifest::{TableManifest, FORMAT_VERSION};

/// Rows per encoded block within a segment.
pub const DEFAULT_ROWS_PER_BLOCK: usize = 4096;

/// One column of a table to be written.
#[derive(Debug, Clone)]
pub struct TableColumn {
    pub name: String,
    pub dtype: LogicalType,
    pub values: Vec<Value>,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, dtype: LogicalType, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            dtype,
            values,
        }
    }
}

/// Write `columns` as a segmented table under `dir`; returns the manifest path.
pub fn write_table(
    dir: impl AsRef<Path>,
    name: &str,
    columns: &[TableColumn],
    segment_rows: &[u64],
    rows_per_block: usize,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    if columns.is_empty() {
        return Err(Error::Manifest("table must have at least one column".to_string()));
    }
    let num_rows = columns[0].values.len() as u64;
    for col in columns {
        if col.values.len() as u64 != num_rows {
            return Err(Error::Shape(format!(
                "column '{}' has {} rows, expected {num_rows}",
                col.name,
                col.values.len()
            )));
        }
    }
    let segment_total: u64 = segment_rows.iter().sum();
    if segment_total != num_rows {
        return Err(Error::Manifest(format!(
            "segment rows sum to {segment_total}, table has {num_rows}"
        )));
    }
    let rows_per_block = rows_per_block.max(1);

    std::fs::create_dir_all(dir)?;

    let mut column_files = Vec::with_capacity(columns.len());
    for col in columns {
        let file_path = dir.join(format!("{name}.{}.qry", col.name));
        let mut writer = BlockFileWriter::create(&file_path)?;

        let mut offset = 0usize;
        for seg_rows in segment_rows {
            let seg_end = offset + *seg_rows as usize;
            while offset < seg_end {
                let block_end = (offset + rows_per_block).min(seg_end);
                writer.write_block(&col.values[offset..block_end])?;
                offset = block_end;
            }
        }
        writer.finish()?;
        column_files.push(file_path);
    }

    let manifest = TableManifest {
        format_version: FORMAT_VERSION,
        num_rows,
        column_names: columns.iter().map(|c| c.name.clone()).collect(),
        column_types: columns.iter().map(|c| c.dtype).collect(),
        column_files,
        segment_rows: segment_rows.to_vec(),
    };
    let manifest_path = dir.join(format!("{name}.manifest"));
    manifest.save(&manifest_path)?;
    tracing::debug!(
        table = name,
        rows = num_rows,
        segments = segment_rows.len(),
        "wrote table"
    );
    Ok(manifest_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BlockCache;
    use crate::cursor::ColumnCursor;
    use crate::file::BlockFileReader;
    use std::sync::Arc;

    #[test]
    fn write_then_scan_by_segment() {
        let dir = std::env::temp_dir().join(format!("quarry-table-test-{}", std::process::id()));
        let ids: Vec<Value> = (0..100).map(Value::Int).collect();
        let scores: Vec<Value> = (0..100).map(|i| Value::Float(i as f64 / 2.0)).collect();

        let manifest_path = write_table(
            &dir,
            "t",
            &[
                TableColumn::new("id", LogicalType::Int, ids.clone()),
                TableColumn::new("score", LogicalType::Float, scores),
            ],
            &[30, 30, 40],
            16,
        )
        .unwrap();

        let manifest = TableManifest::load(&manifest_path).unwrap();
        assert_eq!(manifest.num_segments(), 3);

        let cache = Arc::new(BlockCache::new(64));
        let reader = Arc::new(BlockFileReader::open(&manifest.column_files[0]).unwrap());
        assert_eq!(reader.total_rows(), 100);

        // Middle segment only.
        let (begin, end) = manifest.segment_range(1).unwrap();
        let mut cursor = ColumnCursor::new(reader, cache, begin, end).unwrap();
        let mut out = Vec::new();
        cursor.fill(&mut out, 1000).unwrap();
        assert_eq!(out, ids[30..60].to_vec());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn mismatched_column_lengths_rejected() {
        let dir = std::env::temp_dir().join(format!("quarry-table-bad-{}", std::process::id()));
        let err = write_table(
            &dir,
            "t",
            &[
                TableColumn::new("a", LogicalType::Int, vec![Value::Int(1)]),
                TableColumn::new("b", LogicalType::Int, vec![]),
            ],
            &[1],
            16,
        );
        assert!(err.is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
