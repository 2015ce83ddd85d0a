//! Table manifest consumption.
//!
//! The manifest is a key/value text file owned by the storage layer; the
//! engine only parses it to resolve which block files back which column and
//! how the table's rows are segmented. Segments align with block boundaries
//! in every column file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use quarry_core::error::{Error, Result};
use quarry_core::value::LogicalType;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct TableManifest {
    pub format_version: u32,
    pub num_rows: u64,
    pub column_names: Vec<String>,
    /// Declared logical type per column.
    pub column_types: Vec<LogicalType>,
    /// Per-column block file paths, resolved against the manifest location.
    pub column_files: Vec<PathBuf>,
    /// Row count per segment, in segment order.
    pub segment_rows: Vec<u64>,
}

fn parse_type(s: &str) -> Result<LogicalType> {
    s.parse::<LogicalType>()
        .map_err(|_| Error::Manifest(format!("unknown column type {s:?}")))
}

impl TableManifest {
    pub fn num_columns(&self) -> usize {
        self.column_names.len()
    }

    pub fn num_segments(&self) -> usize {
        self.segment_rows.len()
    }

    /// Absolute `[begin, end)` row range of segment `idx`.
    pub fn segment_range(&self, idx: usize) -> Option<(u64, u64)> {
        if idx >= self.segment_rows.len() {
            return None;
        }
        let begin: u64 = self.segment_rows[..idx].iter().sum();
        Some((begin, begin + self.segment_rows[idx]))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|n| n == name)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let mut pairs: HashMap<&str, &str> = HashMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::Manifest(format!("malformed manifest line: {line:?}"))
            })?;
            pairs.insert(key.trim(), value.trim());
        }

        let get = |key: &str| -> Result<&str> {
            pairs
                .get(key)
                .copied()
                .ok_or_else(|| Error::Manifest(format!("missing manifest key '{key}'")))
        };

        let format_version: u32 = get("format_version")?
            .parse()
            .map_err(|_| Error::Manifest("format_version is not an integer".to_string()))?;
        if format_version != FORMAT_VERSION {
            return Err(Error::Manifest(format!(
                "unsupported manifest format version {format_version}"
            )));
        }

        let num_columns: usize = get("num_columns")?
            .parse()
            .map_err(|_| Error::Manifest("num_columns is not an integer".to_string()))?;
        let num_rows: u64 = get("num_rows")?
            .parse()
            .map_err(|_| Error::Manifest("num_rows is not an integer".to_string()))?;

        let column_names: Vec<String> = split_list(get("column_names")?)
            .map(str::to_string)
            .collect();
        let column_types: Vec<LogicalType> = split_list(get("column_types")?)
            .map(parse_type)
            .collect::<Result<_>>()?;
        let column_files: Vec<PathBuf> = split_list(get("column_files")?)
            .map(|f| {
                let p = PathBuf::from(f);
                if p.is_absolute() {
                    p
                } else {
                    base.join(p)
                }
            })
            .collect();
        let segment_rows: Vec<u64> = split_list(get("segment_rows")?)
            .map(|s| {
                s.parse::<u64>()
                    .map_err(|_| Error::Manifest(format!("bad segment row count {s:?}")))
            })
            .collect::<Result<_>>()?;

        let manifest = Self {
            format_version,
            num_rows,
            column_names,
            column_types,
            column_files,
            segment_rows,
        };

        if manifest.column_types.len() != num_columns {
            return Err(Error::Manifest(format!(
                "num_columns is {num_columns} but {} column types listed",
                manifest.column_types.len()
            )));
        }
        if manifest.column_names.len() != num_columns {
            return Err(Error::Manifest(format!(
                "num_columns is {num_columns} but {} column names listed",
                manifest.column_names.len()
            )));
        }
        if manifest.column_files.len() != num_columns {
            return Err(Error::Manifest(format!(
                "num_columns is {num_columns} but {} column files listed",
                manifest.column_files.len()
            )));
        }
        let segment_total: u64 = manifest.segment_rows.iter().sum();
        if segment_total != num_rows {
            return Err(Error::Manifest(format!(
                "segment rows sum to {segment_total}, expected {num_rows}"
            )));
        }

        Ok(manifest)
    }

    /// Write a manifest next to its column files (file-name components only).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = String::new();
        out.push_str("# quarry table manifest\n");
        out.push_str(&format!("format_version={}\n", self.format_version));
        out.push_str(&format!("num_columns={}\n", self.num_columns()));
        out.push_str(&format!("num_rows={}\n", self.num_rows));
        out.push_str(&format!("column_names={}\n", self.column_names.join(",")));
        let types: Vec<String> = self
            .column_types
            .iter()
            .map(|t| t.to_string())
            .collect();
        out.push_str(&format!("column_types={}\n", types.join(",")));
        let files: Vec<String> = self
            .column_files
            .iter()
            .map(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| p.to_string_lossy().into_owned())
            })
            .collect();
        out.push_str(&format!("column_files={}\n", files.join(",")));
        let segs: Vec<String> = self.segment_rows.iter().map(|s| s.to_string()).collect();
        out.push_str(&format!("segment_rows={}\n", segs.join(",")));
        std::fs::write(path, out)?;
        Ok(())
    }
}

fn split_list(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|s| !s.is_empty())
}
