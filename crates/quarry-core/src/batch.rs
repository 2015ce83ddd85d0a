//! In-memory columnar batches with copy-on-write column sharing.
//!
//! A batch hands its columns downstream by value; the `Arc` inside
//! `ColumnArray` makes that cheap. Mutation goes through `ensure_unique`,
//! which takes a private copy only when the storage is actually shared.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::Value;

/// One column of a batch: a shared-or-owned sequence of values.
#[derive(Debug, Clone, Default)]
pub struct ColumnArray {
    values: Arc<Vec<Value>>,
}

impl ColumnArray {
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            values: Arc::new(Vec::with_capacity(cap)),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Value> {
        self.values.get(idx)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    /// Mutable access with copy-on-write: clones the backing storage only
    /// when another column still shares it.
    pub fn ensure_unique(&mut self) -> &mut Vec<Value> {
        Arc::make_mut(&mut self.values)
    }

    /// Whether this column shares backing storage with `other` (test hook).
    pub fn shares_storage_with(&self, other: &ColumnArray) -> bool {
        Arc::ptr_eq(&self.values, &other.values)
    }
}

impl From<Vec<Value>> for ColumnArray {
    fn from(values: Vec<Value>) -> Self {
        ColumnArray::from_values(values)
    }
}

/// An ordered set of equal-length columns.
#[derive(Debug, Clone, Default)]
pub struct RowBatch {
    columns: Vec<ColumnArray>,
}

impl RowBatch {
    /// Build a batch from columns, checking the equal-length invariant.
    pub fn new(columns: Vec<ColumnArray>) -> Result<Self> {
        let batch = Self { columns };
        batch.validate()?;
        Ok(batch)
    }

    /// An empty batch with `num_columns` columns, each reserving `cap` rows.
    /// This is the shape handed out by `get_output_buffer`.
    pub fn with_shape(num_columns: usize, cap: usize) -> Self {
        Self {
            columns: (0..num_columns)
                .map(|_| ColumnArray::with_capacity(cap))
                .collect(),
        }
    }

    /// A one-row batch, used by reductions.
    pub fn single_row(row: Vec<Value>) -> Self {
        Self {
            columns: row
                .into_iter()
                .map(|v| ColumnArray::from_values(vec![v]))
                .collect(),
        }
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    pub fn column(&self, idx: usize) -> Option<&ColumnArray> {
        self.columns.get(idx)
    }

    pub fn columns(&self) -> &[ColumnArray] {
        &self.columns
    }

    /// Copy-on-write mutable access to one column's values.
    pub fn column_mut(&mut self, idx: usize) -> Option<&mut Vec<Value>> {
        self.columns.get_mut(idx).map(|c| c.ensure_unique())
    }

    /// Append a whole column (used by column-wise union).
    pub fn push_column(&mut self, column: ColumnArray) -> Result<()> {
        if !self.columns.is_empty() && column.len() != self.num_rows() {
            return Err(Error::Shape(format!(
                "cannot add column of length {} to batch of {} rows",
                column.len(),
                self.num_rows()
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Append one row across all columns.
    pub fn push_row(&mut self, row: &[Value]) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::Shape(format!(
                "row width {} does not match batch width {}",
                row.len(),
                self.columns.len()
            )));
        }
        for (col, v) in self.columns.iter_mut().zip(row) {
            col.ensure_unique().push(v.clone());
        }
        Ok(())
    }

    /// Values of row `idx` across all columns, cloned.
    pub fn row(&self, idx: usize) -> Vec<Value> {
        self.columns
            .iter()
            .filter_map(|c| c.get(idx).cloned())
            .collect()
    }

    /// Check the equal-column-length invariant.
    pub fn validate(&self) -> Result<()> {
        if let Some(first) = self.columns.first() {
            for (i, col) in self.columns.iter().enumerate() {
                if col.len() != first.len() {
                    return Err(Error::Shape(format!(
                        "column {} has {} rows, expected {}",
                        i,
                        col.len(),
                        first.len()
                    )));
                }
            }
        }
        Ok(())
    }
}
