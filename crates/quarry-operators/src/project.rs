//! Column projection. Selected columns share storage with the input batch;
//! nothing is copied until someone writes.

use quarry_core::batch::RowBatch;
use quarry_core::error::{Error, Result};

use crate::context::{ExecutionContext, Operator};

pub struct Project {
    columns: Vec<usize>,
}

impl Project {
    pub fn new(columns: Vec<usize>) -> Self {
        Self { columns }
    }
}

impl Operator for Project {
    fn name(&self) -> &'static str {
        "project"
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let Some(batch) = ctx.get_next(0)? else {
            return Ok(());
        };
        let mut selected = Vec::with_capacity(self.columns.len());
        for &idx in &self.columns {
            let col = batch.column(idx).ok_or_else(|| {
                Error::Shape(format!(
                    "project index {idx} out of range for {} columns",
                    batch.num_columns()
                ))
            })?;
            selected.push(col.clone());
        }
        ctx.emit(RowBatch::new(selected)?)
    }

    fn clone_for_segment(&self) -> Box<dyn Operator> {
        Box::new(Project::new(self.columns.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{OperatorTree, SegmentSpec};
    use crate::range::RangeSource;
    use crate::union::Union;
    use quarry_core::value::LogicalType;

    fn range_tree(start: i64, end: i64, bs: usize) -> OperatorTree {
        OperatorTree::new(
            Box::new(RangeSource::new(start, end)),
            vec![],
            vec![LogicalType::Int],
            bs,
        )
    }

    #[test]
    fn projection_shares_column_storage() {
        // union(range, range) -> project second column
        let union = OperatorTree::new(
            Box::new(Union::new()),
            vec![range_tree(0, 6, 4), range_tree(10, 16, 4)],
            vec![LogicalType::Int, LogicalType::Int],
            4,
        );
        let mut tree = OperatorTree::new(
            Box::new(Project::new(vec![1])),
            vec![union],
            vec![LogicalType::Int],
            4,
        );
        let batches = tree.run_to_completion(SegmentSpec::whole(6)).unwrap();
        let all: Vec<i64> = batches
            .iter()
            .flat_map(|b| b.columns()[0].values().iter())
            .map(|v| v.as_int().unwrap())
            .collect();
        assert_eq!(all, (10..16).collect::<Vec<_>>());
    }

    #[test]
    fn duplicate_and_reorder_indices() {
        let mut tree = OperatorTree::new(
            Box::new(Project::new(vec![0, 0])),
            vec![range_tree(0, 3, 8)],
            vec![LogicalType::Int, LogicalType::Int],
            8,
        );
        let batches = tree.run_to_completion(SegmentSpec::whole(3)).unwrap();
        assert_eq!(batches[0].num_columns(), 2);
        assert!(batches[0].columns()[0].shares_storage_with(&batches[0].columns()[1]));
    }
}
