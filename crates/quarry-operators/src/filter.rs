//! Logical filter: keeps rows of the value stream where the mask stream is
//! truthy.
//!
//! Output length is data-dependent, so one `execute` call may consume many
//! input batches before it has anything to emit. A call that drains both
//! inputs without keeping a row simply emits nothing, which doubles as the
//! end-of-stream signal.

use quarry_core::error::{Error, Result};

use crate::context::{ExecutionContext, Operator, SlotFeed};

pub struct LogicalFilter {
    values: SlotFeed,
    mask: SlotFeed,
}

impl LogicalFilter {
    pub fn new() -> Self {
        Self {
            values: SlotFeed::new(0),
            mask: SlotFeed::new(1),
        }
    }
}

impl Default for LogicalFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for LogicalFilter {
    fn name(&self) -> &'static str {
        "logical_filter"
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let mut out = ctx.get_output_buffer();
        let mut kept = 0usize;
        while kept < ctx.block_size() {
            let have_values = self.values.refill(ctx)?;
            let have_mask = self.mask.refill(ctx)?;
            match (have_values, have_mask) {
                (true, true) => {}
                (false, false) => break,
                _ => {
                    return Err(Error::Shape(
                        "logical_filter value and mask streams ended at different lengths"
                            .to_string(),
                    ));
                }
            }
            if self.mask.batch().num_columns() != 1 {
                return Err(Error::Shape(format!(
                    "logical_filter mask must be a single column, got {}",
                    self.mask.batch().num_columns()
                )));
            }

            let n = self
                .values
                .available()
                .min(self.mask.available())
                .min(ctx.block_size() - kept);
            let mask_vals = &self.mask.batch().columns()[0].values()
                [self.mask.offset()..self.mask.offset() + n];
            for (rel, m) in mask_vals.iter().enumerate() {
                if m.is_truthy() {
                    let row = self.values.batch().row(self.values.offset() + rel);
                    out.push_row(&row)?;
                    kept += 1;
                }
            }
            self.values.advance(n);
            self.mask.advance(n);
        }

        if kept > 0 {
            ctx.emit(out)?;
        }
        Ok(())
    }

    fn clone_for_segment(&self) -> Box<dyn Operator> {
        Box::new(LogicalFilter::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{OperatorTree, SegmentSpec};
    use crate::range::RangeSource;
    use crate::transform::{Transform, UnaryFn};
    use quarry_core::value::{LogicalType, Value};
    use std::sync::Arc;

    fn range_tree(start: i64, end: i64, bs: usize) -> OperatorTree {
        OperatorTree::new(
            Box::new(RangeSource::new(start, end)),
            vec![],
            vec![LogicalType::Int],
            bs,
        )
    }

    fn mask_tree(start: i64, end: i64, bs: usize, pred: UnaryFn) -> OperatorTree {
        OperatorTree::new(
            Box::new(Transform::new(pred, LogicalType::Int)),
            vec![range_tree(start, end, bs)],
            vec![LogicalType::Int],
            bs,
        )
    }

    #[test]
    fn keeps_truthy_rows() {
        let even: UnaryFn = Arc::new(|v| Value::Int((v.as_int().unwrap_or(0) % 2 == 0) as i64));
        let mut tree = OperatorTree::new(
            Box::new(LogicalFilter::new()),
            vec![range_tree(0, 10, 3), mask_tree(0, 10, 4, even)],
            vec![LogicalType::Int],
            4,
        );
        let batches = tree.run_to_completion(SegmentSpec::whole(10)).unwrap();
        let all: Vec<i64> = batches
            .iter()
            .flat_map(|b| b.columns()[0].values().iter())
            .map(|v| v.as_int().unwrap())
            .collect();
        assert_eq!(all, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn all_false_mask_yields_empty_stream() {
        let never: UnaryFn = Arc::new(|_| Value::Int(0));
        let mut tree = OperatorTree::new(
            Box::new(LogicalFilter::new()),
            vec![range_tree(0, 20, 4), mask_tree(0, 20, 4, never)],
            vec![LogicalType::Int],
            4,
        );
        assert!(tree.run_to_completion(SegmentSpec::whole(20)).unwrap().is_empty());
    }

    #[test]
    fn null_mask_values_drop_rows() {
        let odd_or_null: UnaryFn = Arc::new(|v| match v.as_int() {
            Some(i) if i % 2 == 1 => Value::Int(1),
            _ => Value::Null,
        });
        let mut tree = OperatorTree::new(
            Box::new(LogicalFilter::new()),
            vec![range_tree(0, 6, 4), mask_tree(0, 6, 4, odd_or_null)],
            vec![LogicalType::Int],
            4,
        );
        let batches = tree.run_to_completion(SegmentSpec::whole(6)).unwrap();
        let all: Vec<i64> = batches
            .iter()
            .flat_map(|b| b.columns()[0].values().iter())
            .map(|v| v.as_int().unwrap())
            .collect();
        assert_eq!(all, vec![1, 3, 5]);
    }
}
