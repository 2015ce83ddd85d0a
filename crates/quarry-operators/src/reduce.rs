//! Reduction: folds an input stream through an aggregator.
//!
//! Running single-segment, the operator emits the finalized value as one row.
//! Running as one of several segments, it emits its serialized partial state
//! instead; the driver merges states across segments and finalizes once. The
//! partial row is a string regardless of the declared output type, which is
//! why partial outputs never leave the driver.

use quarry_core::batch::RowBatch;
use quarry_core::error::Result;
use quarry_core::value::Value;

use crate::aggregate::GroupAggregator;
use crate::context::{ExecutionContext, Operator};

pub struct Reduce {
    agg: Box<dyn GroupAggregator>,
    done: bool,
}

impl Reduce {
    /// `agg` must already have its input types bound.
    pub fn new(agg: Box<dyn GroupAggregator>) -> Self {
        Self { agg, done: false }
    }
}

impl Operator for Reduce {
    fn name(&self) -> &'static str {
        "reduce"
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        if self.done {
            return Ok(());
        }
        while let Some(batch) = ctx.get_next(0)? {
            if batch.num_columns() == 1 {
                for v in batch.columns()[0].values() {
                    self.agg.add_element_simple(v)?;
                }
            } else {
                // Multi-argument aggregators take the whole row.
                for r in 0..batch.num_rows() {
                    self.agg.add_element(&batch.row(r))?;
                }
            }
        }
        self.done = true;
        self.agg.partial_finalize();

        let out = if ctx.segment().num_segments > 1 {
            Value::Str(self.agg.save()?)
        } else {
            self.agg.emit()
        };
        ctx.emit(RowBatch::single_row(vec![out]))
    }

    fn clone_for_segment(&self) -> Box<dyn Operator> {
        Box::new(Reduce::new(self.agg.new_instance()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{AggregatorRegistry, Sum};
    use crate::context::{OperatorTree, SegmentSpec};
    use crate::range::RangeSource;
    use quarry_core::value::LogicalType;

    fn range_tree(start: i64, end: i64, bs: usize) -> OperatorTree {
        OperatorTree::new(
            Box::new(RangeSource::new(start, end)),
            vec![],
            vec![LogicalType::Int],
            bs,
        )
    }

    fn sum_agg() -> Box<dyn GroupAggregator> {
        let mut agg: Box<dyn GroupAggregator> = Box::new(Sum::default());
        agg.set_input_types(&[LogicalType::Int]).unwrap();
        agg
    }

    #[test]
    fn sums_a_range() {
        let mut tree = OperatorTree::new(
            Box::new(Reduce::new(sum_agg())),
            vec![range_tree(0, 10, 3)],
            vec![LogicalType::Int],
            3,
        );
        let batches = tree.run_to_completion(SegmentSpec::whole(10)).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].row(0), vec![Value::Int(45)]);
    }

    #[test]
    fn multi_segment_emits_partial_state() {
        let mut tree = OperatorTree::new(
            Box::new(Reduce::new(sum_agg())),
            vec![range_tree(0, 10, 4)],
            vec![LogicalType::Int],
            4,
        );
        let seg = SegmentSpec {
            index: 0,
            num_segments: 2,
            row_begin: 0,
            row_end: 5,
        };
        let batches = tree.run_to_completion(seg).unwrap();
        assert_eq!(batches.len(), 1);
        let state = match &batches[0].row(0)[0] {
            Value::Str(s) => s.clone(),
            other => panic!("expected partial state string, got {other:?}"),
        };

        let reg = AggregatorRegistry::with_builtins();
        let mut agg = reg.build("sum").unwrap();
        agg.load(&state).unwrap();
        assert_eq!(agg.emit(), Value::Int(10));
    }

    #[test]
    fn empty_input_still_emits_one_row() {
        let mut tree = OperatorTree::new(
            Box::new(Reduce::new(sum_agg())),
            vec![range_tree(0, 0, 4)],
            vec![LogicalType::Int],
            4,
        );
        let batches = tree.run_to_completion(SegmentSpec::whole(0)).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].row(0), vec![Value::Int(0)]);
    }
}
