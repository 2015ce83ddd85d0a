//! The pull-based execution surface: operator trait, execution context, and
//! the per-segment operator tree.
//!
//! An operator never sees its inputs directly. It asks the context for input
//! batches and pushes output batches back through it, which is what lets the
//! driver suspend a subtree mid-stream, tear it down early, or run one clone
//! of the tree per segment without operators knowing.

use std::collections::VecDeque;

use quarry_core::batch::RowBatch;
use quarry_core::error::{Error, Result};
use quarry_core::value::LogicalType;

/// The slice of rows one worker is responsible for.
///
/// `row_begin..row_end` index the *output domain* of the source operators in
/// the tree (table rows for a scan, produced values for a range).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSpec {
    pub index: usize,
    pub num_segments: usize,
    pub row_begin: u64,
    pub row_end: u64,
}

impl SegmentSpec {
    /// A single segment covering `0..num_rows`.
    pub fn whole(num_rows: u64) -> Self {
        Self {
            index: 0,
            num_segments: 1,
            row_begin: 0,
            row_end: num_rows,
        }
    }

    pub fn num_rows(&self) -> u64 {
        self.row_end - self.row_begin
    }
}

/// A physical operator. One instance runs one segment; `clone_for_segment`
/// produces a fresh instance with the same configuration but no progress
/// state.
pub trait Operator: Send {
    fn name(&self) -> &'static str;

    /// Produce the next slice of output through `ctx.emit`.
    ///
    /// Returning without emitting anything signals end-of-stream; the driver
    /// will not call `execute` again after that.
    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()>;

    fn clone_for_segment(&self) -> Box<dyn Operator>;
}

/// What an operator can see during one `execute` call.
pub struct ExecutionContext<'a> {
    inputs: &'a mut [OperatorTree],
    sink: &'a mut Vec<RowBatch>,
    output_types: &'a [LogicalType],
    block_size: usize,
    segment: SegmentSpec,
}

impl ExecutionContext<'_> {
    /// Pull the next batch from input slot `slot`; `None` means that input is
    /// exhausted for this segment.
    pub fn get_next(&mut self, slot: usize) -> Result<Option<RowBatch>> {
        let input = self
            .inputs
            .get_mut(slot)
            .ok_or_else(|| Error::Invariant(format!("no input slot {slot}")))?;
        input.next_batch(self.segment)
    }

    /// An empty batch shaped for this operator's output, sized for one block.
    pub fn get_output_buffer(&self) -> RowBatch {
        RowBatch::with_shape(self.output_types.len(), self.block_size)
    }

    /// Hand a finished batch downstream.
    pub fn emit(&mut self, batch: RowBatch) -> Result<()> {
        if batch.num_columns() != self.output_types.len() {
            return Err(Error::Shape(format!(
                "emitted {} columns where {} were declared",
                batch.num_columns(),
                self.output_types.len()
            )));
        }
        batch.validate()?;
        self.sink.push(batch);
        Ok(())
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_types(&self) -> &[LogicalType] {
        self.output_types
    }

    pub fn segment(&self) -> SegmentSpec {
        self.segment
    }
}

/// One operator plus its input subtrees, with batch buffering between them.
///
/// A plan DAG sharing a node between two consumers becomes two independent
/// subtrees here; each consumer pulls at its own pace.
pub struct OperatorTree {
    op: Box<dyn Operator>,
    inputs: Vec<OperatorTree>,
    output_types: Vec<LogicalType>,
    block_size: usize,
    pending: VecDeque<RowBatch>,
    exhausted: bool,
}

impl OperatorTree {
    pub fn new(
        op: Box<dyn Operator>,
        inputs: Vec<OperatorTree>,
        output_types: Vec<LogicalType>,
        block_size: usize,
    ) -> Self {
        Self {
            op,
            inputs,
            output_types,
            block_size,
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn output_types(&self) -> &[LogicalType] {
        &self.output_types
    }

    /// Pull the next batch for `segment`, running the operator as needed.
    pub fn next_batch(&mut self, segment: SegmentSpec) -> Result<Option<RowBatch>> {
        loop {
            if let Some(batch) = self.pending.pop_front() {
                return Ok(Some(batch));
            }
            if self.exhausted {
                return Ok(None);
            }
            let mut sink = Vec::new();
            let mut ctx = ExecutionContext {
                inputs: &mut self.inputs,
                sink: &mut sink,
                output_types: &self.output_types,
                block_size: self.block_size,
                segment,
            };
            self.op.execute(&mut ctx)?;
            if sink.is_empty() {
                self.exhausted = true;
                return Ok(None);
            }
            self.pending.extend(sink);
        }
    }

    /// Drain the whole segment into a batch list.
    pub fn run_to_completion(&mut self, segment: SegmentSpec) -> Result<Vec<RowBatch>> {
        let mut out = Vec::new();
        while let Some(batch) = self.next_batch(segment)? {
            out.push(batch);
        }
        Ok(out)
    }

    /// A fresh tree with the same operators but no progress state.
    pub fn clone_for_segment(&self) -> OperatorTree {
        OperatorTree {
            op: self.op.clone_for_segment(),
            inputs: self
                .inputs
                .iter()
                .map(OperatorTree::clone_for_segment)
                .collect(),
            output_types: self.output_types.clone(),
            block_size: self.block_size,
            pending: VecDeque::new(),
            exhausted: false,
        }
    }
}

/// Buffered view of one input slot for operators that co-iterate two inputs
/// whose batch boundaries need not line up.
pub(crate) struct SlotFeed {
    slot: usize,
    batch: Option<RowBatch>,
    offset: usize,
    done: bool,
}

impl SlotFeed {
    pub(crate) fn new(slot: usize) -> Self {
        Self {
            slot,
            batch: None,
            offset: 0,
            done: false,
        }
    }

    /// Make sure at least one unconsumed row is buffered. `false` means the
    /// input is exhausted.
    pub(crate) fn refill(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<bool> {
        loop {
            if let Some(batch) = &self.batch {
                if self.offset < batch.num_rows() {
                    return Ok(true);
                }
                self.batch = None;
                self.offset = 0;
            }
            if self.done {
                return Ok(false);
            }
            match ctx.get_next(self.slot)? {
                Some(batch) => {
                    self.batch = Some(batch);
                    self.offset = 0;
                }
                None => {
                    self.done = true;
                    return Ok(false);
                }
            }
        }
    }

    /// Unconsumed rows in the current batch. Zero until `refill` succeeds.
    pub(crate) fn available(&self) -> usize {
        self.batch
            .as_ref()
            .map(|b| b.num_rows() - self.offset)
            .unwrap_or(0)
    }

    pub(crate) fn batch(&self) -> &RowBatch {
        self.batch.as_ref().expect("refill checked before access")
    }

    pub(crate) fn offset(&self) -> usize {
        self.offset
    }

    pub(crate) fn advance(&mut self, n: usize) {
        self.offset += n;
    }
}
