//! Range source: manufactures the integers `[start, end)`.

use quarry_core::error::Result;
use quarry_core::value::Value;

use crate::context::{ExecutionContext, Operator};

pub struct RangeSource {
    start: i64,
    end: i64,
    /// Next value to produce; `None` until the first `execute` maps the
    /// segment window onto the value range.
    pos: Option<i64>,
    seg_end: i64,
}

impl RangeSource {
    pub fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end,
            pos: None,
            seg_end: end,
        }
    }
}

impl Operator for RangeSource {
    fn name(&self) -> &'static str {
        "range"
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        if self.pos.is_none() {
            let seg = ctx.segment();
            let lo = (self.start + seg.row_begin as i64).min(self.end);
            let hi = (self.start + seg.row_end as i64).min(self.end);
            self.pos = Some(lo);
            self.seg_end = hi;
        }
        let pos = self.pos.unwrap_or(self.seg_end);
        if pos >= self.seg_end {
            return Ok(());
        }

        let take = ((self.seg_end - pos) as usize).min(ctx.block_size());
        let mut out = ctx.get_output_buffer();
        if let Some(col) = out.column_mut(0) {
            col.extend((pos..pos + take as i64).map(Value::Int));
        }
        self.pos = Some(pos + take as i64);
        ctx.emit(out)
    }

    fn clone_for_segment(&self) -> Box<dyn Operator> {
        Box::new(RangeSource::new(self.start, self.end))
    }
}
