//! Column union: zips two equal-length streams side by side.

use quarry_core::error::{Error, Result};

use crate::context::{ExecutionContext, Operator, SlotFeed};

pub struct Union {
    left: SlotFeed,
    right: SlotFeed,
}

impl Union {
    pub fn new() -> Self {
        Self {
            left: SlotFeed::new(0),
            right: SlotFeed::new(1),
        }
    }
}

impl Default for Union {
    fn default() -> Self {
        Self::new()
    }
}

impl Operator for Union {
    fn name(&self) -> &'static str {
        "union"
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let mut out = ctx.get_output_buffer();
        let mut produced = 0usize;
        while produced < ctx.block_size() {
            let have_left = self.left.refill(ctx)?;
            let have_right = self.right.refill(ctx)?;
            match (have_left, have_right) {
                (true, true) => {}
                (false, false) => break,
                _ => {
                    return Err(Error::Shape(
                        "union inputs ended at different lengths".to_string(),
                    ));
                }
            }

            let n = self
                .left
                .available()
                .min(self.right.available())
                .min(ctx.block_size() - produced);
            let left_cols = self.left.batch().num_columns();
            let input_cols = left_cols + self.right.batch().num_columns();
            let declared = out.num_columns();
            for (slot, feed) in [(0usize, &self.left), (left_cols, &self.right)] {
                let batch = feed.batch();
                for (c, col) in batch.columns().iter().enumerate() {
                    let dst = out.column_mut(slot + c).ok_or_else(|| {
                        Error::Shape(format!(
                            "union saw {input_cols} input columns where {declared} were declared"
                        ))
                    })?;
                    dst.extend_from_slice(&col.values()[feed.offset()..feed.offset() + n]);
                }
            }
            self.left.advance(n);
            self.right.advance(n);
            produced += n;
        }

        if produced > 0 {
            ctx.emit(out)?;
        }
        Ok(())
    }

    fn clone_for_segment(&self) -> Box<dyn Operator> {
        Box::new(Union::new())
    }
}
