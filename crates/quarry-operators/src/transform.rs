//! Elementwise transforms over one or two single-column streams.
//!
//! The user function is an opaque plan parameter; the operator's only job is
//! pacing, pairing, and checking the declared output type. Null results are
//! always allowed.

use std::sync::Arc;

use quarry_core::error::{Error, Result};
use quarry_core::value::{LogicalType, Value};

use crate::context::{ExecutionContext, Operator, SlotFeed};

pub type UnaryFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;
pub type BinaryFn = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

fn check_output(op: &str, value: &Value, declared: LogicalType) -> Result<()> {
    match value.logical_type() {
        None => Ok(()),
        Some(t) if t == declared => Ok(()),
        Some(t) => Err(Error::Shape(format!(
            "{op} produced {t} where {declared} was declared"
        ))),
    }
}

fn single_column(op: &str, batch: &quarry_core::batch::RowBatch) -> Result<()> {
    if batch.num_columns() != 1 {
        return Err(Error::Shape(format!(
            "{op} expects a single-column input, got {} columns",
            batch.num_columns()
        )));
    }
    Ok(())
}

pub struct Transform {
    f: UnaryFn,
    out_type: LogicalType,
}

impl Transform {
    pub fn new(f: UnaryFn, out_type: LogicalType) -> Self {
        Self { f, out_type }
    }
}

impl Operator for Transform {
    fn name(&self) -> &'static str {
        "transform"
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        let Some(batch) = ctx.get_next(0)? else {
            return Ok(());
        };
        single_column("transform", &batch)?;

        let mut out = ctx.get_output_buffer();
        if let Some(col) = out.column_mut(0) {
            for v in batch.columns()[0].values() {
                let produced = (self.f)(v);
                check_output("transform", &produced, self.out_type)?;
                col.push(produced);
            }
        }
        ctx.emit(out)
    }

    fn clone_for_segment(&self) -> Box<dyn Operator> {
        Box::new(Transform {
            f: Arc::clone(&self.f),
            out_type: self.out_type,
        })
    }
}

pub struct BinaryTransform {
    f: BinaryFn,
    out_type: LogicalType,
    left: SlotFeed,
    right: SlotFeed,
}

impl BinaryTransform {
    pub fn new(f: BinaryFn, out_type: LogicalType) -> Self {
        Self {
            f,
            out_type,
            left: SlotFeed::new(0),
            right: SlotFeed::new(1),
        }
    }
}

impl Operator for BinaryTransform {
    fn name(&self) -> &'static str {
        "binary_transform"
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
                        "binary_transform inputs ended at different lengths".to_string(),
                    ));
                }
            }
            single_column("binary_transform", self.left.batch())?;
            single_column("binary_transform", self.right.batch())?;

            let n = self
                .left
                .available()
                .min(self.right.available())
                .min(ctx.block_size() - produced);
            {
                let lvals = &self.left.batch().columns()[0].values()
                    [self.left.offset()..self.left.offset() + n];
                let rvals = &self.right.batch().columns()[0].values()
                    [self.right.offset()..self.right.offset() + n];
                let col = out
                    .column_mut(0)
                    .ok_or_else(|| Error::Invariant("missing output column".to_string()))?;
                for (l, r) in lvals.iter().zip(rvals) {
                    let v = (self.f)(l, r);
                    check_output("binary_transform", &v, self.out_type)?;
                    col.push(v);
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
        Box::new(BinaryTransform::new(Arc::clone(&self.f), self.out_type))
    }
}
