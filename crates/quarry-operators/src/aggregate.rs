//! Incremental aggregators and their registry.
//!
//! An aggregator is fed one element (or row) at a time, can merge with a
//! peer that processed a disjoint slice of the data, and can round-trip its
//! partial state as text so segment workers can hand states to the driver
//! for the final merge.
//!
//! Null elements never contribute to numeric aggregates; `count` counts
//! every row, nulls included.

use std::any::Any;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use quarry_core::error::{Error, Result};
use quarry_core::value::{LogicalType, Value};

pub trait GroupAggregator: Send + Sync {
    /// Registry name, e.g. `"sum"`.
    fn name(&self) -> &'static str;

    /// A fresh instance with the same configuration and no accumulated data.
    fn new_instance(&self) -> Box<dyn GroupAggregator>;

    /// Whether the aggregator accepts a column of type `t`.
    fn supports_type(&self, t: LogicalType) -> bool;

    /// Bind the aggregator to its input column types. Returns the output
    /// type. Single-argument aggregators reject multi-column type lists.
    fn set_input_types(&mut self, types: &[LogicalType]) -> Result<LogicalType>;

    fn add_element_simple(&mut self, value: &Value) -> Result<()>;

    /// Fold in one row. Multi-argument aggregators override this; the
    /// default forwards the row's only value.
    fn add_element(&mut self, row: &[Value]) -> Result<()> {
        match row {
            [v] => self.add_element_simple(v),
            _ => Err(Error::Shape(format!(
                "{} aggregates a single column, got a {}-wide row",
                self.name(),
                row.len()
            ))),
        }
    }

    /// No more elements will be added; the state may still be combined.
    fn partial_finalize(&mut self) {}

    /// Fold in a peer that aggregated a disjoint slice of the input.
    fn combine(&mut self, other: &dyn GroupAggregator) -> Result<()>;

    fn emit(&self) -> Value;

    /// Serialize the partial state for cross-worker or cross-process
    /// hand-off.
    fn save(&self) -> Result<String>;

    fn load(&mut self, state: &str) -> Result<()>;

    fn as_any(&self) -> &dyn Any;
}

fn bind_one_type(agg: &dyn GroupAggregator, types: &[LogicalType]) -> Result<LogicalType> {
    let t = match types {
        [t] => *t,
        _ => {
            return Err(Error::Plan(format!(
                "{} aggregates a single column, got {}",
                agg.name(),
                types.len()
            )))
        }
    };
    if !agg.supports_type(t) {
        return Err(Error::Plan(format!(
            "{} does not aggregate {t} columns",
            agg.name()
        )));
    }
    Ok(t)
}

fn wrong_peer(name: &str) -> Error {
    Error::Invariant(format!("{name} combined with a different aggregator"))
}

fn wrong_element(name: &str, value: &Value) -> Error {
    Error::Shape(format!("{name} cannot aggregate {value:?}"))
}

// ---------------------------------------------------------------- count

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CountState {
    rows: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Count {
    state: CountState,
}

impl GroupAggregator for Count {
    fn name(&self) -> &'static str {
        "count"
    }

    fn new_instance(&self) -> Box<dyn GroupAggregator> {
        Box::new(Count::default())
    }

    fn supports_type(&self, _t: LogicalType) -> bool {
        true
    }

    fn set_input_types(&mut self, types: &[LogicalType]) -> Result<LogicalType> {
        bind_one_type(self, types)?;
        Ok(LogicalType::Int)
    }

    fn add_element_simple(&mut self, _value: &Value) -> Result<()> {
        self.state.rows += 1;
        Ok(())
    }

    fn combine(&mut self, other: &dyn GroupAggregator) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<Count>()
            .ok_or_else(|| wrong_peer("count"))?;
        self.state.rows += other.state.rows;
        Ok(())
    }

    fn emit(&self) -> Value {
        Value::Int(self.state.rows as i64)
    }

    fn save(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.state)?)
    }

    fn load(&mut self, state: &str) -> Result<()> {
        self.state = serde_json::from_str(state)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------- sum

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SumState {
    int_total: i64,
    float_total: f64,
    float_output: bool,
}

impl Default for SumState {
    fn default() -> Self {
        Self {
            int_total: 0,
            float_total: 0.0,
            float_output: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Sum {
    state: SumState,
}

impl GroupAggregator for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn new_instance(&self) -> Box<dyn GroupAggregator> {
        let mut fresh = Sum::default();
        fresh.state.float_output = self.state.float_output;
        Box::new(fresh)
    }

    fn supports_type(&self, t: LogicalType) -> bool {
        matches!(t, LogicalType::Int | LogicalType::Float)
    }

    fn set_input_types(&mut self, types: &[LogicalType]) -> Result<LogicalType> {
        match bind_one_type(self, types)? {
            LogicalType::Float => {
                self.state.float_output = true;
                Ok(LogicalType::Float)
            }
            _ => {
                self.state.float_output = false;
                Ok(LogicalType::Int)
            }
        }
    }

    fn add_element_simple(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => Ok(()),
            Value::Int(v) => {
                // Wraps like the codec's delta arithmetic; never panics.
                self.state.int_total = self.state.int_total.wrapping_add(*v);
                self.state.float_total += *v as f64;
                Ok(())
            }
            Value::Float(v) => {
                self.state.float_total += v;
                Ok(())
            }
            other => Err(wrong_element("sum", other)),
        }
    }

    fn combine(&mut self, other: &dyn GroupAggregator) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<Sum>()
            .ok_or_else(|| wrong_peer("sum"))?;
        self.state.int_total = self.state.int_total.wrapping_add(other.state.int_total);
        self.state.float_total += other.state.float_total;
        Ok(())
    }

    fn emit(&self) -> Value {
        if self.state.float_output {
            Value::Float(self.state.float_total)
        } else {
            Value::Int(self.state.int_total)
        }
    }

    fn save(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.state)?)
    }

    fn load(&mut self, state: &str) -> Result<()> {
        self.state = serde_json::from_str(state)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------- min / max

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Extreme {
    Min,
    Max,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExtremeState {
    which: Extreme,
    current: Option<Value>,
}

/// Shared implementation behind `min` and `max`.
#[derive(Debug, Clone)]
pub struct MinMax {
    state: ExtremeState,
}

impl MinMax {
    pub fn min() -> Self {
        Self {
            state: ExtremeState {
                which: Extreme::Min,
                current: None,
            },
        }
    }

    pub fn max() -> Self {
        Self {
            state: ExtremeState {
                which: Extreme::Max,
                current: None,
            },
        }
    }

    fn keep(&self, incoming: f64, held: f64) -> bool {
        match self.state.which {
            Extreme::Min => incoming < held,
            Extreme::Max => incoming > held,
        }
    }

    fn consider(&mut self, value: &Value) -> Result<()> {
        let incoming = match value {
            Value::Null => return Ok(()),
            Value::Int(v) => *v as f64,
            Value::Float(v) => *v,
            other => return Err(wrong_element(self.name(), other)),
        };
        let replace = match &self.state.current {
            None => true,
            Some(Value::Int(held)) => self.keep(incoming, *held as f64),
            Some(Value::Float(held)) => self.keep(incoming, *held),
            Some(_) => true,
        };
        if replace {
            self.state.current = Some(value.clone());
        }
        Ok(())
    }
}

impl GroupAggregator for MinMax {
    fn name(&self) -> &'static str {
        match self.state.which {
            Extreme::Min => "min",
            Extreme::Max => "max",
        }
    }

    fn new_instance(&self) -> Box<dyn GroupAggregator> {
        let mut fresh = self.clone();
        fresh.state.current = None;
        Box::new(fresh)
    }

    fn supports_type(&self, t: LogicalType) -> bool {
        matches!(t, LogicalType::Int | LogicalType::Float)
    }

    fn set_input_types(&mut self, types: &[LogicalType]) -> Result<LogicalType> {
        bind_one_type(self, types)
    }

    fn add_element_simple(&mut self, value: &Value) -> Result<()> {
        self.consider(value)
    }

    fn combine(&mut self, other: &dyn GroupAggregator) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<MinMax>()
            .filter(|o| o.state.which == self.state.which)
            .ok_or_else(|| wrong_peer(self.name()))?;
        if let Some(value) = other.state.current.clone() {
            self.consider(&value)?;
        }
        Ok(())
    }

    fn emit(&self) -> Value {
        self.state.current.clone().unwrap_or(Value::Null)
    }

    fn save(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.state)?)
    }

    fn load(&mut self, state: &str) -> Result<()> {
        self.state = serde_json::from_str(state)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------- mean

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MeanState {
    total: f64,
    count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct Mean {
    state: MeanState,
}

impl GroupAggregator for Mean {
    fn name(&self) -> &'static str {
        "mean"
    }

    fn new_instance(&self) -> Box<dyn GroupAggregator> {
        Box::new(Mean::default())
    }

    fn supports_type(&self, t: LogicalType) -> bool {
        matches!(t, LogicalType::Int | LogicalType::Float)
    }

    fn set_input_types(&mut self, types: &[LogicalType]) -> Result<LogicalType> {
        bind_one_type(self, types)?;
        Ok(LogicalType::Float)
    }

    fn add_element_simple(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Null => Ok(()),
            Value::Int(v) => {
                self.state.total += *v as f64;
                self.state.count += 1;
                Ok(())
            }
            Value::Float(v) => {
                self.state.total += v;
                self.state.count += 1;
                Ok(())
            }
            other => Err(wrong_element("mean", other)),
        }
    }

    fn combine(&mut self, other: &dyn GroupAggregator) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<Mean>()
            .ok_or_else(|| wrong_peer("mean"))?;
        self.state.total += other.state.total;
        self.state.count += other.state.count;
        Ok(())
    }

    fn emit(&self) -> Value {
        if self.state.count == 0 {
            Value::Null
        } else {
            Value::Float(self.state.total / self.state.count as f64)
        }
    }

    fn save(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.state)?)
    }

    fn load(&mut self, state: &str) -> Result<()> {
        self.state = serde_json::from_str(state)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ---------------------------------------------------------------- registry

/// Name to prototype. Building an aggregator clones a fresh instance off the
/// registered prototype.
pub struct AggregatorRegistry {
    prototypes: HashMap<String, Box<dyn GroupAggregator>>,
}

impl AggregatorRegistry {
    pub fn empty() -> Self {
        Self {
            prototypes: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut reg = Self::empty();
        reg.register(Box::new(Count::default()));
        reg.register(Box::new(Sum::default()));
        reg.register(Box::new(MinMax::min()));
        reg.register(Box::new(MinMax::max()));
        reg.register(Box::new(Mean::default()));
        reg
    }

    /// Later registrations shadow earlier ones under the same name.
    pub fn register(&mut self, prototype: Box<dyn GroupAggregator>) {
        self.prototypes
            .insert(prototype.name().to_string(), prototype);
    }

    pub fn build(&self, name: &str) -> Result<Box<dyn GroupAggregator>> {
        self.prototypes
            .get(name)
            .map(|p| p.new_instance())
            .ok_or_else(|| Error::Plan(format!("unknown aggregator {name:?}")))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.prototypes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for AggregatorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
