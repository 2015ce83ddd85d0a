//! Dynamically-typed cell values and their logical types.
//!
//! Columns are homogeneous in the common case, but a cell can always hold
//! `Null`. Operators and aggregators promote `Int` to `Float` when mixing.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalType {
    Int,
    Float,
    Str,
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Int => write!(f, "int"),
            LogicalType::Float => write!(f, "float"),
            LogicalType::Str => write!(f, "str"),
        }
    }
}

impl std::str::FromStr for LogicalType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(LogicalType::Int),
            "float" => Ok(LogicalType::Float),
            "str" => Ok(LogicalType::Str),
            other => Err(crate::error::Error::Plan(format!(
                "unknown logical type {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Logical type of this cell; `None` for `Null` (typeless).
    pub fn logical_type(&self) -> Option<LogicalType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(LogicalType::Int),
            Value::Float(_) => Some(LogicalType::Float),
            Value::Str(_) => Some(LogicalType::Str),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view with int-to-float promotion.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness used by the logical filter: nonzero numbers and non-empty
    /// strings are true, `Null` is false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logical_types() {
        assert_eq!(Value::Int(1).logical_type(), Some(LogicalType::Int));
        assert_eq!(Value::Float(1.5).logical_type(), Some(LogicalType::Float));
        assert_eq!(Value::from("x").logical_type(), Some(LogicalType::Str));
        assert_eq!(Value::Null.logical_type(), None);
    }

    #[test]
    fn numeric_promotion() {
        assert_eq!(Value::Int(3).as_float(), Some(3.0));
        assert_eq!(Value::Str("3".into()).as_float(), None);
    }

    #[test]
    fn truthiness() {
        assert!(Value::Int(2).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(Value::from("y").is_truthy());
        assert!(!Value::from("").is_truthy());
    }
}
