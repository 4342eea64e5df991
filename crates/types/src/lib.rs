//! Typed values and SQL type tags shared across the storage kernel.
//!
//! `Value` is the tagged union described by the data model: every tuple
//! field, every B+ tree key, and every WAL payload ultimately bottoms out
//! in this type. Integer variants cross-convert with defined widening and
//! narrowing semantics (`coerce_to`); floats and strings compare only
//! against their own kind.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The type tag a column declares. Mirrors the sealed kind set a B+ tree
/// index may be built over, plus `Bool` for predicate columns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Text,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlType::Bool => "BOOL",
            SqlType::I8 => "TINYINT",
            SqlType::I16 => "SMALLINT",
            SqlType::I32 => "INT",
            SqlType::I64 => "BIGINT",
            SqlType::F32 => "REAL",
            SqlType::F64 => "DOUBLE",
            SqlType::Text => "VARCHAR",
        };
        f.write_str(name)
    }
}

/// A tagged value: bool, one of five integer widths, one of two float
/// widths, a length-prefixed string, or `Null`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Str(String),
    Null,
}

/// Error raised by out-of-range conversions or comparisons across
/// incompatible kinds.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("cannot widen/narrow {from} to {to}")]
    Incompatible { from: &'static str, to: SqlTypeName },
    #[error("value {0} does not fit in target type")]
    OutOfRange(String),
    #[error("NaN is not a valid index key")]
    NotAnOrder,
}

/// `Display`-only wrapper so `SqlType` can appear in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqlTypeName(pub SqlType);

impl fmt::Display for SqlTypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Value {
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            Value::Bool(_) => Some(SqlType::Bool),
            Value::I8(_) => Some(SqlType::I8),
            Value::I16(_) => Some(SqlType::I16),
            Value::I32(_) => Some(SqlType::I32),
            Value::I64(_) => Some(SqlType::I64),
            Value::F32(_) => Some(SqlType::F32),
            Value::F64(_) => Some(SqlType::F64),
            Value::Str(_) => Some(SqlType::Text),
            Value::Null => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Widen or narrow an integer value to `target`. Integers freely
    /// cross-convert as long as the value fits; floats convert to/from
    /// floats and integers via `as`; `Bool`/`Text`/`Null` only convert to
    /// their own kind.
    pub fn coerce_to(&self, target: SqlType) -> Result<Value, TypeError> {
        if self.is_null() {
            return Ok(Value::Null);
        }
        let as_i128 = self.as_i128();
        match (target, self) {
            (SqlType::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
            (SqlType::Text, Value::Str(s)) => Some(Value::Str(s.clone())),
            (SqlType::F32, _) => self.as_f64_lossy().ok().map(|v| Value::F32(v as f32)),
            (SqlType::F64, _) => self.as_f64_lossy().ok().map(Value::F64),
            (SqlType::I8, _) => as_i128.and_then(|v| i8::try_from(v).ok()).map(Value::I8),
            (SqlType::I16, _) => as_i128.and_then(|v| i16::try_from(v).ok()).map(Value::I16),
            (SqlType::I32, _) => as_i128.and_then(|v| i32::try_from(v).ok()).map(Value::I32),
            (SqlType::I64, _) => as_i128.and_then(|v| i64::try_from(v).ok()).map(Value::I64),
            _ => None,
        }
        .ok_or_else(|| {
            if as_i128.is_some() || matches!(self, Value::F32(_) | Value::F64(_)) {
                TypeError::OutOfRange(format!("{self:?}"))
            } else {
                TypeError::Incompatible {
                    from: self.kind_name(),
                    to: SqlTypeName(target),
                }
            }
        })
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "BOOL",
            Value::I8(_) => "TINYINT",
            Value::I16(_) => "SMALLINT",
            Value::I32(_) => "INT",
            Value::I64(_) => "BIGINT",
            Value::F32(_) => "REAL",
            Value::F64(_) => "DOUBLE",
            Value::Str(_) => "VARCHAR",
            Value::Null => "NULL",
        }
    }

    fn as_i128(&self) -> Option<i128> {
        match self {
            Value::I8(v) => Some(*v as i128),
            Value::I16(v) => Some(*v as i128),
            Value::I32(v) => Some(*v as i128),
            Value::I64(v) => Some(*v as i128),
            _ => None,
        }
    }

    fn as_f64_lossy(&self) -> Result<f64, TypeError> {
        match self {
            Value::I8(v) => Ok(*v as f64),
            Value::I16(v) => Ok(*v as f64),
            Value::I32(v) => Ok(*v as f64),
            Value::I64(v) => Ok(*v as f64),
            Value::F32(v) => Ok(*v as f64),
            Value::F64(v) => Ok(*v),
            other => Err(TypeError::Incompatible {
                from: other.kind_name(),
                to: SqlTypeName(SqlType::F64),
            }),
        }
    }

    /// Compare two values of the same kind. Returns `None` across kinds
    /// (including any comparison involving `Null`, which has no order).
    pub fn cmp_same_type(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::I8(a), Value::I8(b)) => Some(a.cmp(b)),
            (Value::I16(a), Value::I16(b)) => Some(a.cmp(b)),
            (Value::I32(a), Value::I32(b)) => Some(a.cmp(b)),
            (Value::I64(a), Value::I64(b)) => Some(a.cmp(b)),
            (Value::F32(a), Value::F32(b)) => a.partial_cmp(b),
            (Value::F64(a), Value::F64(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn eq_same_type(&self, other: &Value) -> Option<bool> {
        self.cmp_same_type(other).map(|o| o == Ordering::Equal)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            _ => self.eq_same_type(other).unwrap_or(false),
        }
    }
}
