//! Value model shared by bound parameters and decoded columns.
//!
//! A [`Value`] is one column value tagged with its [`ValueType`]. Reads are
//! strict: asking a `Text` value for an integer is a [`Error::TypeMismatch`],
//! never a cast. `Null` is accepted wherever a type is declared.
//!
//! # Example
//!
//! ```
//! use sqlwire::{Value, ValueType};
//!
//! let v = Value::from("User_1");
//! assert!(v.matches(ValueType::Text));
//! assert!(v.as_int().is_err());
//! assert_eq!(v.as_text().unwrap(), Some("User_1"));
//!
//! let rating: Option<f64> = None;
//! assert!(Value::from(rating).matches(ValueType::Double));
//! ```

use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Type tag of a [`Value`]; one byte on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ValueType {
    /// SQL NULL.
    Null = 0,
    /// 64-bit signed integer.
    Int = 1,
    /// 64-bit float.
    Double = 2,
    /// UTF-8 text.
    Text = 3,
    /// Raw bytes.
    Blob = 4,
}

impl ValueType {
    /// Wire tag for this type.
    #[inline]
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ValueType::Null),
            1 => Some(ValueType::Int),
            2 => Some(ValueType::Double),
            3 => Some(ValueType::Text),
            4 => Some(ValueType::Blob),
            _ => None,
        }
    }

    /// Lowercase name, as used in messages and serde.
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Null => "null",
            ValueType::Int => "int",
            ValueType::Double => "double",
            ValueType::Text => "text",
            ValueType::Blob => "blob",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One column value.
#[derive(Debug, Clone)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Integer.
    Int(i64),
    /// Float.
    Double(f64),
    /// Text.
    Text(String),
    /// Bytes.
    Blob(Vec<u8>),
}

impl Value {
    /// The tag of this value.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Null,
            Value::Int(_) => ValueType::Int,
            Value::Double(_) => ValueType::Double,
            Value::Text(_) => ValueType::Text,
            Value::Blob(_) => ValueType::Blob,
        }
    }

    /// Whether this value may stand in a column declared as `declared`.
    ///
    /// `Null` matches every declared type.
    #[inline]
    pub fn matches(&self, declared: ValueType) -> bool {
        self.is_null() || self.value_type() == declared
    }

    /// Check if this value is NULL.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Read as integer. `Ok(None)` for NULL.
    pub fn as_int(&self) -> Result<Option<i64>> {
        match self {
            Value::Null => Ok(None),
            Value::Int(v) => Ok(Some(*v)),
            other => Err(other.mismatch(ValueType::Int)),
        }
    }

    /// Read as double. `Ok(None)` for NULL.
    pub fn as_double(&self) -> Result<Option<f64>> {
        match self {
            Value::Null => Ok(None),
            Value::Double(v) => Ok(Some(*v)),
            other => Err(other.mismatch(ValueType::Double)),
        }
    }

    /// Read as text. `Ok(None)` for NULL.
    pub fn as_text(&self) -> Result<Option<&str>> {
        match self {
            Value::Null => Ok(None),
            Value::Text(v) => Ok(Some(v)),
            other => Err(other.mismatch(ValueType::Text)),
        }
    }

    /// Read as blob. `Ok(None)` for NULL.
    pub fn as_blob(&self) -> Result<Option<&[u8]>> {
        match self {
            Value::Null => Ok(None),
            Value::Blob(v) => Ok(Some(v)),
            other => Err(other.mismatch(ValueType::Blob)),
        }
    }

    fn mismatch(&self, expected: ValueType) -> Error {
        Error::TypeMismatch {
            expected,
            actual: self.value_type(),
        }
    }
}

// Doubles compare by bit pattern so a decoded NaN equals the encoded one.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v.into())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// One result row: a value per declared column, in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Create a row from its values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Number of columns.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a 0-indexed column.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Iterate over the values.
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }

    /// All values as a slice.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Take the values out of the row.
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}
