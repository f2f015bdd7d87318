//! Payload reader with bounds checks.

use bytes::Buf;

use crate::error::{Error, Result};
use crate::value::{Value, ValueType};

/// Decodes typed primitives from a payload.
///
/// Every read checks the remaining length first, so a short buffer is a
/// [`Error::TruncatedFrame`] instead of a panic inside `bytes::Buf`.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    /// Create a reader over a payload.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    fn need(&self, needed: usize) -> Result<()> {
        if self.buf.len() < needed {
            return Err(Error::TruncatedFrame {
                needed,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    /// Read one byte.
    pub fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    /// Read a bool (any byte other than 0 or 1 is malformed).
    pub fn bool(&mut self) -> Result<bool> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::MalformedFrame(format!("invalid bool byte {}", other))),
        }
    }

    /// Read a Big Endian i32.
    pub fn i32(&mut self) -> Result<i32> {
        self.need(4)?;
        Ok(self.buf.get_i32())
    }

    /// Read a Big Endian i64.
    pub fn i64(&mut self) -> Result<i64> {
        self.need(8)?;
        Ok(self.buf.get_i64())
    }

    /// Read a Big Endian f64.
    pub fn f64(&mut self) -> Result<f64> {
        self.need(8)?;
        Ok(self.buf.get_f64())
    }

    /// Read a non-negative i32 as a count or index.
    pub fn count(&mut self) -> Result<usize> {
        let v = self.i32()?;
        usize::try_from(v).map_err(|_| Error::MalformedFrame(format!("negative count {}", v)))
    }

    /// Read a length-prefixed byte string.
    pub fn blob(&mut self) -> Result<&'a [u8]> {
        self.need(4)?;
        let len = self.buf.get_u32() as usize;
        self.need(len)?;
        let (data, rest) = self.buf.split_at(len);
        self.buf = rest;
        Ok(data)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn str(&mut self) -> Result<&'a str> {
        let data = self.blob()?;
        std::str::from_utf8(data)
            .map_err(|e| Error::MalformedFrame(format!("invalid UTF-8 in text: {}", e)))
    }

    /// Read a value type tag.
    pub fn value_type(&mut self) -> Result<ValueType> {
        let tag = self.u8()?;
        ValueType::from_tag(tag)
            .ok_or_else(|| Error::MalformedFrame(format!("unknown value tag {}", tag)))
    }

    /// Read a tagged value.
    pub fn value(&mut self) -> Result<Value> {
        Ok(match self.value_type()? {
            ValueType::Null => Value::Null,
            ValueType::Int => Value::Int(self.i64()?),
            ValueType::Double => Value::Double(self.f64()?),
            ValueType::Text => Value::Text(self.str()?.to_string()),
            ValueType::Blob => Value::Blob(self.blob()?.to_vec()),
        })
    }

    /// Read a tagged value that must be `expected` or NULL.
    pub fn value_as(&mut self, expected: ValueType) -> Result<Value> {
        let value = self.value()?;
        if !value.matches(expected) {
            return Err(Error::MalformedFrame(format!(
                "expected {} value, found {}",
                expected,
                value.value_type()
            )));
        }
        Ok(value)
    }

    /// Ensure the whole payload was consumed.
    pub fn finish(self) -> Result<()> {
        if !self.buf.is_empty() {
            return Err(Error::MalformedFrame(format!(
                "{} trailing bytes after payload",
                self.buf.len()
            )));
        }
        Ok(())
    }
}
