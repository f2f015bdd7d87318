//! Payload writer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::value::Value;

/// Builds a payload from typed primitives.
///
/// Writes never fail; lengths above `u32::MAX` are a caller bug and are
/// caught by the frame size check before anything reaches the wire.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: BytesMut,
}

impl PayloadWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Append a single byte.
    #[inline]
    pub fn put_u8(&mut self, v: u8) -> &mut Self {
        self.buf.put_u8(v);
        self
    }

    /// Append a bool as one byte.
    #[inline]
    pub fn put_bool(&mut self, v: bool) -> &mut Self {
        self.buf.put_u8(v as u8);
        self
    }

    /// Append a Big Endian i32.
    #[inline]
    pub fn put_i32(&mut self, v: i32) -> &mut Self {
        self.buf.put_i32(v);
        self
    }

    /// Append a Big Endian i64.
    #[inline]
    pub fn put_i64(&mut self, v: i64) -> &mut Self {
        self.buf.put_i64(v);
        self
    }

    /// Append a Big Endian f64.
    #[inline]
    pub fn put_f64(&mut self, v: f64) -> &mut Self {
        self.buf.put_f64(v);
        self
    }

    /// Append a length-prefixed UTF-8 string.
    pub fn put_str(&mut self, v: &str) -> &mut Self {
        self.put_blob(v.as_bytes())
    }

    /// Append a length-prefixed byte string.
    pub fn put_blob(&mut self, v: &[u8]) -> &mut Self {
        self.buf.put_u32(v.len() as u32);
        self.buf.put_slice(v);
        self
    }

    /// Append a tagged value.
    pub fn put_value(&mut self, value: &Value) -> &mut Self {
        self.buf.put_u8(value.value_type().tag());
        match value {
            Value::Null => {}
            Value::Int(v) => {
                self.buf.put_i64(*v);
            }
            Value::Double(v) => {
                self.buf.put_f64(*v);
            }
            Value::Text(v) => {
                self.put_str(v);
            }
            Value::Blob(v) => {
                self.put_blob(v);
            }
        }
        self
    }

    /// Bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check if nothing was written.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Freeze into an immutable payload.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}
