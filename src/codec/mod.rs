//! Codec module - typed primitives and tagged values on the wire.
//!
//! - [`PayloadWriter`] - builds a payload from primitives (over `BytesMut`)
//! - [`PayloadReader`] - decodes a payload with bounds checks
//!
//! Layout rules:
//!
//! ```text
//! i32 / u32 / i64   fixed width, Big Endian
//! f64               IEEE-754 bits, Big Endian
//! bool              1 byte (0 or 1)
//! str / blob        u32 length + raw bytes
//! value             1 tag byte + data for that tag (nothing for NULL)
//! ```
//!
//! # Example
//!
//! ```
//! use sqlwire::codec::{decode_value, encode_value};
//! use sqlwire::Value;
//!
//! let v = Value::Text("User_1".into());
//! assert_eq!(decode_value(&encode_value(&v)).unwrap(), v);
//! ```

mod reader;
mod writer;

pub use reader::PayloadReader;
pub use writer::PayloadWriter;

use bytes::Bytes;

use crate::error::Result;
use crate::value::{Value, ValueType};

/// Encode one tagged value.
pub fn encode_value(value: &Value) -> Bytes {
    let mut writer = PayloadWriter::new();
    writer.put_value(value);
    writer.finish()
}

/// Decode one tagged value; the buffer must hold exactly that value.
pub fn decode_value(buf: &[u8]) -> Result<Value> {
    let mut reader = PayloadReader::new(buf);
    let value = reader.value()?;
    reader.finish()?;
    Ok(value)
}

/// Decode one tagged value that must be `expected` or NULL.
pub fn decode_value_as(buf: &[u8], expected: ValueType) -> Result<Value> {
    let mut reader = PayloadReader::new(buf);
    let value = reader.value_as(expected)?;
    reader.finish()?;
    Ok(value)
}
