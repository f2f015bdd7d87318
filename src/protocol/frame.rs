//! Request/response frames and engine failure payloads.
//!
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use sqlwire::protocol::{build_request, Command, REQUEST_HEADER_SIZE};
//!
//! let bytes = build_request(Command::Step, b"");
//! assert_eq!(bytes.len(), REQUEST_HEADER_SIZE);
//! assert_eq!(bytes[0], Command::Step.code());
//! ```

use bytes::Bytes;

use super::wire_format::{
    Command, RequestHeader, ResponseHeader, Status, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE,
};
use crate::codec::{PayloadReader, PayloadWriter};
use crate::error::Result;

/// A complete request frame.
#[derive(Debug, Clone)]
pub struct Request {
    /// Decoded header.
    pub header: RequestHeader,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Request {
    /// Create a new request.
    pub fn new(header: RequestHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get the command.
    #[inline]
    pub fn command(&self) -> Command {
        self.header.command
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// A complete response frame.
#[derive(Debug, Clone)]
pub struct Response {
    /// Decoded header.
    pub header: ResponseHeader,
    /// Payload bytes.
    pub payload: Bytes,
}

impl Response {
    /// Create a new response.
    pub fn new(header: ResponseHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get the echoed command.
    #[inline]
    pub fn command(&self) -> Command {
        self.header.command
    }

    /// Get the status.
    #[inline]
    pub fn status(&self) -> Status {
        self.header.status
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Split into the success payload or the engine's failure.
    ///
    /// The outer `Result` fails only if a failure payload can't be decoded.
    pub fn into_outcome(self) -> Result<std::result::Result<Bytes, EngineFailure>> {
        if self.header.is_ok() {
            return Ok(Ok(self.payload));
        }
        let failure = EngineFailure::decode(self.header.status, &self.payload)?;
        Ok(Err(failure))
    }
}

/// Failure reported by the engine in a non-Ok response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineFailure {
    /// Response status (never `Ok`).
    pub status: Status,
    /// Engine error code.
    pub code: i32,
    /// Engine error message.
    pub message: String,
}

impl EngineFailure {
    /// Create a new failure.
    pub fn new(status: Status, code: i32, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Encode `code: i32, message: str`.
    pub fn encode(&self) -> Bytes {
        let mut writer = PayloadWriter::with_capacity(8 + self.message.len());
        writer.put_i32(self.code).put_str(&self.message);
        writer.finish()
    }

    /// Decode a failure payload.
    pub fn decode(status: Status, payload: &[u8]) -> Result<Self> {
        let mut reader = PayloadReader::new(payload);
        let code = reader.i32()?;
        let message = reader.str()?.to_string();
        reader.finish()?;
        Ok(Self {
            status,
            code,
            message,
        })
    }
}

/// Build a request frame as a single byte vector.
pub fn build_request(command: Command, payload: &[u8]) -> Vec<u8> {
    let header = RequestHeader::new(command, payload.len() as u32);
    let mut buf = Vec::with_capacity(REQUEST_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}

/// Build a response frame as a single byte vector.
pub fn build_response(command: Command, status: Status, payload: &[u8]) -> Vec<u8> {
    let header = ResponseHeader::new(command, status, payload.len() as u32);
    let mut buf = Vec::with_capacity(RESPONSE_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}
