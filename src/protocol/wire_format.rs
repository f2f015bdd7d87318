//! Wire format encoding and decoding.
//!
//! Request header (5 bytes):
//! ```text
//! ┌─────────┬──────────┐
//! │ Command │ Length   │
//! │ 1 byte  │ 4 bytes  │
//! │         │ uint32 BE│
//! └─────────┴──────────┘
//! ```
//!
//! Response header (6 bytes):
//! ```text
//! ┌─────────┬────────┬──────────┐
//! │ Command │ Status │ Length   │
//! │ 1 byte  │ 1 byte │ 4 bytes  │
//! │ (echo)  │        │ uint32 BE│
//! └─────────┴────────┴──────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use std::fmt;

use crate::error::{Error, Result};

/// Protocol version; commands, payloads and statuses change together.
pub const PROTOCOL_VERSION: u8 = 1;

/// Request header size in bytes.
pub const REQUEST_HEADER_SIZE: usize = 5;

/// Response header size in bytes.
pub const RESPONSE_HEADER_SIZE: usize = 6;

/// Default maximum payload size (1 GB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 1_073_741_824;

/// Engine error code used for protocol misuse (matches SQLite's MISUSE).
pub const MISUSE_CODE: i32 = 21;

/// Command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Handshake: protocol, engine and SQLite versions.
    Version = 1,
    /// Open a database.
    Open = 10,
    /// Compile SQL into the active statement.
    Prepare = 11,
    /// Bind one parameter.
    Bind = 12,
    /// Advance the active statement.
    Step = 13,
    /// Rewind the active statement.
    Reset = 14,
    /// Rows changed by the last completed statement.
    Changes = 15,
    /// Read one column of the current row.
    Column = 16,
    /// Release the active statement.
    Finalize = 17,
    /// Close the database.
    Close = 18,
}

impl Command {
    /// Wire code.
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            1 => Command::Version,
            10 => Command::Open,
            11 => Command::Prepare,
            12 => Command::Bind,
            13 => Command::Step,
            14 => Command::Reset,
            15 => Command::Changes,
            16 => Command::Column,
            17 => Command::Finalize,
            18 => Command::Close,
            _ => return None,
        })
    }

    /// Lowercase name for logs and state errors.
    pub fn name(self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::Open => "open",
            Command::Prepare => "prepare",
            Command::Bind => "bind",
            Command::Step => "step",
            Command::Reset => "reset",
            Command::Changes => "changes",
            Command::Column => "column",
            Command::Finalize => "finalize",
            Command::Close => "close",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Success; payload is the command's result.
    Ok = 0,
    /// Engine failure; payload is `code: i32, message: str`.
    Error = 1,
    /// Column cannot be read as the requested type.
    TypeMismatch = 2,
    /// Request not legal in the engine's state, or undecodable.
    Misuse = 3,
}

impl Status {
    /// Parse a wire status.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Status::Ok),
            1 => Some(Status::Error),
            2 => Some(Status::TypeMismatch),
            3 => Some(Status::Misuse),
            _ => None,
        }
    }
}

/// Decoded request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Command being requested.
    pub command: Command,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl RequestHeader {
    /// Create a new request header.
    pub fn new(command: Command, payload_length: u32) -> Self {
        Self {
            command,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; REQUEST_HEADER_SIZE] {
        let mut buf = [0u8; REQUEST_HEADER_SIZE];
        buf[0] = self.command.code();
        buf[1..5].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode and validate a request header.
    pub fn decode(buf: &[u8; REQUEST_HEADER_SIZE], max_payload_size: u32) -> Result<Self> {
        let command = Command::from_code(buf[0])
            .ok_or_else(|| Error::MalformedFrame(format!("unknown command code {}", buf[0])))?;
        let payload_length = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        check_payload_size(payload_length, max_payload_size)?;
        Ok(Self {
            command,
            payload_length,
        })
    }
}

/// Decoded response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    /// Echo of the request's command.
    pub command: Command,
    /// Outcome.
    pub status: Status,
    /// Payload length in bytes.
    pub payload_length: u32,
}

impl ResponseHeader {
    /// Create a new response header.
    pub fn new(command: Command, status: Status, payload_length: u32) -> Self {
        Self {
            command,
            status,
            payload_length,
        }
    }

    /// Encode header to bytes (Big Endian).
    pub fn encode(&self) -> [u8; RESPONSE_HEADER_SIZE] {
        let mut buf = [0u8; RESPONSE_HEADER_SIZE];
        buf[0] = self.command.code();
        buf[1] = self.status as u8;
        buf[2..6].copy_from_slice(&self.payload_length.to_be_bytes());
        buf
    }

    /// Decode and validate a response header.
    pub fn decode(buf: &[u8; RESPONSE_HEADER_SIZE], max_payload_size: u32) -> Result<Self> {
        let command = Command::from_code(buf[0])
            .ok_or_else(|| Error::MalformedFrame(format!("unknown command code {}", buf[0])))?;
        let status = Status::from_code(buf[1])
            .ok_or_else(|| Error::MalformedFrame(format!("unknown status {}", buf[1])))?;
        let payload_length = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
        check_payload_size(payload_length, max_payload_size)?;
        Ok(Self {
            command,
            status,
            payload_length,
        })
    }

    /// Check if this is a success response.
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// Reject payloads above the configured limit.
pub fn check_payload_size(payload_length: u32, max_payload_size: u32) -> Result<()> {
    if payload_length > max_payload_size {
        return Err(Error::MalformedFrame(format!(
            "Payload size {} exceeds maximum {}",
            payload_length, max_payload_size
        )));
    }
    Ok(())
}
