//! Blocking frame I/O for the engine side of the channel.

use std::io::{ErrorKind, Read, Write};

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::protocol::{
    build_response, Command, EngineFailure, Request, RequestHeader, Status,
    DEFAULT_MAX_PAYLOAD_SIZE, REQUEST_HEADER_SIZE,
};

/// Outcome of one request, before framing.
pub(crate) type Reply = std::result::Result<Bytes, EngineFailure>;

/// Reads request frames and writes response frames.
pub(crate) struct FrameIo<R, W> {
    reader: R,
    writer: W,
    max_payload_size: u32,
}

impl<R: Read, W: Write> FrameIo<R, W> {
    pub(crate) fn new(reader: R, writer: W) -> Self {
        Self::with_max_payload(reader, writer, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    pub(crate) fn with_max_payload(reader: R, writer: W, max_payload_size: u32) -> Self {
        Self {
            reader,
            writer,
            max_payload_size,
        }
    }

    /// Read the next request.
    ///
    /// Returns `Ok(None)` on a clean EOF between frames.
    pub(crate) fn read_request(&mut self) -> Result<Option<Request>> {
        let mut header = [0u8; REQUEST_HEADER_SIZE];
        let mut filled = 0;
        while filled < REQUEST_HEADER_SIZE {
            match self.reader.read(&mut header[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(Error::TruncatedFrame {
                        needed: REQUEST_HEADER_SIZE,
                        remaining: filled,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let header = RequestHeader::decode(&header, self.max_payload_size)?;
        let mut payload = vec![0u8; header.payload_length as usize];
        self.reader.read_exact(&mut payload)?;
        Ok(Some(Request::new(header, Bytes::from(payload))))
    }

    /// Write one response frame and flush it.
    pub(crate) fn respond(&mut self, command: Command, reply: Reply) -> Result<()> {
        let frame = match reply {
            Ok(payload) => build_response(command, Status::Ok, &payload),
            Err(failure) => {
                tracing::debug!(
                    command = %command,
                    code = failure.code,
                    message = %failure.message,
                    "request failed"
                );
                build_response(command, failure.status, &failure.encode())
            }
        };
        self.writer.write_all(&frame)?;
        self.writer.flush()?;
        Ok(())
    }
}
