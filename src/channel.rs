//! Command channel - strict request/response alternation over a byte stream.
//!
//! The channel owns the two halves of the engine's stdio (or any other
//! async byte stream pair) and enforces that exactly one request is in
//! flight at a time:
//!
//! ```text
//!           send()              receive()
//! Ready ──► Sending ──► AwaitingResponse ──► Receiving ──► Ready
//!              │                                 │
//!              └──── I/O error / bad frame ──────┴──► Poisoned
//! ```
//!
//! A call that finds the channel in `Sending` or `Receiving` means an earlier
//! call was dropped mid-frame (e.g. a cancelled future). The byte stream is
//! then out of sync, so the channel poisons itself.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

use crate::error::{Error, Result};
use crate::protocol::{
    check_payload_size, Command, RequestHeader, Response, ResponseHeader,
    DEFAULT_MAX_PAYLOAD_SIZE, RESPONSE_HEADER_SIZE,
};

/// Type-erased read half of the engine stream.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Type-erased write half of the engine stream.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Sending(Command),
    AwaitingResponse(Command),
    Receiving(Command),
    Poisoned,
}

/// Lock-step duplex channel to one engine.
pub struct Channel {
    reader: BufReader<BoxedReader>,
    writer: BufWriter<BoxedWriter>,
    state: State,
    max_payload_size: u32,
}

impl Channel {
    /// Create a channel with the default maximum payload size.
    pub fn new(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self::with_max_payload(reader, writer, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a channel with a custom maximum payload size.
    pub fn with_max_payload(reader: BoxedReader, writer: BoxedWriter, max_payload_size: u32) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            state: State::Ready,
            max_payload_size,
        }
    }

    /// Check if the channel refuses all further traffic.
    #[inline]
    pub fn is_poisoned(&self) -> bool {
        self.state == State::Poisoned
    }

    /// Fail with `ChannelClosed` if the channel is poisoned.
    #[inline]
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_poisoned() {
            return Err(Error::ChannelClosed);
        }
        Ok(())
    }

    /// Command whose response is outstanding, if any.
    pub fn pending(&self) -> Option<Command> {
        match self.state {
            State::AwaitingResponse(command) => Some(command),
            _ => None,
        }
    }

    /// Write one request frame and flush it.
    ///
    /// # Errors
    ///
    /// - `ProtocolOutOfOrder` if a response is still outstanding
    /// - `MalformedFrame` if the payload exceeds the maximum (nothing written)
    /// - `ChannelClosed` if the stream is gone
    pub async fn send(&mut self, command: Command, payload: &[u8]) -> Result<()> {
        match self.state {
            State::Ready => {}
            State::Poisoned => return Err(Error::ChannelClosed),
            State::AwaitingResponse(_) => {
                return Err(Error::ProtocolOutOfOrder(
                    "request sent while a response is outstanding",
                ))
            }
            State::Sending(_) | State::Receiving(_) => return Err(self.abandoned()),
        }

        let payload_length = frame_length(payload.len(), self.max_payload_size)?;

        self.state = State::Sending(command);
        let header = RequestHeader::new(command, payload_length);
        if let Err(e) = write_frame(&mut self.writer, &header.encode(), payload).await {
            return Err(self.lost(e));
        }
        self.state = State::AwaitingResponse(command);

        tracing::trace!(%command, payload_length, "request sent");
        Ok(())
    }

    /// Read the response to the outstanding request.
    ///
    /// # Errors
    ///
    /// - `ProtocolOutOfOrder` if no request is outstanding
    /// - `MalformedFrame` if the header is invalid or echoes another command
    /// - `ChannelClosed` if the stream is gone
    pub async fn receive(&mut self) -> Result<Response> {
        let command = match self.state {
            State::AwaitingResponse(command) => command,
            State::Poisoned => return Err(Error::ChannelClosed),
            State::Ready => {
                return Err(Error::ProtocolOutOfOrder(
                    "response read without an outstanding request",
                ))
            }
            State::Sending(_) | State::Receiving(_) => return Err(self.abandoned()),
        };
        self.state = State::Receiving(command);

        let mut header_buf = [0u8; RESPONSE_HEADER_SIZE];
        if let Err(e) = self.reader.read_exact(&mut header_buf).await {
            return Err(self.lost(e));
        }

        let header = match ResponseHeader::decode(&header_buf, self.max_payload_size) {
            Ok(header) => header,
            Err(e) => return Err(self.malformed(e)),
        };
        if header.command != command {
            return Err(self.malformed(Error::MalformedFrame(format!(
                "response for {} while awaiting {}",
                header.command, command
            ))));
        }

        let mut payload = BytesMut::zeroed(header.payload_length as usize);
        if let Err(e) = self.reader.read_exact(&mut payload).await {
            return Err(self.lost(e));
        }
        self.state = State::Ready;

        tracing::trace!(%command, status = ?header.status, payload_length = header.payload_length, "response received");
        Ok(Response::new(header, payload.freeze()))
    }

    /// Send a request and wait for its response.
    pub async fn round_trip(&mut self, command: Command, payload: &[u8]) -> Result<Response> {
        self.send(command, payload).await?;
        self.receive().await
    }

    /// Poison the channel if decoding a response payload failed.
    ///
    /// A payload that doesn't decode means the engine and the driver no
    /// longer agree on the protocol, so no further request is sent.
    pub fn check_decoded<T>(&mut self, decoded: Result<T>) -> Result<T> {
        match decoded {
            Err(e @ (Error::MalformedFrame(_) | Error::TruncatedFrame { .. })) => {
                Err(self.malformed(e))
            }
            other => other,
        }
    }

    /// Flush and close the write half; the engine sees EOF.
    ///
    /// The channel is unusable afterwards. Fails with `ChannelClosed` if the
    /// engine already closed its end.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.is_poisoned() {
            return Ok(());
        }
        if let Err(e) = self.writer.shutdown().await {
            return Err(self.lost(e));
        }
        self.state = State::Poisoned;
        Ok(())
    }

    fn lost(&mut self, err: io::Error) -> Error {
        tracing::warn!(error = %err, "engine channel lost");
        self.state = State::Poisoned;
        Error::ChannelClosed
    }

    fn malformed(&mut self, err: Error) -> Error {
        tracing::warn!(error = %err, "malformed response, poisoning channel");
        self.state = State::Poisoned;
        err
    }

    fn abandoned(&mut self) -> Error {
        tracing::warn!(state = ?self.state, "previous round trip abandoned mid-frame, poisoning channel");
        self.state = State::Poisoned;
        Error::ProtocolOutOfOrder("previous round trip was abandoned mid-frame")
    }
}

/// Payload length as written in the header, checked against the maximum.
fn frame_length(len: usize, max_payload_size: u32) -> Result<u32> {
    let length = u32::try_from(len).map_err(|_| {
        Error::MalformedFrame(format!(
            "Payload size {} exceeds maximum {}",
            len, max_payload_size
        ))
    })?;
    check_payload_size(length, max_payload_size)?;
    Ok(length)
}

async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: &[u8],
    payload: &[u8],
) -> io::Result<()> {
    writer.write_all(header).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}
