//! Low-level driver - one method per protocol command.
//!
//! The [`Driver`] owns the command channel, the engine process and the
//! state of the single connection and the single active statement:
//!
//! ```text
//! Idle ──prepare──► Prepared ──bind*──► step ──► Row ──column*──► step ...
//!   ▲                  │                  │                         │
//!   └──── finalize ────┴──── reset ◄──────┴────────── Done ◄────────┘
//! ```
//!
//! Calls made in the wrong state fail locally with [`Error::InvalidState`]
//! (or a more specific error) without touching the channel. Every method
//! takes `&mut self`, so only one request can ever be in flight.
//!
//! # Example
//!
//! ```ignore
//! use sqlwire::{Driver, Options, ValueType, MEMORY_DB};
//!
//! let mut db = Driver::new(Options::new()).await?;
//! db.open(MEMORY_DB).await?;
//! db.prepare("SELECT 1").await?;
//! while db.step().await? {
//!     let v = db.column(0, ValueType::Int).await?;
//! }
//! db.finalize().await?;
//! db.close().await?;
//! db.terminate().await?;
//! ```

use bytes::Bytes;

use crate::channel::{BoxedReader, BoxedWriter, Channel};
use crate::codec::{PayloadReader, PayloadWriter};
use crate::error::{Error, Result};
use crate::options::Options;
use crate::process::EngineProcess;
use crate::protocol::{Command, EngineFailure, Status, PROTOCOL_VERSION};
use crate::value::{Value, ValueType};

/// Path that asks the engine for an in-memory database.
pub const MEMORY_DB: &str = ":memory:";

/// Versions reported by the engine during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInfo {
    /// Wire protocol version.
    pub protocol_version: u8,
    /// Engine build version.
    pub engine_version: String,
    /// Version of the SQL library inside the engine.
    pub sqlite_version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Unopened,
    Open,
    Closed,
}

impl ConnectionState {
    fn describe(self) -> &'static str {
        match self {
            ConnectionState::Unopened => "no database is open",
            ConnectionState::Open => "a database is open",
            ConnectionState::Closed => "the database is closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cursor {
    /// Prepared or reset; no step yet.
    Ready,
    /// Last step produced a row.
    Row,
    /// Last step reported completion.
    Done,
}

#[derive(Debug, Clone, Copy)]
struct ActiveStatement {
    parameter_count: usize,
    column_count: usize,
    cursor: Cursor,
}

/// Driver for one engine subprocess.
///
/// Not meant for concurrent use; wrap it in a mutex if several tasks share
/// it.
pub struct Driver {
    channel: Channel,
    process: Option<EngineProcess>,
    info: EngineInfo,
    connection: ConnectionState,
    statement: Option<ActiveStatement>,
}

impl Driver {
    /// Launch the engine and perform the version handshake.
    ///
    /// # Errors
    ///
    /// `LaunchFailed` if the executable can't be started or doesn't speak
    /// this protocol version.
    pub async fn new(options: Options) -> Result<Self> {
        let (process, reader, writer) = EngineProcess::launch(&options)?;
        let path = process.path().to_string();
        let channel = Channel::with_max_payload(reader, writer, options.max_payload_size);

        // On failure the process is dropped, which kills it.
        Self::connect(channel, Some(process))
            .await
            .map_err(|e| Error::LaunchFailed {
                path,
                reason: format!("handshake failed: {}", e),
            })
    }

    /// Speak the protocol over an existing byte stream pair.
    ///
    /// Used for in-process engines; no process is managed.
    pub async fn from_transport(reader: BoxedReader, writer: BoxedWriter) -> Result<Self> {
        Self::connect(Channel::new(reader, writer), None)
            .await
            .map_err(|e| Error::LaunchFailed {
                path: "<transport>".to_string(),
                reason: format!("handshake failed: {}", e),
            })
    }

    async fn connect(channel: Channel, process: Option<EngineProcess>) -> Result<Self> {
        let mut driver = Self {
            channel,
            process,
            info: EngineInfo {
                protocol_version: 0,
                engine_version: String::new(),
                sqlite_version: String::new(),
            },
            connection: ConnectionState::Unopened,
            statement: None,
        };
        driver.info = driver.handshake().await?;
        tracing::debug!(
            engine = %driver.info.engine_version,
            sqlite = %driver.info.sqlite_version,
            "engine handshake complete"
        );
        Ok(driver)
    }

    async fn handshake(&mut self) -> Result<EngineInfo> {
        let payload = self.call(Command::Version, &[]).await?;
        self.decode(&payload, |reader| {
            let protocol_version = reader.u8()?;
            if protocol_version != PROTOCOL_VERSION {
                return Err(Error::MalformedFrame(format!(
                    "engine speaks protocol {}, driver speaks {}",
                    protocol_version, PROTOCOL_VERSION
                )));
            }
            Ok(EngineInfo {
                protocol_version,
                engine_version: reader.str()?.to_string(),
                sqlite_version: reader.str()?.to_string(),
            })
        })
    }

    /// Versions reported by the engine.
    pub fn engine_info(&self) -> &EngineInfo {
        &self.info
    }

    /// OS process id of the engine, if this driver launched one.
    pub fn process_id(&self) -> Option<u32> {
        self.process.as_ref().and_then(EngineProcess::id)
    }

    /// Check if a statement is prepared and not yet finalized.
    pub fn has_active_statement(&self) -> bool {
        self.statement.is_some()
    }

    /// Parameter count of the active statement.
    pub fn parameter_count(&self) -> Option<usize> {
        self.statement.map(|s| s.parameter_count)
    }

    /// Column count of the active statement.
    pub fn column_count(&self) -> Option<usize> {
        self.statement.map(|s| s.column_count)
    }

    /// Open (or create) a database. [`MEMORY_DB`] opens an in-memory one.
    pub async fn open(&mut self, path: &str) -> Result<()> {
        self.channel.ensure_open()?;
        if self.connection != ConnectionState::Unopened {
            return Err(Error::InvalidState {
                operation: "open",
                state: self.connection.describe(),
            });
        }

        let mut writer = PayloadWriter::with_capacity(4 + path.len());
        writer.put_str(path);
        let payload = self.call(Command::Open, &writer.finish()).await?;
        self.expect_empty(&payload)?;

        self.connection = ConnectionState::Open;
        tracing::debug!(path, "database opened");
        Ok(())
    }

    /// Compile `sql` into the active statement.
    ///
    /// # Errors
    ///
    /// - `StatementAlreadyActive` if the previous statement wasn't finalized
    /// - `PrepareFailed` if the engine rejects the SQL (driver stays idle)
    pub async fn prepare(&mut self, sql: &str) -> Result<()> {
        self.require_open("prepare")?;
        if self.statement.is_some() {
            return Err(Error::StatementAlreadyActive);
        }

        let mut writer = PayloadWriter::with_capacity(4 + sql.len());
        writer.put_str(sql);
        let payload = self.call(Command::Prepare, &writer.finish()).await?;

        let (parameter_count, column_count) =
            self.decode(&payload, |reader| Ok((reader.count()?, reader.count()?)))?;

        self.statement = Some(ActiveStatement {
            parameter_count,
            column_count,
            cursor: Cursor::Ready,
        });
        tracing::trace!(sql, parameter_count, column_count, "statement prepared");
        Ok(())
    }

    /// Bind `value` to the 1-indexed parameter `position`.
    pub async fn bind(&mut self, position: usize, value: &Value) -> Result<()> {
        let statement = self.require_statement("bind")?;
        if position == 0 || position > statement.parameter_count {
            return Err(Error::BindFailed(format!(
                "position {} out of range 1..={}",
                position, statement.parameter_count
            )));
        }

        let mut writer = PayloadWriter::new();
        writer.put_i32(position as i32).put_value(value);
        let payload = self.call(Command::Bind, &writer.finish()).await?;
        self.expect_empty(&payload)
    }

    /// Advance the active statement.
    ///
    /// Returns `true` while a row is available, `false` once execution is
    /// complete.
    pub async fn step(&mut self) -> Result<bool> {
        self.require_statement("step")?;

        let payload = match self.call(Command::Step, &[]).await {
            Ok(payload) => payload,
            Err(e) => {
                // The engine resets the statement after a failed step.
                self.set_cursor(Cursor::Ready);
                return Err(e);
            }
        };
        let has_row = self.decode(&payload, |reader| reader.bool())?;

        self.set_cursor(if has_row { Cursor::Row } else { Cursor::Done });
        Ok(has_row)
    }

    /// Read 0-indexed column `index` of the current row as `expected`.
    ///
    /// NULL is returned as [`Value::Null`] whatever `expected` is.
    pub async fn column(&mut self, index: usize, expected: ValueType) -> Result<Value> {
        let statement = self.require_statement("column")?;
        if statement.cursor != Cursor::Row {
            return Err(Error::NoCurrentRow);
        }
        // Out-of-range indexes are reported by the engine
        let wire_index = i32::try_from(index).unwrap_or(i32::MAX);

        let mut writer = PayloadWriter::with_capacity(5);
        writer.put_i32(wire_index).put_u8(expected.tag());
        let payload = match self.request(Command::Column, &writer.finish()).await? {
            Ok(payload) => payload,
            Err(failure) if failure.status == Status::TypeMismatch => {
                return Err(Error::ColumnTypeMismatch {
                    column: index,
                    expected,
                    message: failure.message,
                })
            }
            Err(failure) => return Err(map_failure(Command::Column, failure)),
        };

        self.decode(&payload, |reader| reader.value_as(expected))
    }

    /// Rewind the active statement; bindings are kept.
    pub async fn reset(&mut self) -> Result<()> {
        self.require_statement("reset")?;
        let payload = self.call(Command::Reset, &[]).await?;
        self.expect_empty(&payload)?;
        self.set_cursor(Cursor::Ready);
        Ok(())
    }

    /// Release the active statement.
    pub async fn finalize(&mut self) -> Result<()> {
        self.require_statement("finalize")?;
        let result = self.call(Command::Finalize, &[]).await;
        // The engine releases the statement even when it reports an error.
        self.statement = None;
        self.expect_empty(&result?)?;
        tracing::trace!("statement finalized");
        Ok(())
    }

    /// Rows changed by the most recently completed statement.
    pub async fn changes(&mut self) -> Result<i64> {
        self.require_open("changes")?;
        let payload = self.call(Command::Changes, &[]).await?;
        self.decode(&payload, |reader| reader.i64())
    }

    /// Close the database.
    ///
    /// Closing twice is fine while the engine is alive; once it has exited
    /// this fails with `ChannelClosed`.
    pub async fn close(&mut self) -> Result<()> {
        self.channel.ensure_open()?;
        if self.statement.is_some() {
            return Err(Error::InvalidState {
                operation: "close",
                state: "a statement is active",
            });
        }

        let payload = self.call(Command::Close, &[]).await?;
        self.expect_empty(&payload)?;

        if self.connection != ConnectionState::Closed {
            tracing::debug!("database closed");
        }
        self.connection = ConnectionState::Closed;
        Ok(())
    }

    /// Close the engine's stdin and wait for it to exit.
    ///
    /// The process is reaped even if the engine already closed its end, in
    /// which case this reports `ChannelClosed`.
    pub async fn terminate(self) -> Result<()> {
        let Driver {
            mut channel,
            process,
            ..
        } = self;
        let shutdown = channel.shutdown().await;
        if let Err(e) = &shutdown {
            tracing::debug!(error = %e, "engine stdin already closed");
        }
        // Pipe shutdown is a no-op; stdin only closes when the handle drops.
        drop(channel);

        if let Some(process) = process {
            process.wait().await?;
        }
        shutdown
    }

    /// Force-stop the engine. Later calls fail with `ChannelClosed`.
    pub async fn kill(&mut self) -> Result<()> {
        if let Some(process) = self.process.as_mut() {
            process.kill().await?;
        }
        Ok(())
    }

    fn require_open(&self, operation: &'static str) -> Result<()> {
        self.channel.ensure_open()?;
        if self.connection != ConnectionState::Open {
            return Err(Error::InvalidState {
                operation,
                state: self.connection.describe(),
            });
        }
        Ok(())
    }

    fn require_statement(&self, operation: &'static str) -> Result<ActiveStatement> {
        self.require_open(operation)?;
        self.statement.ok_or(Error::InvalidState {
            operation,
            state: "no statement is active",
        })
    }

    fn set_cursor(&mut self, cursor: Cursor) {
        if let Some(statement) = self.statement.as_mut() {
            statement.cursor = cursor;
        }
    }

    /// One round trip; engine failures are returned, not mapped.
    async fn request(
        &mut self,
        command: Command,
        payload: &[u8],
    ) -> Result<std::result::Result<Bytes, EngineFailure>> {
        let response = self.channel.round_trip(command, payload).await?;
        self.channel.check_decoded(response.into_outcome())
    }

    /// Decode a whole response payload with `read`.
    ///
    /// Leftover bytes or a failed read poison the channel.
    fn decode<'a, T>(
        &mut self,
        payload: &'a [u8],
        read: impl FnOnce(&mut PayloadReader<'a>) -> Result<T>,
    ) -> Result<T> {
        let mut reader = PayloadReader::new(payload);
        let decoded = read(&mut reader).and_then(|value| reader.finish().map(|()| value));
        self.channel.check_decoded(decoded)
    }

    fn expect_empty(&mut self, payload: &[u8]) -> Result<()> {
        self.decode(payload, |_| Ok(()))
    }

    /// One round trip; engine failures are mapped to the command's error.
    async fn call(&mut self, command: Command, payload: &[u8]) -> Result<Bytes> {
        self.request(command, payload)
            .await?
            .map_err(|failure| map_failure(command, failure))
    }
}

/// Map an engine failure to the error kind of the command that caused it.
fn map_failure(command: Command, failure: EngineFailure) -> Error {
    let EngineFailure {
        status,
        code,
        message,
    } = failure;
    if status == Status::Misuse {
        return Error::EngineError { code, message };
    }
    match command {
        Command::Open => Error::OpenFailed { code, message },
        Command::Prepare => Error::PrepareFailed { code, message },
        Command::Bind => Error::BindFailed(message),
        Command::Step => Error::StepFailed { code, message },
        _ => Error::EngineError { code, message },
    }
}
