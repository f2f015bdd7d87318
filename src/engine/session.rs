//! Request dispatch for one engine session.
//!
//! SQLite statements and row cursors borrow the connection, so the session
//! is a stack of nested scopes rather than a struct holding handles:
//!
//! ```text
//! session_scope      Option<Connection>     Version Open Prepare Changes Close
//!   statement_scope  Statement<'conn>       Bind Step Reset Changes Finalize
//!     row_scope      Rows<'stmt>            Step Column Changes Reset Finalize
//! ```
//!
//! A scope returns to its parent when the client leaves it (reset, finalize)
//! and the parent sends the reply. Any command a scope doesn't accept is
//! answered with `Misuse` and the scope stays where it is.

use std::io::{Read, Write};

use bytes::Bytes;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, Row, Statement};

use super::io::{FrameIo, Reply};
use crate::codec::{PayloadReader, PayloadWriter};
use crate::error::{Error, Result};
use crate::protocol::{Command, EngineFailure, Status, MISUSE_CODE, PROTOCOL_VERSION};
use crate::value::{Value, ValueType};

/// Primary SQLite result code for a datatype mismatch.
const SQLITE_MISMATCH: i32 = 20;

/// How a row scope ended.
enum Exit {
    /// Client sent Reset.
    Reset,
    /// Client sent Finalize.
    Finalize,
    /// First step failed; already answered.
    StepFailed,
    /// Input closed.
    Eof,
}

/// Serve requests until the input closes.
pub(crate) fn session_scope<R: Read, W: Write>(io: &mut FrameIo<R, W>) -> Result<()> {
    let mut connection: Option<Connection> = None;

    while let Some(request) = io.read_request()? {
        let command = request.command();
        tracing::trace!(command = %command, len = request.payload().len(), "request");

        let reply = match command {
            Command::Version => Ok(version()),
            Command::Open => open(&mut connection, request.payload()),
            Command::Close => close(&mut connection),
            Command::Changes => match &connection {
                Some(conn) => Ok(changes(conn)),
                None => Err(misuse("no database is open")),
            },
            Command::Prepare => {
                let Some(conn) = &connection else {
                    io.respond(command, Err(misuse("no database is open")))?;
                    continue;
                };
                match prepare(conn, request.payload()) {
                    Ok((statement, counts)) => {
                        io.respond(command, Ok(counts))?;
                        if statement_scope(io, conn, statement)? {
                            continue;
                        }
                        tracing::debug!("input closed with a statement active");
                        return Ok(());
                    }
                    Err(failure) => Err(failure),
                }
            }
            other => Err(misuse(format!("{} without a prepared statement", other))),
        };
        io.respond(command, reply)?;
    }

    tracing::debug!("input closed");
    Ok(())
}

/// Serve requests against one prepared statement.
///
/// Returns `false` if the input closed before the statement was finalized.
fn statement_scope<R: Read, W: Write>(
    io: &mut FrameIo<R, W>,
    conn: &Connection,
    mut statement: Statement<'_>,
) -> Result<bool> {
    loop {
        let Some(request) = io.read_request()? else {
            return Ok(false);
        };
        let command = request.command();
        tracing::trace!(command = %command, "statement request");

        let reply = match command {
            Command::Version => Ok(version()),
            Command::Bind => bind(&mut statement, request.payload()),
            // Not stepping, so the statement is already at its start
            Command::Reset => Ok(Bytes::new()),
            Command::Changes => Ok(changes(conn)),
            Command::Finalize => {
                let reply = finalize(statement);
                io.respond(command, reply)?;
                return Ok(true);
            }
            Command::Step => match row_scope(io, conn, &mut statement)? {
                Exit::Reset => {
                    io.respond(Command::Reset, Ok(Bytes::new()))?;
                    continue;
                }
                Exit::Finalize => {
                    let reply = finalize(statement);
                    io.respond(Command::Finalize, reply)?;
                    return Ok(true);
                }
                Exit::StepFailed => continue,
                Exit::Eof => return Ok(false),
            },
            other => Err(misuse(format!("{} while a statement is active", other))),
        };
        io.respond(command, reply)?;
    }
}

/// Execute the statement and serve requests against its rows.
///
/// Answers the Step that started it. Dropping the cursor on the way out
/// resets the statement.
fn row_scope<R: Read, W: Write>(
    io: &mut FrameIo<R, W>,
    conn: &Connection,
    statement: &mut Statement<'_>,
) -> Result<Exit> {
    let mut rows = statement.raw_query();
    let mut row = match rows.next() {
        Ok(row) => row,
        Err(e) => {
            io.respond(Command::Step, Err(failure(&e)))?;
            return Ok(Exit::StepFailed);
        }
    };
    io.respond(Command::Step, Ok(has_row(row.is_some())))?;

    loop {
        let Some(request) = io.read_request()? else {
            return Ok(Exit::Eof);
        };
        let command = request.command();

        let reply = match command {
            Command::Version => Ok(version()),
            Command::Step => match rows.next() {
                Ok(next) => {
                    row = next;
                    Ok(has_row(row.is_some()))
                }
                Err(e) => {
                    io.respond(command, Err(failure(&e)))?;
                    return Ok(Exit::StepFailed);
                }
            },
            Command::Column => column(row, request.payload()),
            Command::Changes => Ok(changes(conn)),
            Command::Reset => return Ok(Exit::Reset),
            Command::Finalize => return Ok(Exit::Finalize),
            other => Err(misuse(format!("{} while stepping; reset first", other))),
        };
        io.respond(command, reply)?;
    }
}

fn version() -> Bytes {
    let mut writer = PayloadWriter::new();
    writer
        .put_u8(PROTOCOL_VERSION)
        .put_str(env!("CARGO_PKG_VERSION"))
        .put_str(rusqlite::version());
    writer.finish()
}

fn open(connection: &mut Option<Connection>, payload: &[u8]) -> Reply {
    if connection.is_some() {
        return Err(misuse("a database is already open"));
    }
    let mut reader = PayloadReader::new(payload);
    let path = reader.str().map_err(undecodable)?;
    reader.finish().map_err(undecodable)?;

    let conn = Connection::open(path).map_err(|e| failure(&e))?;
    tracing::debug!(path, "database opened");
    *connection = Some(conn);
    Ok(Bytes::new())
}

fn close(connection: &mut Option<Connection>) -> Reply {
    let Some(conn) = connection.take() else {
        return Ok(Bytes::new());
    };
    match conn.close() {
        Ok(()) => {
            tracing::debug!("database closed");
            Ok(Bytes::new())
        }
        Err((conn, e)) => {
            *connection = Some(conn);
            Err(failure(&e))
        }
    }
}

fn changes(conn: &Connection) -> Bytes {
    let mut writer = PayloadWriter::with_capacity(8);
    writer.put_i64(conn.changes() as i64);
    writer.finish()
}

fn prepare<'conn>(
    conn: &'conn Connection,
    payload: &[u8],
) -> std::result::Result<(Statement<'conn>, Bytes), EngineFailure> {
    let mut reader = PayloadReader::new(payload);
    let sql = reader.str().map_err(undecodable)?;
    reader.finish().map_err(undecodable)?;

    let statement = conn.prepare(sql).map_err(|e| failure(&e))?;
    let mut writer = PayloadWriter::with_capacity(8);
    writer
        .put_i32(statement.parameter_count() as i32)
        .put_i32(statement.column_count() as i32);
    tracing::trace!(sql, "statement prepared");
    Ok((statement, writer.finish()))
}

fn bind(statement: &mut Statement<'_>, payload: &[u8]) -> Reply {
    let mut reader = PayloadReader::new(payload);
    let position = reader.i32().map_err(undecodable)?;
    let value = reader.value().map_err(undecodable)?;
    reader.finish().map_err(undecodable)?;

    let position = usize::try_from(position)
        .map_err(|_| misuse(format!("negative bind position {}", position)))?;
    statement
        .raw_bind_parameter(position, to_sql(value))
        .map_err(|e| failure(&e))?;
    Ok(Bytes::new())
}

fn column(row: Option<&Row<'_>>, payload: &[u8]) -> Reply {
    let mut reader = PayloadReader::new(payload);
    let index = reader.i32().map_err(undecodable)?;
    let expected = reader.value_type().map_err(undecodable)?;
    reader.finish().map_err(undecodable)?;

    let Some(row) = row else {
        return Err(misuse("no current row"));
    };
    let index = usize::try_from(index)
        .map_err(|_| misuse(format!("negative column index {}", index)))?;
    let cell = row.get_ref(index).map_err(|e| failure(&e))?;

    let value = coerce(cell, expected).ok_or_else(|| {
        EngineFailure::new(
            Status::TypeMismatch,
            SQLITE_MISMATCH,
            format!(
                "column {} holds {}, cannot read as {}",
                index,
                cell.data_type(),
                expected
            ),
        )
    })?;

    let mut writer = PayloadWriter::new();
    writer.put_value(&value);
    Ok(writer.finish())
}

fn finalize(statement: Statement<'_>) -> Reply {
    statement.finalize().map_err(|e| failure(&e))?;
    tracing::trace!("statement finalized");
    Ok(Bytes::new())
}

fn has_row(row: bool) -> Bytes {
    let mut writer = PayloadWriter::with_capacity(1);
    writer.put_bool(row);
    writer.finish()
}

/// Read a cell as `expected`, widening where no information is lost.
///
/// NULL reads as [`Value::Null`] for every type.
pub(crate) fn coerce(cell: ValueRef<'_>, expected: ValueType) -> Option<Value> {
    match (cell, expected) {
        (ValueRef::Null, _) => Some(Value::Null),
        (ValueRef::Integer(i), ValueType::Int) => Some(Value::Int(i)),
        (ValueRef::Integer(i), ValueType::Double) => Some(Value::Double(i as f64)),
        (ValueRef::Real(f), ValueType::Double) => Some(Value::Double(f)),
        (ValueRef::Text(t), ValueType::Text) => std::str::from_utf8(t)
            .ok()
            .map(|s| Value::Text(s.to_string())),
        (ValueRef::Text(t), ValueType::Blob) => Some(Value::Blob(t.to_vec())),
        (ValueRef::Blob(b), ValueType::Blob) => Some(Value::Blob(b.to_vec())),
        _ => None,
    }
}

fn to_sql(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Int(i) => SqlValue::Integer(i),
        Value::Double(f) => SqlValue::Real(f),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Blob(b),
    }
}

fn error_code(e: &rusqlite::Error) -> i32 {
    match e {
        rusqlite::Error::SqliteFailure(err, _) => err.extended_code,
        _ => -1,
    }
}

fn failure(e: &rusqlite::Error) -> EngineFailure {
    EngineFailure::new(Status::Error, error_code(e), e.to_string())
}

fn misuse(message: impl Into<String>) -> EngineFailure {
    EngineFailure::new(Status::Misuse, MISUSE_CODE, message)
}

fn undecodable(e: Error) -> EngineFailure {
    misuse(format!("undecodable request: {}", e))
}
