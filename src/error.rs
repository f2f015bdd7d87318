//! Error types for sqlwire.

use thiserror::Error;

use crate::value::ValueType;

/// Main error type for all sqlwire operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The engine executable could not be started or failed the handshake.
    #[error("Failed to launch engine {path}: {reason}")]
    LaunchFailed {
        /// Path of the engine executable.
        path: String,
        /// Why the launch failed.
        reason: String,
    },

    /// The byte stream to the engine is gone (exit, broken pipe, EOF).
    ///
    /// The channel is poisoned; every later call fails the same way.
    #[error("Channel closed")]
    ChannelClosed,

    /// A request was sent while another one was outstanding, or a response
    /// was read without a request.
    #[error("Protocol out of order: {0}")]
    ProtocolOutOfOrder(&'static str),

    /// A frame or payload could not be decoded.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// A length prefix points past the end of the payload.
    #[error("Truncated frame: need {needed} bytes, {remaining} remaining")]
    TruncatedFrame {
        /// Bytes the decoder needed.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// The operation is not legal in the driver's current state.
    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        /// Operation that was attempted.
        operation: &'static str,
        /// State the driver was in.
        state: &'static str,
    },

    /// `prepare` was called before the previous statement was finalized.
    #[error("Statement already active; finalize it first")]
    StatementAlreadyActive,

    /// The engine refused to open the database.
    #[error("Open failed ({code}): {message}")]
    OpenFailed {
        /// Engine error code.
        code: i32,
        /// Engine error message.
        message: String,
    },

    /// The engine refused to compile the SQL text.
    #[error("Prepare failed ({code}): {message}")]
    PrepareFailed {
        /// Engine error code.
        code: i32,
        /// Engine error message.
        message: String,
    },

    /// A parameter could not be bound.
    #[error("Bind failed: {0}")]
    BindFailed(String),

    /// Executing the statement failed (constraint violation, etc.).
    #[error("Step failed ({code}): {message}")]
    StepFailed {
        /// Engine error code.
        code: i32,
        /// Engine error message.
        message: String,
    },

    /// The engine cannot read the column as the requested type.
    #[error("Column {column} cannot be read as {expected}: {message}")]
    ColumnTypeMismatch {
        /// 0-indexed column.
        column: usize,
        /// Requested type.
        expected: ValueType,
        /// Engine explanation.
        message: String,
    },

    /// `column` was called while no row is available.
    #[error("No current row")]
    NoCurrentRow,

    /// The declared column schema doesn't fit the statement.
    #[error("Schema declares {declared} columns, statement produces {actual}")]
    SchemaMismatch {
        /// Number of declared column types.
        declared: usize,
        /// Number of columns the statement produces.
        actual: usize,
    },

    /// A value was read as a type it doesn't carry.
    #[error("Type mismatch: expected {expected}, found {actual}")]
    TypeMismatch {
        /// Requested type.
        expected: ValueType,
        /// Actual tag of the value.
        actual: ValueType,
    },

    /// Any other failure reported by the engine.
    #[error("Engine error ({code}): {message}")]
    EngineError {
        /// Engine error code.
        code: i32,
        /// Engine error message.
        message: String,
    },

    /// I/O error outside the command channel (process management).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the driver instance is unusable after this error.
    ///
    /// Channel loss and malformed frames poison the channel; everything
    /// else only ends the current statement's lifecycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ChannelClosed
                | Error::MalformedFrame(_)
                | Error::TruncatedFrame { .. }
                | Error::LaunchFailed { .. }
        )
    }
}

/// Result type alias using sqlwire's Error.
pub type Result<T> = std::result::Result<T, Error>;
