//! # sqlwire
//!
//! Async driver for a SQL engine running as a child process.
//!
//! The driver talks to the engine over its stdin/stdout with a small binary
//! request/response protocol. Exactly one request is in flight at a time.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   Batch Layer (exec, exec_one, query)
//! │   Driver   │   Low-Level Driver (open, prepare, bind, step, column, ...)
//! ├────────────┤
//! │  Channel   │   lock-step framing, state guard
//! ├────────────┤          stdin ──► request frames
//! │   Codec    │          stdout ◄── response frames
//! └────────────┘          stderr ──► tracing
//!        │
//!   sqlwire-engine (rusqlite)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use sqlwire::{Driver, Options, Value, ValueType, MEMORY_DB};
//!
//! #[tokio::main]
//! async fn main() -> sqlwire::Result<()> {
//!     let mut db = Driver::new(Options::new()).await?;
//!     db.open(MEMORY_DB).await?;
//!     db.exec_one("CREATE TABLE t (name TEXT, rating REAL)").await?;
//!     db.exec(
//!         "INSERT INTO t VALUES (?, ?)",
//!         2,
//!         2,
//!         &["a".into(), 4.5.into(), "b".into(), Value::Null],
//!     )
//!     .await?;
//!
//!     let rows = db
//!         .query("SELECT name, rating FROM t", &[], &[ValueType::Text, ValueType::Double])
//!         .await?;
//!     assert_eq!(rows.len(), 2);
//!
//!     db.close().await?;
//!     db.terminate().await
//! }
//! ```

pub mod channel;
pub mod codec;
pub mod error;
pub mod options;
pub mod protocol;
pub mod value;

#[cfg(feature = "engine")]
pub mod engine;

mod batch;
mod driver;
mod process;

pub use batch::ExecError;
pub use driver::{Driver, EngineInfo, MEMORY_DB};
pub use error::{Error, Result};
pub use options::{Options, StderrMode};
pub use value::{Row, Value, ValueType};
