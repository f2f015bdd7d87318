//! sqlwire engine - serves the sqlwire protocol on stdin/stdout.
//!
//! stdout carries response frames only; logs go to stderr, filtered by
//! `SQLWIRE_LOG` (e.g. `SQLWIRE_LOG=debug`). `SQLWIRE_MAX_PAYLOAD` caps the
//! request payload size. The process exits when stdin reaches EOF.

use std::io::{self, BufReader, BufWriter};
use std::process::ExitCode;

use sqlwire::options::{ENGINE_LOG_ENV, ENGINE_MAX_PAYLOAD_ENV};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_env_filter(
            EnvFilter::try_from_env(ENGINE_LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let stdin = io::stdin().lock();
    let stdout = io::stdout().lock();
    let max_payload_size =
        sqlwire::engine::max_payload_from_env(std::env::var(ENGINE_MAX_PAYLOAD_ENV).ok().as_deref());
    tracing::debug!(pid = std::process::id(), max_payload_size, "engine starting");

    match sqlwire::engine::serve_with_max_payload(
        BufReader::new(stdin),
        BufWriter::new(stdout),
        max_payload_size,
    ) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "engine stopped");
            ExitCode::FAILURE
        }
    }
}
