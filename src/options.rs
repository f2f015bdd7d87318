//! Driver configuration.
//!
//! [`Options`] has sensible defaults and a fluent API, and derives serde so a
//! host can embed it in its own configuration file.
//!
//! # Example
//!
//! ```
//! use sqlwire::{Options, StderrMode};
//!
//! let options = Options::new()
//!     .engine_path("/usr/local/bin/sqlwire-engine")
//!     .engine_log("debug")
//!     .stderr(StderrMode::Inherit);
//!
//! assert_eq!(options.stderr, StderrMode::Inherit);
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE;

/// Default engine executable, resolved through `PATH`.
pub const DEFAULT_ENGINE_PATH: &str = "sqlwire-engine";

/// Environment variable the engine reads its log filter from.
pub const ENGINE_LOG_ENV: &str = "SQLWIRE_LOG";

/// Environment variable the engine reads its maximum payload size from.
pub const ENGINE_MAX_PAYLOAD_ENV: &str = "SQLWIRE_MAX_PAYLOAD";

/// What happens to the engine's stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StderrMode {
    /// Forward each line into `tracing` under the `sqlwire::engine` target.
    #[default]
    Forward,
    /// Share the host's stderr.
    Inherit,
    /// Drop it.
    Discard,
}

/// Options for launching an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Path of the engine executable.
    pub engine_path: PathBuf,
    /// Extra arguments passed to the engine.
    pub engine_args: Vec<String>,
    /// Log filter handed to the engine via `SQLWIRE_LOG`.
    pub engine_log: Option<String>,
    /// Engine stderr handling.
    pub stderr: StderrMode,
    /// Largest payload in either direction. The engine is launched with the
    /// same limit.
    pub max_payload_size: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from(DEFAULT_ENGINE_PATH),
            engine_args: Vec::new(),
            engine_log: None,
            stderr: StderrMode::default(),
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

impl Options {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the engine executable.
    pub fn engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_path = path.into();
        self
    }

    /// Append an engine argument.
    pub fn engine_arg(mut self, arg: impl Into<String>) -> Self {
        self.engine_args.push(arg.into());
        self
    }

    /// Set the engine's log filter (e.g. `"debug"`).
    pub fn engine_log(mut self, filter: impl Into<String>) -> Self {
        self.engine_log = Some(filter.into());
        self
    }

    /// Set how engine stderr is handled.
    ///
    /// Default: [`StderrMode::Forward`]
    pub fn stderr(mut self, mode: StderrMode) -> Self {
        self.stderr = mode;
        self
    }

    /// Set the largest payload sent to or accepted from the engine.
    ///
    /// Default: 1 GB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.max_payload_size = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.engine_path, PathBuf::from("sqlwire-engine"));
        assert!(options.engine_args.is_empty());
        assert_eq!(options.engine_log, None);
        assert_eq!(options.stderr, StderrMode::Forward);
        assert_eq!(options.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_fluent_configuration() {
        let options = Options::new()
            .engine_path("/opt/engine")
            .engine_arg("--quiet")
            .engine_log("sqlwire=trace")
            .stderr(StderrMode::Discard)
            .max_payload_size(4096);

        assert_eq!(options.engine_path, PathBuf::from("/opt/engine"));
        assert_eq!(options.engine_args, vec!["--quiet".to_string()]);
        assert_eq!(options.engine_log.as_deref(), Some("sqlwire=trace"));
        assert_eq!(options.stderr, StderrMode::Discard);
        assert_eq!(options.max_payload_size, 4096);
    }

    #[test]
    fn test_deserialize_partial_config() {
        let json = r#"{ "engine_path": "/srv/engine", "stderr": "inherit" }"#;
        let options: Options = serde_json::from_str(json).unwrap();

        assert_eq!(options.engine_path, PathBuf::from("/srv/engine"));
        assert_eq!(options.stderr, StderrMode::Inherit);
        assert_eq!(options.max_payload_size, DEFAULT_MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_serialize_round_trip() {
        let options = Options::new().engine_log("info");
        let json = serde_json::to_string(&options).unwrap();
        assert!(json.contains("\"stderr\":\"forward\""));
        let back: Options = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
    }
}
