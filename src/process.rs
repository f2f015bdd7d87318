//! Engine process management.
//!
//! Launches the engine with piped stdin/stdout, wires stderr according to
//! [`StderrMode`], and guarantees the child does not outlive its handle
//! (`kill_on_drop`).

use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

use crate::channel::{BoxedReader, BoxedWriter};
use crate::error::{Error, Result};
use crate::options::{Options, StderrMode, ENGINE_LOG_ENV, ENGINE_MAX_PAYLOAD_ENV};

/// A running engine subprocess.
pub(crate) struct EngineProcess {
    child: Child,
    path: String,
    stderr_task: Option<JoinHandle<()>>,
}

impl EngineProcess {
    /// Spawn the engine described by `options`.
    ///
    /// Returns the process handle plus the engine's stdout (read half) and
    /// stdin (write half) for the command channel.
    pub(crate) fn launch(options: &Options) -> Result<(Self, BoxedReader, BoxedWriter)> {
        let path = options.engine_path.display().to_string();
        let launch_failed = |reason: String| Error::LaunchFailed {
            path: path.clone(),
            reason,
        };

        let mut command = Command::new(&options.engine_path);
        command
            .args(&options.engine_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(match options.stderr {
                StderrMode::Forward => Stdio::piped(),
                StderrMode::Inherit => Stdio::inherit(),
                StderrMode::Discard => Stdio::null(),
            })
            .env(ENGINE_MAX_PAYLOAD_ENV, options.max_payload_size.to_string())
            .kill_on_drop(true);
        if let Some(filter) = &options.engine_log {
            command.env(ENGINE_LOG_ENV, filter);
        }

        let mut child = command.spawn().map_err(|e| launch_failed(e.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| launch_failed("stdin was not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_failed("stdout was not captured".to_string()))?;
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(forward_stderr(stderr)));

        tracing::debug!(path = %path, pid = ?child.id(), "engine launched");

        let process = Self {
            child,
            path,
            stderr_task,
        };
        Ok((process, Box::new(stdout), Box::new(stdin)))
    }

    /// Executable path, as launched.
    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    /// OS process id, while the child is running.
    pub(crate) fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Force-stop the engine and reap it.
    pub(crate) async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        tracing::debug!(path = %self.path, "engine killed");
        Ok(())
    }

    /// Wait for the engine to exit (after its stdin was closed).
    pub(crate) async fn wait(mut self) -> Result<ExitStatus> {
        let status = self.child.wait().await?;
        if let Some(task) = self.stderr_task.take() {
            // stderr reaches EOF once the child is gone
            let _ = task.await;
        }
        if status.success() {
            tracing::debug!(path = %self.path, "engine exited");
        } else {
            tracing::warn!(path = %self.path, %status, "engine exited with failure");
        }
        Ok(status)
    }
}

/// Forward engine stderr lines into `tracing`.
async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::info!(target: "sqlwire::engine", "{}", line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "engine stderr closed");
                break;
            }
        }
    }
}
