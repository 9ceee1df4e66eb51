//! Error surface for launching and supervising the API server.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::credentials::StorageError;

/// Errors raised while starting one API server process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The configured server executable does not exist.
    #[error("configured server command '{path}' does not exist")]
    MissingCommand {
        /// Configured executable path.
        path: PathBuf,
    },
    /// The API key could not be loaded for injection.
    #[error("failed to load API key for the server: {source}")]
    Credentials {
        /// Underlying storage error.
        #[from]
        source: StorageError,
    },
    /// The operating system refused to start the process.
    #[error("failed to spawn API server '{program:?}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: OsString,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Output capture threads could not be started.
    #[error("failed to capture API server output: {source}")]
    CaptureOutput {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Errors surfaced by the [`Supervisor`](super::Supervisor).
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The first launch failed; the supervisor is back in `Stopped`.
    #[error("failed to launch API server: {source}")]
    Launch {
        /// Underlying launch failure.
        #[from]
        source: LaunchError,
    },
    /// `start` was called while a supervision loop is active.
    #[error("supervisor is already running")]
    AlreadyRunning,
    /// The liveness thread could not be spawned.
    #[error("failed to spawn supervisor thread: {source}")]
    Thread {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The liveness thread panicked.
    #[error("supervisor thread panicked")]
    WorkerPanicked,
    /// The restart budget was exhausted (`SupervisorFatal`).
    #[error(
        "SupervisorFatal: API server restarted {restarts} times within {window_secs}s; giving up",
        window_secs = .window.as_secs()
    )]
    Fatal {
        /// Restarts counted inside the window.
        restarts: usize,
        /// Sliding window the restarts were counted in.
        window: Duration,
    },
}

impl SupervisorError {
    /// Whether the error means the crash-restart budget ran out.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }
}
