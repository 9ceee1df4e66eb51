//! Errors raised while hosting the supervised service.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use winops_config::InstallPathsError;

use crate::supervisor::SupervisorError;

use super::shutdown::ShutdownError;

/// Errors surfaced by the console and SCM hosts.
#[derive(Debug, Error)]
pub enum HostError {
    /// The install directory could not be prepared.
    #[error(transparent)]
    Paths(#[from] InstallPathsError),
    /// Lock file creation failed.
    #[error("failed to create lock file '{path}': {source}")]
    LockCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Another host already owns the install directory.
    #[error("service host already running with pid {pid}")]
    AlreadyRunning { pid: u32 },
    /// Removing a stale runtime file failed.
    #[error("failed to remove stale file '{path}': {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Writing the PID file failed.
    #[error("failed to write pid file '{path}': {source}")]
    PidWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Writing the status snapshot failed.
    #[error("failed to write status snapshot '{path}': {source}")]
    StatusWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Serialising the status snapshot failed.
    #[error("failed to serialise status snapshot: {source}")]
    StatusSerialise {
        #[from]
        source: serde_json::Error,
    },
    /// Status updates were attempted before the PID file was written.
    #[error("pid must be written before updating the status snapshot")]
    MissingPid,
    /// Probing a recorded PID failed.
    #[error("failed to check existing process {pid}: {message}")]
    CheckProcess { pid: u32, message: String },
    /// Termination signal handlers could not be installed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        #[from]
        source: ShutdownError,
    },
    /// The supervisor could not be started or stopped cleanly.
    #[error("supervisor error: {source}")]
    Supervisor {
        #[from]
        source: SupervisorError,
    },
    /// The supervised service asked the host to exit with failure.
    #[error("service failed: {message}")]
    ServiceFailed { message: String },
    /// The process was not started by the Service Control Manager.
    #[cfg(windows)]
    #[error("not running under the Service Control Manager")]
    NotUnderScm,
    /// Talking to the Service Control Manager failed.
    #[cfg(windows)]
    #[error("service control manager error: {source}")]
    ServiceControl {
        #[source]
        source: windows_service::Error,
    },
}
