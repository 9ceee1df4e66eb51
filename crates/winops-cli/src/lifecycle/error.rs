//! Error types for service lifecycle operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use winops_agent::{HostError, StorageError};

use crate::service_manager::ServiceManagerError;

/// Errors raised while executing lifecycle actions.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to install service: {source}")]
    Install {
        #[source]
        source: ServiceManagerError,
    },
    #[error("failed to uninstall service: {source}")]
    Uninstall {
        #[source]
        source: ServiceManagerError,
    },
    #[error("failed to start service: {source}")]
    Start {
        #[source]
        source: ServiceManagerError,
    },
    #[error("failed to stop service: {source}")]
    Stop {
        #[source]
        source: ServiceManagerError,
    },
    #[error("failed to query service: {source}")]
    Query {
        #[source]
        source: ServiceManagerError,
    },
    #[error("failed to resolve the agent binary: {source}")]
    AgentBinary {
        #[source]
        source: io::Error,
    },
    #[error("agent binary '{path}' does not exist; set WINOPS_AGENT_BIN to override")]
    MissingAgentBinary { path: PathBuf },
    #[error(transparent)]
    Credentials(#[from] StorageError),
    #[error("console host failed: {source}")]
    ConsoleHost {
        #[from]
        source: HostError,
    },
    #[error("failed to open install directory '{path}': {source}")]
    OpenInstallDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read status snapshot '{path}': {source}")]
    ReadStatus {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse status snapshot '{path}': {source}")]
    ParseStatus {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read pid file '{path}': {source}")]
    ReadPid {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse pid file '{path}': {source}")]
    ParsePid {
        path: PathBuf,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("refusing to signal pid {pid}: {reason}")]
    InvalidPid { pid: u32, reason: &'static str },
    #[error("failed to signal console host pid {pid}: {source}")]
    SignalFailed {
        pid: u32,
        #[source]
        source: io::Error,
    },
    #[error("console host did not stop within {timeout_ms} ms; check '{pid_path}'")]
    ShutdownTimeout { pid_path: PathBuf, timeout_ms: u64 },
    #[cfg(not(unix))]
    #[error("stopping a console host is not supported on this platform; press Ctrl+C in its console")]
    UnsupportedPlatform,
    #[error("failed to write lifecycle output: {0}")]
    Io(#[source] io::Error),
}
