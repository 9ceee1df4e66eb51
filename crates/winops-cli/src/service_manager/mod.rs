//! Host service-manager adapters.
//!
//! The lifecycle controller only talks to [`ServiceManager`]. Windows uses
//! the Service Control Manager; Unix hosts register a systemd unit.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use winops_config::ServiceIdentity;

#[cfg(windows)]
mod scm;
#[cfg(unix)]
mod systemd;

#[cfg(windows)]
pub use scm::ScmServiceManager;
#[cfg(unix)]
pub use systemd::{Systemctl, SystemctlOutput, SystemSystemctl, SystemdServiceManager};

/// Everything needed to register the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub identity: ServiceIdentity,
    pub executable: PathBuf,
    pub arguments: Vec<OsString>,
    pub working_directory: PathBuf,
}

/// Run state reported by the host service manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRunState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Unknown,
}

impl ServiceRunState {
    #[must_use]
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ServiceRunState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Unknown => "unknown",
        })
    }
}

/// Errors reported by service-manager adapters.
#[derive(Debug, Error)]
pub enum ServiceManagerError {
    #[error("service '{name}' is not installed")]
    NotInstalled { name: String },
    #[error("failed to write service definition '{path}': {source}")]
    WriteDefinition {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to remove service definition '{path}': {source}")]
    RemoveDefinition {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("'{command}' failed with status {status:?}: {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    #[cfg(windows)]
    #[error("service control manager error: {source}")]
    Scm {
        #[source]
        source: windows_service::Error,
    },
}

/// Host service-manager operations used by the lifecycle controller.
pub trait ServiceManager {
    fn is_installed(&self) -> Result<bool, ServiceManagerError>;
    fn install(&self, definition: &ServiceDefinition) -> Result<(), ServiceManagerError>;
    fn uninstall(&self) -> Result<(), ServiceManagerError>;
    fn start(&self) -> Result<(), ServiceManagerError>;
    fn stop(&self) -> Result<(), ServiceManagerError>;
    fn run_state(&self) -> Result<ServiceRunState, ServiceManagerError>;
}

/// Service-manager adapter of the running host.
#[cfg(windows)]
pub type SystemServiceManager = ScmServiceManager;
/// Service-manager adapter of the running host.
#[cfg(unix)]
pub type SystemServiceManager = SystemdServiceManager<SystemSystemctl>;

/// The service manager of the running host.
#[cfg(windows)]
#[must_use]
pub fn system_service_manager() -> SystemServiceManager {
    ScmServiceManager::new(winops_config::SERVICE_IDENTITY)
}

/// The service manager of the running host.
#[cfg(unix)]
#[must_use]
pub fn system_service_manager() -> SystemServiceManager {
    SystemdServiceManager::system(winops_config::SERVICE_IDENTITY)
}
