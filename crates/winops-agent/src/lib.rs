//! Service core of the WinOpsTool agent.
//!
//! The agent keeps a local API server process alive and hands it the
//! shared API key. Three layers build on each other:
//!
//! - [`credentials`] persists the API key in the install directory.
//! - [`supervisor`] launches the API server with the key in its
//!   environment, relaunches it after crashes within a restart budget, and
//!   tears down the whole process tree on stop.
//! - [`host`] runs the supervisor as a long-lived service, either in the
//!   console or under the Windows Service Control Manager, and publishes
//!   lock, PID and status files while doing so.
//!
//! The `winops-agentd` binary wires these together through [`run_agent`].

pub mod credentials;
mod files;
pub mod host;
mod runtime;
pub mod supervisor;
pub mod telemetry;

pub use credentials::{API_KEY_BYTES, ApiKey, CredentialStore, StorageError};
pub use host::{
    ConsoleHost, ExitRequest, HostError, HostHandle, HostState, ServiceHandler, StatusSnapshot,
    SupervisedService, process_exists, run_console,
};
pub use runtime::{AgentError, ConfigLoader, RUN_FLAG, SystemConfigLoader, run_agent, run_host};
pub use supervisor::{
    Supervisor, SupervisorError, SupervisorSettings, SupervisorState, SupervisorStatus,
};
pub use telemetry::{LogSink, TelemetryError, TelemetryHandle};

#[cfg(all(test, unix))]
mod tests;
