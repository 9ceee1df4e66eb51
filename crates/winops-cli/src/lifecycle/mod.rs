//! Service lifecycle management for `winops`.
//!
//! - [`types`] defines the actions and the output helpers.
//! - [`error`] captures the error surface exposed to the CLI.
//! - [`spawning`] locates the agent binary and builds its registration.
//! - [`monitoring`] reads the console host's runtime files.
//! - [`shutdown`] stops a console host that is not registered as a service.
//! - [`controller`] implements the install/uninstall/start/stop/status and
//!   key rotation flows.

mod controller;
mod error;
mod monitoring;
mod shutdown;
mod spawning;
mod types;

pub use controller::{
    AgentConsoleHost, ForegroundHost, ServiceLifecycle, SystemLifecycle,
};
pub use error::LifecycleError;
pub use spawning::AGENT_BIN_ENV;
pub use types::{LifecycleAction, LifecycleContext, LifecycleOutput};
