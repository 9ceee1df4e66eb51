//! Agent start-up: configuration, telemetry, then the service host.

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;
use tracing::info;

use winops_config::{Config, InstallPaths, InstallPathsError, OrthoConfig};

use crate::host::{self, HostError};
use crate::telemetry::{self, LogSink, TelemetryError};

/// Flag the service registration passes to the agent binary.
pub const RUN_FLAG: &str = "--run";

const RUNTIME_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::runtime");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader {
    fn load(&self, args: Vec<OsString>) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that delegates to [`Config::load_from_iter`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self, args: Vec<OsString>) -> Result<Config, Arc<OrthoError>> {
        Config::load_from_iter(args)
    }
}

/// Errors that stop the agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to load configuration: {source}")]
    Configuration {
        #[source]
        source: Arc<OrthoError>,
    },
    #[error(transparent)]
    Paths(#[from] InstallPathsError),
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        #[from]
        source: TelemetryError,
    },
    #[error(transparent)]
    Host(#[from] HostError),
}

/// Runs the agent binary with the process arguments.
pub fn run_agent<I, T>(args: I) -> Result<(), AgentError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    run_agent_with(&SystemConfigLoader, args)
}

pub(crate) fn run_agent_with<L, I, T>(loader: &L, args: I) -> Result<(), AgentError>
where
    L: ConfigLoader,
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let args = strip_run_flag(args);
    let config = loader
        .load(args)
        .map_err(|source| AgentError::Configuration { source })?;
    let paths = InstallPaths::from_config(&config)?;
    telemetry::initialise(&config, &LogSink::detect(&paths))?;
    run_host(&config)?;
    Ok(())
}

/// Hosts the supervised API server until it is told to stop.
///
/// On Windows the SCM host is tried first; a process started from a
/// console falls back to the console host.
pub fn run_host(config: &Config) -> Result<(), HostError> {
    #[cfg(windows)]
    {
        match host::run_under_scm(config) {
            Err(HostError::NotUnderScm) => {
                info!(target: RUNTIME_TARGET, "not started by the SCM; running in the console");
            }
            outcome => return outcome,
        }
    }
    info!(target: RUNTIME_TARGET, "running console host");
    host::run_console(config)
}

fn strip_run_flag<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .filter(|arg| arg != RUN_FLAG)
        .collect()
}
