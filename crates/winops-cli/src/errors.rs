//! Error types for the CLI runtime.

use std::sync::Arc;

use thiserror::Error;

use winops_agent::TelemetryError;
use winops_config::InstallPathsError;

use crate::lifecycle::LifecycleError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to initialise logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Paths(#[from] InstallPathsError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
}
