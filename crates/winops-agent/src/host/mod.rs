//! Hosts that run a [`ServiceHandler`] as a long-lived service.
//!
//! The handler only sees `on_start` and `on_stop`. Hosts decide where
//! the stop comes from: termination signals for the console host, control
//! requests for the Windows Service Control Manager.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{error, info};

use winops_config::{Config, InstallPaths};

use crate::supervisor::{
    ChildLauncher, ExitHook, ServerLauncher, StructuredSupervisorReporter, Supervisor,
    SupervisorError, SupervisorReporter, SupervisorSettings, SupervisorStatus,
};

mod console;
mod errors;
mod guard;
#[cfg(windows)]
mod scm;
#[cfg(any(windows, test))]
mod scm_status;
mod shutdown;

pub use console::{ConsoleHost, STATUS_REFRESH, run_console};
pub use errors::HostError;
pub use guard::{HostState, ProcessGuard, StatusSnapshot, process_exists};
#[cfg(windows)]
pub use scm::run_under_scm;
pub use shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const HOST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host");

/// Why the host should stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitRequest {
    Stop,
    Failed(String),
}

/// Cloneable channel through which a service asks its host to exit.
///
/// The first request wins; later ones are ignored.
#[derive(Debug, Clone, Default)]
pub struct HostHandle {
    inner: Arc<ExitCell>,
}

#[derive(Debug, Default)]
struct ExitCell {
    request: Mutex<Option<ExitRequest>>,
    wake: Condvar,
}

impl HostHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_exit(&self, request: ExitRequest) {
        let mut slot = self.lock();
        if slot.is_none() {
            *slot = Some(request);
            self.inner.wake.notify_all();
        }
    }

    /// Waits up to `timeout` for an exit request.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExitRequest> {
        let slot = self.lock();
        let (slot, _) = self
            .inner
            .wake
            .wait_timeout_while(slot, timeout, |request| request.is_none())
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        slot.clone()
    }

    #[must_use]
    pub fn pending(&self) -> Option<ExitRequest> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ExitRequest>> {
        self.inner
            .request
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl ExitHook for HostHandle {
    fn supervisor_exited(&self, outcome: &Result<(), SupervisorError>) {
        if let Err(error) = outcome {
            self.request_exit(ExitRequest::Failed(error.to_string()));
        }
    }
}

/// Contract between a service and whatever hosts it.
pub trait ServiceHandler: Send {
    /// Brings the service up. `host` lets the service ask to be stopped.
    fn on_start(&mut self, host: HostHandle) -> Result<(), HostError>;

    /// Tears the service down. Must not return before teardown completes.
    fn on_stop(&mut self) -> Result<(), HostError>;

    /// Live supervisor state, published in the status snapshot.
    fn status(&self) -> Option<SupervisorStatus> {
        None
    }
}

/// The production service: a supervised API server.
pub struct SupervisedService<L: ChildLauncher = ServerLauncher> {
    supervisor: Supervisor<L>,
}

impl SupervisedService<ServerLauncher> {
    #[must_use]
    pub fn from_config(config: &Config, paths: InstallPaths) -> Self {
        let reporter: Arc<dyn SupervisorReporter> = Arc::new(StructuredSupervisorReporter::new());
        let launcher = ServerLauncher::new(config.clone(), paths);
        Self::new(Supervisor::new(
            launcher,
            SupervisorSettings::from_config(config),
            reporter,
        ))
    }
}

impl<L: ChildLauncher> SupervisedService<L> {
    #[must_use]
    pub fn new(supervisor: Supervisor<L>) -> Self {
        Self { supervisor }
    }
}

impl<L: ChildLauncher> ServiceHandler for SupervisedService<L> {
    fn on_start(&mut self, host: HostHandle) -> Result<(), HostError> {
        self.supervisor.set_exit_hook(Arc::new(host));
        self.supervisor.start()?;
        info!(target: HOST_TARGET, "service started");
        Ok(())
    }

    fn on_stop(&mut self) -> Result<(), HostError> {
        match self.supervisor.stop_and_wait() {
            Ok(()) => {
                info!(target: HOST_TARGET, "service stopped");
                Ok(())
            }
            Err(error) => {
                error!(target: HOST_TARGET, %error, "service stopped with error");
                Err(error.into())
            }
        }
    }

    fn status(&self) -> Option<SupervisorStatus> {
        Some(self.supervisor.status())
    }
}
