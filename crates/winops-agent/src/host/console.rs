//! Foreground host driven by termination signals.

use std::process;
use std::time::Duration;

use tracing::{info, warn};

use winops_config::{Config, InstallPaths};

use super::errors::HostError;
use super::guard::{HostState, ProcessGuard};
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};
use super::{ExitRequest, HOST_TARGET, HostHandle, ServiceHandler, SupervisedService};

/// How often the status snapshot is refreshed while the service runs.
pub const STATUS_REFRESH: Duration = Duration::from_secs(1);

/// Runs the supervised API server in the foreground until a termination
/// signal arrives or supervision fails.
pub fn run_console(config: &Config) -> Result<(), HostError> {
    let paths = InstallPaths::from_config(config)?;
    let shutdown = SystemShutdownSignal::install()?;
    let mut service = SupervisedService::from_config(config, paths.clone());
    ConsoleHost::new(paths, shutdown).run(&mut service)
}

/// Hosts a [`ServiceHandler`] in the current process.
#[derive(Debug)]
pub struct ConsoleHost<S> {
    paths: InstallPaths,
    shutdown: S,
    refresh: Duration,
}

impl<S: ShutdownSignal> ConsoleHost<S> {
    #[must_use]
    pub fn new(paths: InstallPaths, shutdown: S) -> Self {
        Self {
            paths,
            shutdown,
            refresh: STATUS_REFRESH,
        }
    }

    #[must_use]
    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    /// Starts `handler`, waits for a stop, then stops it.
    ///
    /// The lock, PID and status files exist for exactly as long as this
    /// call runs.
    pub fn run<H: ServiceHandler>(&self, handler: &mut H) -> Result<(), HostError> {
        info!(
            target: HOST_TARGET,
            install_dir = %self.paths.install_dir().display(),
            "starting console host"
        );
        let mut guard = ProcessGuard::acquire(self.paths.clone())?;
        guard.write_pid(process::id())?;
        guard.write_status(HostState::Starting, None)?;

        let handle = HostHandle::new();
        if let Err(error) = handler.on_start(handle.clone()) {
            warn!(target: HOST_TARGET, %error, "service failed to start");
            return Err(error);
        }
        guard.write_status(HostState::Ready, handler.status())?;

        let request = self.wait_for_exit(&guard, &handle, handler);
        if let Err(error) = guard.write_status(HostState::Stopping, handler.status()) {
            warn!(target: HOST_TARGET, %error, "failed to publish stopping status");
        }
        let stopped = handler.on_stop();
        info!(target: HOST_TARGET, ?request, "console host stopped");
        match request {
            ExitRequest::Failed(message) => Err(HostError::ServiceFailed { message }),
            ExitRequest::Stop => stopped,
        }
    }

    fn wait_for_exit<H: ServiceHandler>(
        &self,
        guard: &ProcessGuard,
        handle: &HostHandle,
        handler: &H,
    ) -> ExitRequest {
        loop {
            if let Some(request) = handle.wait_timeout(self.refresh) {
                return request;
            }
            if self.shutdown.triggered() {
                return ExitRequest::Stop;
            }
            if let Err(error) = guard.write_status(HostState::Ready, handler.status()) {
                warn!(target: HOST_TARGET, %error, "failed to refresh status snapshot");
            }
        }
    }
}
