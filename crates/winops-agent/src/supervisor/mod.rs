//! Keeps one API server process alive.
//!
//! [`Supervisor::start`] spawns the server and hands it to a dedicated
//! liveness thread. The thread sleeps on the stop signal for one poll
//! interval, then checks whether the server exited and only afterwards
//! whether a stop was requested. Crashes are relaunched under the
//! [`RestartPolicy`]; a stop terminates the whole process tree.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::warn;

use winops_config::Config;

mod child;
mod errors;
mod launcher;
mod policy;
mod process_tree;
mod reporter;
mod state;
mod worker;

pub use child::{OutputLine, OutputStream, OutputTail, ServerProcess};
pub use errors::{LaunchError, SupervisorError};
pub use launcher::{ChildLauncher, EntryPoint, ServerLauncher};
pub use policy::{RestartDecision, RestartPolicy, RestartTracker};
pub use reporter::{ExitReport, StructuredSupervisorReporter, SupervisorReporter};
pub use state::{SupervisorState, SupervisorStatus};

use state::{StatusCell, StopSignal};
use worker::Worker;

pub(crate) const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Timing and restart tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    pub poll_interval: Duration,
    pub stop_grace: Duration,
    pub restart: RestartPolicy,
}

impl SupervisorSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            stop_grace: config.stop_grace(),
            restart: RestartPolicy::from_config(config),
        }
    }
}

/// Notified on the supervisor thread when supervision ends on its own or
/// after a stop.
pub trait ExitHook: Send + Sync {
    fn supervisor_exited(&self, outcome: &Result<(), SupervisorError>);
}

/// Owner of the API server process and its liveness thread.
pub struct Supervisor<L: ChildLauncher> {
    launcher: Arc<L>,
    settings: SupervisorSettings,
    reporter: Arc<dyn SupervisorReporter>,
    status: Arc<StatusCell>,
    stop: Arc<StopSignal>,
    exit_hook: Option<Arc<dyn ExitHook>>,
    worker: Option<JoinHandle<Result<(), SupervisorError>>>,
}

impl<L: ChildLauncher> Supervisor<L> {
    #[must_use]
    pub fn new(
        launcher: L,
        settings: SupervisorSettings,
        reporter: Arc<dyn SupervisorReporter>,
    ) -> Self {
        Self {
            launcher: Arc::new(launcher),
            settings,
            reporter,
            status: Arc::new(StatusCell::default()),
            stop: Arc::new(StopSignal::default()),
            exit_hook: None,
            worker: None,
        }
    }

    /// Registers a hook that observes how supervision ended.
    pub fn set_exit_hook(&mut self, hook: Arc<dyn ExitHook>) {
        self.exit_hook = Some(hook);
    }

    /// Launches the API server and begins supervising it.
    ///
    /// On failure the supervisor stays `Stopped` and can be started again.
    pub fn start(&mut self) -> Result<(), SupervisorError> {
        if let Some(handle) = self.worker.take() {
            if !handle.is_finished() {
                self.worker = Some(handle);
                return Err(SupervisorError::AlreadyRunning);
            }
            if let Some(error) = finished_run_error(handle) {
                warn!(
                    target: SUPERVISOR_TARGET,
                    %error,
                    "previous supervision run ended with an error; starting again"
                );
            }
        }
        self.stop.reset();
        self.status.update(|status| {
            *status = SupervisorStatus {
                state: SupervisorState::Starting,
                ..SupervisorStatus::default()
            };
        });
        let process = match self.launcher.launch() {
            Ok(process) => process,
            Err(error) => {
                self.status
                    .update(|status| status.state = SupervisorState::Stopped);
                self.reporter.launch_failed(&error);
                return Err(error.into());
            }
        };
        let pid = process.pid();
        self.status.update(|status| {
            status.state = SupervisorState::Running;
            status.child_pid = Some(pid);
            status.started_at = Some(process.started_at());
        });
        self.reporter.server_started(pid, 0);

        let worker = Worker {
            launcher: Arc::clone(&self.launcher),
            settings: self.settings,
            reporter: Arc::clone(&self.reporter),
            status: Arc::clone(&self.status),
            stop: Arc::clone(&self.stop),
        };
        let hook = self.exit_hook.clone();
        let handle = thread::Builder::new()
            .name("winops-supervisor".to_owned())
            .spawn(move || {
                let outcome = worker.run(process);
                if let Some(hook) = hook {
                    hook.supervisor_exited(&outcome);
                }
                outcome
            })
            .map_err(|source| {
                self.status
                    .update(|status| status.state = SupervisorState::Stopped);
                SupervisorError::Thread { source }
            })?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Requests shutdown and returns immediately. Teardown completes on the
    /// liveness thread within one poll interval plus the stop grace period.
    pub fn stop(&self) {
        self.status.update(|status| {
            if matches!(
                status.state,
                SupervisorState::Running | SupervisorState::Starting | SupervisorState::CrashDetected
            ) {
                status.state = SupervisorState::StopRequested;
            }
        });
        self.stop.request();
    }

    /// Blocks until the liveness thread finishes and returns its outcome.
    pub fn wait(&mut self) -> Result<(), SupervisorError> {
        match self.worker.take() {
            Some(handle) => handle
                .join()
                .unwrap_or(Err(SupervisorError::WorkerPanicked)),
            None => Ok(()),
        }
    }

    /// Convenience for `stop` followed by `wait`.
    pub fn stop_and_wait(&mut self) -> Result<(), SupervisorError> {
        self.stop();
        self.wait()
    }

    #[must_use]
    pub fn status(&self) -> SupervisorStatus {
        self.status.snapshot()
    }
}

/// Joins a liveness thread that has already returned.
fn finished_run_error(handle: JoinHandle<Result<(), SupervisorError>>) -> Option<SupervisorError> {
    handle
        .join()
        .unwrap_or(Err(SupervisorError::WorkerPanicked))
        .err()
}

impl<L: ChildLauncher> Drop for Supervisor<L> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            let _ = self.stop_and_wait();
        }
    }
}
