//! The liveness loop run on the supervisor thread.

use std::sync::Arc;
use std::time::Instant;

use super::child::ServerProcess;
use super::errors::SupervisorError;
use super::launcher::ChildLauncher;
use super::policy::{RestartDecision, RestartTracker};
use super::reporter::{ExitReport, SupervisorReporter};
use super::state::{StatusCell, StopSignal, SupervisorState};
use super::{SUPERVISOR_TARGET, SupervisorSettings};

pub(super) struct Worker<L> {
    pub(super) launcher: Arc<L>,
    pub(super) settings: SupervisorSettings,
    pub(super) reporter: Arc<dyn SupervisorReporter>,
    pub(super) status: Arc<StatusCell>,
    pub(super) stop: Arc<StopSignal>,
}

impl<L: ChildLauncher> Worker<L> {
    pub(super) fn run(self, mut process: ServerProcess) -> Result<(), SupervisorError> {
        let mut tracker = RestartTracker::new(self.settings.restart);
        loop {
            self.stop.wait_timeout(self.settings.poll_interval);

            // Exit status is checked before the stop flag on every tick.
            match process.try_wait() {
                Ok(Some(status)) => {
                    let stop_requested = self.stop.is_requested();
                    self.record_exit(&process, status.code(), stop_requested);
                    if stop_requested {
                        self.finish();
                        return Ok(());
                    }
                    match self.relaunch(&mut tracker)? {
                        Some(next) => process = next,
                        None => {
                            self.finish();
                            return Ok(());
                        }
                    }
                    continue;
                }
                Ok(None) => {}
                Err(error) => tracing::warn!(
                    target: SUPERVISOR_TARGET,
                    pid = process.pid(),
                    error = %error,
                    "failed to poll API server status"
                ),
            }

            if self.stop.is_requested() {
                self.teardown(process);
                return Ok(());
            }
        }
    }

    fn record_exit(&self, process: &ServerProcess, exit_code: Option<i32>, stop_requested: bool) {
        process.reap_leftovers();
        self.status.update(|status| {
            status.state = if stop_requested {
                SupervisorState::Stopping
            } else {
                SupervisorState::CrashDetected
            };
            status.child_pid = None;
            status.started_at = None;
            status.last_exit_code = exit_code;
        });
        self.reporter.server_exited(&ExitReport {
            pid: process.pid(),
            exit_code,
            uptime: process.uptime(),
            output: process.output_tail(),
            stop_requested,
        });
    }

    /// Starts a replacement server. `Ok(None)` means a stop arrived while
    /// waiting out a backoff delay.
    fn relaunch(
        &self,
        tracker: &mut RestartTracker,
    ) -> Result<Option<ServerProcess>, SupervisorError> {
        loop {
            match tracker.record(Instant::now()) {
                RestartDecision::GiveUp { restarts } => {
                    let error = SupervisorError::Fatal {
                        restarts,
                        window: tracker.policy().window,
                    };
                    self.status.update(|status| status.state = SupervisorState::Stopped);
                    self.reporter.gave_up(&error);
                    return Err(error);
                }
                RestartDecision::Immediate => {}
                RestartDecision::After(delay) => {
                    self.reporter
                        .restart_scheduled(delay, tracker.restarts_in_window());
                    if self.stop.wait_timeout(delay) {
                        return Ok(None);
                    }
                }
            }
            if self.stop.is_requested() {
                return Ok(None);
            }
            self.status
                .update(|status| status.state = SupervisorState::Starting);
            match self.launcher.launch() {
                Ok(process) => {
                    let mut restart_count = 0;
                    self.status.update(|status| {
                        status.restart_count += 1;
                        restart_count = status.restart_count;
                        status.state = SupervisorState::Running;
                        status.child_pid = Some(process.pid());
                        status.started_at = Some(process.started_at());
                    });
                    self.reporter.server_started(process.pid(), restart_count);
                    return Ok(Some(process));
                }
                Err(error) => {
                    self.status
                        .update(|status| status.state = SupervisorState::CrashDetected);
                    self.reporter.launch_failed(&error);
                }
            }
        }
    }

    fn teardown(&self, process: ServerProcess) {
        let pid = process.pid();
        self.status
            .update(|status| status.state = SupervisorState::Stopping);
        self.reporter.stopping(pid);
        match process.terminate(self.settings.stop_grace) {
            Ok(status) => self
                .status
                .update(|current| current.last_exit_code = status.code()),
            Err(error) => tracing::warn!(
                target: SUPERVISOR_TARGET,
                pid,
                error = %error,
                "failed to reap API server during shutdown"
            ),
        }
        self.finish();
    }

    fn finish(&self) {
        self.status.update(|status| {
            status.state = SupervisorState::Stopped;
            status.child_pid = None;
            status.started_at = None;
        });
        self.reporter.stopped();
    }
}
