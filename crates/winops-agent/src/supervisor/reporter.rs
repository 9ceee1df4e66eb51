//! Structured reporting for supervisor lifecycle events.

use std::sync::Arc;
use std::time::Duration;

use super::SUPERVISOR_TARGET;
use super::child::{OutputLine, OutputStream};
use super::errors::{LaunchError, SupervisorError};

/// What is known about an API server run that just ended.
#[derive(Debug, Clone)]
pub struct ExitReport {
    pub pid: u32,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub uptime: Duration,
    pub output: Vec<OutputLine>,
    /// Whether a stop had already been requested when the exit was seen.
    pub stop_requested: bool,
}

impl ExitReport {
    /// Captured output joined into one block, each line tagged with its pipe.
    #[must_use]
    pub fn render_output(&self) -> String {
        self.output
            .iter()
            .map(|line| match line.stream {
                OutputStream::Stdout => format!("[stdout] {}", line.text),
                OutputStream::Stderr => format!("[stderr] {}", line.text),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Observer for supervisor events.
pub trait SupervisorReporter: Send + Sync {
    fn server_started(&self, pid: u32, restart_count: u32);

    /// A server run ended. Unexpected exits (`ChildCrash`) are only ever
    /// reported here and never surface as errors.
    fn server_exited(&self, report: &ExitReport);

    fn restart_scheduled(&self, delay: Duration, restarts_in_window: usize);

    fn launch_failed(&self, error: &LaunchError);

    fn stopping(&self, pid: u32);

    fn stopped(&self);

    fn gave_up(&self, error: &SupervisorError);
}

impl<T> SupervisorReporter for Arc<T>
where
    T: SupervisorReporter + ?Sized,
{
    fn server_started(&self, pid: u32, restart_count: u32) {
        (**self).server_started(pid, restart_count);
    }

    fn server_exited(&self, report: &ExitReport) {
        (**self).server_exited(report);
    }

    fn restart_scheduled(&self, delay: Duration, restarts_in_window: usize) {
        (**self).restart_scheduled(delay, restarts_in_window);
    }

    fn launch_failed(&self, error: &LaunchError) {
        (**self).launch_failed(error);
    }

    fn stopping(&self, pid: u32) {
        (**self).stopping(pid);
    }

    fn stopped(&self) {
        (**self).stopped();
    }

    fn gave_up(&self, error: &SupervisorError) {
        (**self).gave_up(error);
    }
}

/// Default reporter that records supervisor events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredSupervisorReporter;

impl StructuredSupervisorReporter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl SupervisorReporter for StructuredSupervisorReporter {
    fn server_started(&self, pid: u32, restart_count: u32) {
        tracing::info!(
            target: SUPERVISOR_TARGET,
            event = "server_started",
            pid,
            restart_count,
            "API server started"
        );
    }

    fn server_exited(&self, report: &ExitReport) {
        if report.stop_requested {
            tracing::info!(
                target: SUPERVISOR_TARGET,
                event = "server_exited",
                pid = report.pid,
                exit_code = ?report.exit_code,
                "API server exited during shutdown"
            );
            return;
        }
        tracing::warn!(
            target: SUPERVISOR_TARGET,
            event = "server_crashed",
            pid = report.pid,
            exit_code = ?report.exit_code,
            uptime_ms = u64::try_from(report.uptime.as_millis()).unwrap_or(u64::MAX),
            output = %report.render_output(),
            "API server exited unexpectedly"
        );
    }

    fn restart_scheduled(&self, delay: Duration, restarts_in_window: usize) {
        tracing::info!(
            target: SUPERVISOR_TARGET,
            event = "restart_scheduled",
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            restarts_in_window,
            "API server restart delayed"
        );
    }

    fn launch_failed(&self, error: &LaunchError) {
        tracing::error!(
            target: SUPERVISOR_TARGET,
            event = "launch_failed",
            error = %error,
            "API server failed to launch"
        );
    }

    fn stopping(&self, pid: u32) {
        tracing::info!(
            target: SUPERVISOR_TARGET,
            event = "stopping",
            pid,
            "stopping API server"
        );
    }

    fn stopped(&self) {
        tracing::info!(
            target: SUPERVISOR_TARGET,
            event = "stopped",
            "API server supervision stopped"
        );
    }

    fn gave_up(&self, error: &SupervisorError) {
        tracing::error!(
            target: SUPERVISOR_TARGET,
            event = "supervisor_fatal",
            error = %error,
            "API server supervision abandoned"
        );
    }
}
