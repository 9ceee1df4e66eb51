//! Test double for [`SupervisorReporter`] that records events for assertions.

use std::sync::Mutex;
use std::time::Duration;

use crate::supervisor::{ExitReport, LaunchError, SupervisorError, SupervisorReporter};

/// Supervisor events tracked during tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    Started { pid: u32, restart_count: u32 },
    Exited { exit_code: Option<i32>, stop_requested: bool },
    RestartScheduled(Duration),
    LaunchFailed(String),
    Stopping,
    Stopped,
    GaveUp(String),
}

#[derive(Debug, Default)]
pub struct RecordingSupervisorReporter {
    events: Mutex<Vec<SupervisorEvent>>,
}

impl RecordingSupervisorReporter {
    #[must_use]
    pub fn events(&self) -> Vec<SupervisorEvent> {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .clone()
    }

    pub fn count(&self, predicate: impl Fn(&SupervisorEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }

    fn record(&self, event: SupervisorEvent) {
        self.events
            .lock()
            .expect("reporter mutex poisoned")
            .push(event);
    }
}

impl SupervisorReporter for RecordingSupervisorReporter {
    fn server_started(&self, pid: u32, restart_count: u32) {
        self.record(SupervisorEvent::Started { pid, restart_count });
    }

    fn server_exited(&self, report: &ExitReport) {
        self.record(SupervisorEvent::Exited {
            exit_code: report.exit_code,
            stop_requested: report.stop_requested,
        });
    }

    fn restart_scheduled(&self, delay: Duration, _restarts_in_window: usize) {
        self.record(SupervisorEvent::RestartScheduled(delay));
    }

    fn launch_failed(&self, error: &LaunchError) {
        self.record(SupervisorEvent::LaunchFailed(error.to_string()));
    }

    fn stopping(&self, _pid: u32) {
        self.record(SupervisorEvent::Stopping);
    }

    fn stopped(&self) {
        self.record(SupervisorEvent::Stopped);
    }

    fn gave_up(&self, error: &SupervisorError) {
        self.record(SupervisorEvent::GaveUp(error.to_string()));
    }
}
