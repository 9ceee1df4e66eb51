use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lifecycle state of the supervised API server.
///
/// `Stopped → Starting → Running → (CrashDetected → Starting) |
/// (StopRequested → Stopping → Stopped)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    #[default]
    Stopped,
    Starting,
    Running,
    CrashDetected,
    StopRequested,
    Stopping,
}

impl SupervisorState {
    /// Whether an API server process may currently be alive.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Stopped)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::CrashDetected => "crash_detected",
            Self::StopRequested => "stop_requested",
            Self::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the supervisor, also published in status snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SupervisorStatus {
    pub state: SupervisorState,
    /// PID of the live API server, if any.
    pub child_pid: Option<u32>,
    /// Start of the current API server run, in seconds since the Unix epoch.
    pub started_at: Option<u64>,
    /// Relaunches performed since the supervisor was started.
    pub restart_count: u32,
    /// Exit code of the most recent API server run. `None` when the process
    /// was killed by a signal or has not exited yet.
    pub last_exit_code: Option<i32>,
}

/// Shared status cell.
#[derive(Debug, Default)]
pub(super) struct StatusCell(Mutex<SupervisorStatus>);

impl StatusCell {
    pub(super) fn snapshot(&self) -> SupervisorStatus {
        self.lock().clone()
    }

    pub(super) fn update(&self, apply: impl FnOnce(&mut SupervisorStatus)) {
        apply(&mut self.lock());
    }

    fn lock(&self) -> MutexGuard<'_, SupervisorStatus> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Level-triggered stop request the liveness loop sleeps on.
#[derive(Debug, Default)]
pub(super) struct StopSignal {
    requested: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub(super) fn request(&self) {
        *self.lock() = true;
        self.wake.notify_all();
    }

    pub(super) fn reset(&self) {
        *self.lock() = false;
    }

    pub(super) fn is_requested(&self) -> bool {
        *self.lock()
    }

    /// Sleeps for `timeout` or until a stop is requested. Returns whether a
    /// stop is pending.
    pub(super) fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .wake
            .wait_timeout_while(guard, timeout, |requested| !*requested)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.requested.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn wait_returns_early_when_stop_requested() {
        let signal = Arc::new(StopSignal::default());
        let remote = Arc::clone(&signal);
        let started = Instant::now();
        let handle = thread::spawn(move || remote.wait_timeout(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(50));
        signal.request();
        let stopped = handle.join().expect("waiter thread");
        assert!(stopped);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn wait_times_out_without_request() {
        let signal = StopSignal::default();
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn status_serialises_state_in_snake_case() {
        let status = SupervisorStatus {
            state: SupervisorState::CrashDetected,
            ..SupervisorStatus::default()
        };
        let json = serde_json::to_value(&status).expect("serialise");
        assert_eq!(json["state"], "crash_detected");
    }
}
