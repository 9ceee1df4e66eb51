//! Stopping a console-hosted agent that is not registered as a service.

use std::thread;
use std::time::{Duration, Instant};

use winops_config::InstallPaths;

use super::error::LifecycleError;

#[cfg(unix)]
use libc::{SIGTERM, kill};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polls until the console host has removed its PID file.
pub(super) fn wait_for_shutdown(paths: &InstallPaths) -> Result<(), LifecycleError> {
    wait_for_shutdown_within(paths, SHUTDOWN_TIMEOUT)
}

fn wait_for_shutdown_within(paths: &InstallPaths, timeout: Duration) -> Result<(), LifecycleError> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !paths.pid_path().exists() {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
    Err(LifecycleError::ShutdownTimeout {
        pid_path: paths.pid_path().to_path_buf(),
        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
    })
}

/// Sends SIGTERM to the console host.
///
/// Rejects PIDs that `kill(2)` would interpret as a process group.
pub(super) fn signal_host(pid: u32) -> Result<(), LifecycleError> {
    #[cfg(unix)]
    {
        if pid == 0 {
            return Err(LifecycleError::InvalidPid {
                pid,
                reason: "pid 0 addresses the caller's process group",
            });
        }
        let Ok(raw) = libc::pid_t::try_from(pid) else {
            return Err(LifecycleError::InvalidPid {
                pid,
                reason: "pid exceeds the platform range",
            });
        };
        // SAFETY: `kill(2)` has no memory-safety preconditions; an invalid
        // pid only produces an error return.
        let result = unsafe { kill(raw, SIGTERM) };
        if result == 0 {
            Ok(())
        } else {
            Err(LifecycleError::SignalFailed {
                pid,
                source: std::io::Error::last_os_error(),
            })
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        Err(LifecycleError::UnsupportedPlatform)
    }
}
