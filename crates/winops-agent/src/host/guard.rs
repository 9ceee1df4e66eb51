//! Runtime files owned by a running service host.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use winops_config::InstallPaths;

use crate::files::{atomic_write, remove_if_present};
use crate::supervisor::SupervisorStatus;

use super::HOST_TARGET;
use super::errors::HostError;

/// Lifecycle phase recorded in the status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostState {
    Starting,
    Ready,
    Stopping,
}

impl std::fmt::Display for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
        })
    }
}

/// JSON document published next to the PID file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: HostState,
    pub pid: u32,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default)]
    pub supervisor: Option<SupervisorStatus>,
}

impl StatusSnapshot {
    fn new(status: HostState, pid: u32, supervisor: Option<SupervisorStatus>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        Self {
            status,
            pid,
            timestamp,
            supervisor,
        }
    }
}

/// Holds the install directory's lock file for the lifetime of a host and
/// removes the runtime files when dropped.
#[derive(Debug)]
pub struct ProcessGuard {
    paths: InstallPaths,
    _lock: File,
    pid: Option<u32>,
}

impl ProcessGuard {
    /// Takes the lock, clearing files left behind by a dead host.
    pub fn acquire(paths: InstallPaths) -> Result<Self, HostError> {
        let lock = acquire_lock(&paths)?;
        Ok(Self {
            paths,
            _lock: lock,
            pid: None,
        })
    }

    pub fn write_pid(&mut self, pid: u32) -> Result<(), HostError> {
        let path = self.paths.pid_path();
        atomic_write(path, format!("{pid}\n").as_bytes()).map_err(|source| {
            HostError::PidWrite {
                path: path.to_path_buf(),
                source,
            }
        })?;
        self.pid = Some(pid);
        info!(
            target: HOST_TARGET,
            pid,
            file = %path.display(),
            "pid file written"
        );
        Ok(())
    }

    pub fn write_status(
        &self,
        status: HostState,
        supervisor: Option<SupervisorStatus>,
    ) -> Result<(), HostError> {
        let pid = self.pid.ok_or(HostError::MissingPid)?;
        let path = self.paths.status_path();
        let snapshot = StatusSnapshot::new(status, pid, supervisor);
        let mut payload = serde_json::to_vec(&snapshot)?;
        payload.push(b'\n');
        atomic_write(path, &payload).map_err(|source| HostError::StatusWrite {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(
            target: HOST_TARGET,
            status = ?snapshot.status,
            file = %path.display(),
            "status snapshot updated"
        );
        Ok(())
    }

    #[must_use]
    pub fn paths(&self) -> &InstallPaths {
        &self.paths
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        for path in [
            self.paths.status_path(),
            self.paths.pid_path(),
            self.paths.lock_path(),
        ] {
            if let Err(error) = remove_if_present(path) {
                warn!(
                    target: HOST_TARGET,
                    file = %path.display(),
                    %error,
                    "failed to remove runtime file"
                );
            }
        }
    }
}

fn acquire_lock(paths: &InstallPaths) -> Result<File, HostError> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    match options.open(paths.lock_path()) {
        Ok(file) => {
            info!(
                target: HOST_TARGET,
                file = %paths.lock_path().display(),
                "acquired host lock"
            );
            Ok(file)
        }
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => handle_existing_lock(paths),
        Err(source) => Err(HostError::LockCreate {
            path: paths.lock_path().to_path_buf(),
            source,
        }),
    }
}

fn handle_existing_lock(paths: &InstallPaths) -> Result<File, HostError> {
    if let Some(pid) = read_pid(paths.pid_path()) {
        if process_exists(pid)? {
            info!(
                target: HOST_TARGET,
                pid,
                "refusing to start: existing host alive"
            );
            return Err(HostError::AlreadyRunning { pid });
        }
        warn!(
            target: HOST_TARGET,
            pid,
            "existing host not detected; cleaning stale files"
        );
    }
    for path in [paths.lock_path(), paths.pid_path(), paths.status_path()] {
        remove_if_present(path).map_err(|source| HostError::Cleanup {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    options
        .open(paths.lock_path())
        .map_err(|source| HostError::LockCreate {
            path: paths.lock_path().to_path_buf(),
            source,
        })
}

fn read_pid(path: &Path) -> Option<u32> {
    let content = fs::read_to_string(path).ok()?;
    content.trim().parse::<u32>().ok().filter(|pid| *pid != 0)
}

/// Whether a process with `pid` currently exists.
#[cfg(unix)]
pub fn process_exists(pid: u32) -> Result<bool, HostError> {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(errno) => Err(HostError::CheckProcess {
            pid,
            message: errno.to_string(),
        }),
    }
}

/// Whether a process with `pid` currently exists.
#[cfg(windows)]
pub fn process_exists(pid: u32) -> Result<bool, HostError> {
    use std::process::Command;

    let output = Command::new("tasklist")
        .args(["/FI", &format!("PID eq {pid}"), "/NH", "/FO", "CSV"])
        .output()
        .map_err(|error| HostError::CheckProcess {
            pid,
            message: error.to_string(),
        })?;
    let needle = format!("\"{pid}\"");
    Ok(String::from_utf8_lossy(&output.stdout).contains(&needle))
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    #[fixture]
    fn install() -> (TempDir, InstallPaths) {
        let dir = TempDir::new().expect("install dir");
        let paths = InstallPaths::in_directory(dir.path());
        (dir, paths)
    }

    #[rstest]
    fn writes_and_cleans_runtime_files(install: (TempDir, InstallPaths)) {
        let (_dir, paths) = install;
        {
            let mut guard = ProcessGuard::acquire(paths.clone()).expect("acquire");
            guard.write_pid(std::process::id()).expect("pid");
            guard
                .write_status(HostState::Ready, Some(SupervisorStatus::default()))
                .expect("status");
            let raw = fs::read_to_string(paths.status_path()).expect("read status");
            let snapshot: StatusSnapshot = serde_json::from_str(&raw).expect("parse status");
            assert_eq!(snapshot.status, HostState::Ready);
            assert_eq!(snapshot.pid, std::process::id());
            assert!(snapshot.supervisor.is_some());
            assert!(raw.contains("\"status\":\"ready\""));
        }
        assert!(!paths.lock_path().exists());
        assert!(!paths.pid_path().exists());
        assert!(!paths.status_path().exists());
    }

    #[rstest]
    fn status_requires_a_pid(install: (TempDir, InstallPaths)) {
        let (_dir, paths) = install;
        let guard = ProcessGuard::acquire(paths).expect("acquire");
        let error = guard
            .write_status(HostState::Starting, None)
            .expect_err("pid missing");
        assert!(matches!(error, HostError::MissingPid));
    }

    #[rstest]
    fn stale_lock_is_reclaimed(install: (TempDir, InstallPaths)) {
        let (_dir, paths) = install;
        fs::write(paths.lock_path(), b"").expect("stale lock");
        fs::write(paths.pid_path(), b"999999999\n").expect("stale pid");
        let guard = ProcessGuard::acquire(paths.clone());
        assert!(guard.is_ok(), "stale lock should be replaced");
    }

    #[cfg(unix)]
    #[rstest]
    fn live_owner_blocks_a_second_host(install: (TempDir, InstallPaths)) {
        use std::process::Command;

        let (_dir, paths) = install;
        let mut sleeper = Command::new("sleep").arg("30").spawn().expect("spawn sleeper");
        fs::write(paths.lock_path(), b"").expect("lock");
        fs::write(paths.pid_path(), format!("{}\n", sleeper.id())).expect("pid");
        let error = ProcessGuard::acquire(paths).expect_err("owner alive");
        assert!(matches!(error, HostError::AlreadyRunning { pid } if pid == sleeper.id()));
        let _ = sleeper.kill();
        let _ = sleeper.wait();
    }
}
