//! Temporary install directories whose API server is a shell script.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use tempfile::TempDir;
use winops_config::{Config, InstallPaths};

use crate::credentials::CredentialStore;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Server that stays up until signalled and spawns a grandchild.
pub const LONG_RUNNING_SERVER: &str = "echo ready\nsleep 30 &\nwait\n";

/// Server that fails immediately.
pub const CRASHING_SERVER: &str = "echo boom 1>&2\nexit 3\n";

/// An install directory with a scripted API server.
pub struct ScriptInstall {
    dir: TempDir,
    config: Config,
    paths: InstallPaths,
}

impl ScriptInstall {
    pub fn new(script: &str) -> Self {
        let dir = TempDir::new().expect("failed to create install directory");
        let install_dir =
            Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("install dir not UTF-8");
        let config = Config {
            install_dir: Some(install_dir),
            server_interpreter: "/bin/sh".to_owned(),
            server_script: "server.sh".to_owned(),
            poll_interval_ms: 50,
            stop_grace_ms: 1_000,
            restart_limit: 3,
            restart_window_secs: 60,
            restart_backoff_ms: 20,
            restart_backoff_max_ms: 100,
            ..Config::default()
        };
        let paths = InstallPaths::from_config(&config).expect("failed to derive install paths");
        let install = Self { dir, config, paths };
        install.write_script(script);
        install
    }

    pub fn write_script(&self, script: &str) {
        fs::write(self.paths.install_dir().join("server.sh"), script)
            .expect("failed to write server script");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn paths(&self) -> &InstallPaths {
        &self.paths
    }

    pub fn credentials(&self) -> CredentialStore {
        CredentialStore::for_install(&self.paths)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}

/// Polls `condition` until it holds or the shared timeout elapses.
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(POLL_INTERVAL);
    }
    condition()
}

/// Whether `pid` names a live, non-zombie process.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if kill(Pid::from_raw(raw), None).is_err() {
        return false;
    }
    match fs::read_to_string(format!("/proc/{pid}/stat")) {
        Ok(stat) => !stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z')),
        Err(_) => !cfg!(target_os = "linux"),
    }
}
