//! Derives install-directory artefact paths shared by the CLI and the agent.
//!
//! The install directory holds the API server entry point, the credential
//! file, and the lock, pid, and status files of a console-hosted agent. Both
//! binaries must agree on this layout so `winops --status` and `winops --stop`
//! can find what `winops-agentd` wrote.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::Config;

const API_KEY_FILE: &str = "api_key.txt";
const LOCK_FILE: &str = "winops-agentd.lock";
const PID_FILE: &str = "winops-agentd.pid";
const STATUS_FILE: &str = "winops-agentd.status";
const LOG_FILE: &str = "winops-agentd.log";

/// Canonical paths for files kept in the install directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    install_dir: PathBuf,
    api_key_path: PathBuf,
    lock_path: PathBuf,
    pid_path: PathBuf,
    status_path: PathBuf,
    log_path: PathBuf,
}

impl InstallPaths {
    /// Derives the paths and makes sure the install directory exists.
    pub fn from_config(config: &Config) -> Result<Self, InstallPathsError> {
        let paths = Self::from_config_readonly(config)?;
        fs::create_dir_all(&paths.install_dir).map_err(|source| {
            InstallPathsError::InstallDirectory {
                path: paths.install_dir.clone(),
                source,
            }
        })?;
        Ok(paths)
    }

    /// Derives the paths without touching the filesystem.
    pub fn from_config_readonly(config: &Config) -> Result<Self, InstallPathsError> {
        let install_dir = match config.install_dir() {
            Some(dir) => dir.as_std_path().to_path_buf(),
            None => executable_directory()?,
        };
        Ok(Self::in_directory(install_dir))
    }

    /// Lays out the artefact paths beneath `install_dir`.
    #[must_use]
    pub fn in_directory(install_dir: impl Into<PathBuf>) -> Self {
        let install_dir = install_dir.into();
        Self {
            api_key_path: install_dir.join(API_KEY_FILE),
            lock_path: install_dir.join(LOCK_FILE),
            pid_path: install_dir.join(PID_FILE),
            status_path: install_dir.join(STATUS_FILE),
            log_path: install_dir.join(LOG_FILE),
            install_dir,
        }
    }

    /// Directory holding every artefact.
    #[must_use]
    pub fn install_dir(&self) -> &Path {
        self.install_dir.as_path()
    }

    /// Path to the persisted API key.
    #[must_use]
    pub fn api_key_path(&self) -> &Path {
        self.api_key_path.as_path()
    }

    /// Path to the lock file guarding a single console host.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        self.lock_path.as_path()
    }

    /// Path to the console host's PID file.
    #[must_use]
    pub fn pid_path(&self) -> &Path {
        self.pid_path.as_path()
    }

    /// Path to the JSON status snapshot.
    #[must_use]
    pub fn status_path(&self) -> &Path {
        self.status_path.as_path()
    }

    /// Path to the log file used when no console is attached.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        self.log_path.as_path()
    }

    /// File name of the status snapshot, relative to [`Self::install_dir`].
    #[must_use]
    pub const fn status_file_name() -> &'static str {
        STATUS_FILE
    }

    /// File name of the PID file, relative to [`Self::install_dir`].
    #[must_use]
    pub const fn pid_file_name() -> &'static str {
        PID_FILE
    }
}

fn executable_directory() -> Result<PathBuf, InstallPathsError> {
    let executable =
        env::current_exe().map_err(|source| InstallPathsError::CurrentExecutable { source })?;
    executable
        .parent()
        .map(Path::to_path_buf)
        .ok_or(InstallPathsError::MissingExecutableParent { path: executable })
}

/// Errors raised while deriving install paths.
#[derive(Debug, Error)]
pub enum InstallPathsError {
    /// The running executable could not be located.
    #[error("failed to locate the running executable: {source}")]
    CurrentExecutable {
        #[source]
        source: io::Error,
    },
    /// The executable path had no parent directory.
    #[error("executable path '{path}' has no parent directory")]
    MissingExecutableParent { path: PathBuf },
    /// Creating the install directory failed.
    #[error("failed to prepare install directory '{path}': {source}")]
    InstallDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
