//! Shared configuration for the WinOps service binaries.
//!
//! `winops` (the operator CLI) and `winops-agentd` (the supervising service
//! host) agree on one [`Config`] layout. Values are layered by
//! `ortho_config`: built-in defaults, then an optional TOML file
//! (`--config-path` or `WINOPS_CONFIG_PATH`), then `WINOPS_*` environment
//! variables, then command-line flags.
//!
//! The crate also fixes the [`ServiceIdentity`] registered with the host
//! service manager and derives the [`InstallPaths`] both binaries use to
//! find the credential file and the service host's runtime artefacts.

use std::time::Duration;

use camino::Utf8PathBuf;
pub use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

mod defaults;
mod identity;
mod logging;
mod paths;

pub use defaults::{
    API_KEY_ENV_VAR, DEFAULT_LOG_FILTER, DEFAULT_OUTPUT_TAIL_LINES, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_RESTART_BACKOFF_MAX_MS, DEFAULT_RESTART_BACKOFF_MS, DEFAULT_RESTART_LIMIT,
    DEFAULT_RESTART_WINDOW_SECS, DEFAULT_SERVER_INTERPRETER, DEFAULT_SERVER_MODULE,
    DEFAULT_SERVER_SCRIPT, DEFAULT_STOP_GRACE_MS, default_log_filter, default_log_filter_string,
    default_log_format,
};
pub use identity::{SERVICE_IDENTITY, ServiceIdentity};
pub use logging::{LogFormat, LogFormatParseError};
pub use paths::{InstallPaths, InstallPathsError};

/// Layered configuration shared by the CLI and the service host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "WINOPS")]
pub struct Config {
    /// Directory holding the API server entry point, the credential file, and
    /// the service host's runtime files. Defaults to the directory of the
    /// running executable.
    #[serde(default)]
    pub install_dir: Option<Utf8PathBuf>,
    /// `tracing` filter expression applied by both binaries.
    #[ortho_config(default = default_log_filter_string())]
    pub log_filter: String,
    /// Output format for structured logs.
    #[ortho_config(default = default_log_format())]
    pub log_format: LogFormat,
    /// Interpreter used to run the API server entry point.
    #[ortho_config(default = DEFAULT_SERVER_INTERPRETER.to_owned())]
    pub server_interpreter: String,
    /// Script name looked up inside the install directory.
    #[ortho_config(default = DEFAULT_SERVER_SCRIPT.to_owned())]
    pub server_script: String,
    /// Module run with `-m` when the script is absent.
    #[ortho_config(default = DEFAULT_SERVER_MODULE.to_owned())]
    pub server_module: String,
    /// Explicit executable replacing interpreter-based resolution.
    #[serde(default)]
    pub server_command: Option<Utf8PathBuf>,
    /// Interval between liveness checks of the API server.
    #[ortho_config(default = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,
    /// Time the API server is given to exit after a termination request.
    #[ortho_config(default = DEFAULT_STOP_GRACE_MS)]
    pub stop_grace_ms: u64,
    /// Maximum restarts tolerated inside one restart window.
    #[ortho_config(default = DEFAULT_RESTART_LIMIT)]
    pub restart_limit: u32,
    /// Length of the sliding restart window.
    #[ortho_config(default = DEFAULT_RESTART_WINDOW_SECS)]
    pub restart_window_secs: u64,
    /// Initial delay applied before a repeated restart.
    #[ortho_config(default = DEFAULT_RESTART_BACKOFF_MS)]
    pub restart_backoff_ms: u64,
    /// Upper bound for the exponential restart delay.
    #[ortho_config(default = DEFAULT_RESTART_BACKOFF_MAX_MS)]
    pub restart_backoff_max_ms: u64,
    /// Number of captured API server output lines kept for diagnostics.
    #[ortho_config(default = DEFAULT_OUTPUT_TAIL_LINES)]
    pub output_tail_lines: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            install_dir: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            server_interpreter: DEFAULT_SERVER_INTERPRETER.to_owned(),
            server_script: DEFAULT_SERVER_SCRIPT.to_owned(),
            server_module: DEFAULT_SERVER_MODULE.to_owned(),
            server_command: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
            restart_limit: DEFAULT_RESTART_LIMIT,
            restart_window_secs: DEFAULT_RESTART_WINDOW_SECS,
            restart_backoff_ms: DEFAULT_RESTART_BACKOFF_MS,
            restart_backoff_max_ms: DEFAULT_RESTART_BACKOFF_MAX_MS,
            output_tail_lines: DEFAULT_OUTPUT_TAIL_LINES,
        }
    }
}

impl Config {
    /// Configured install directory, if any.
    #[must_use]
    pub fn install_dir(&self) -> Option<&Utf8PathBuf> {
        self.install_dir.as_ref()
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Interpreter used for script and module entry points.
    #[must_use]
    pub fn server_interpreter(&self) -> &str {
        self.server_interpreter.as_str()
    }

    /// Co-located script name.
    #[must_use]
    pub fn server_script(&self) -> &str {
        self.server_script.as_str()
    }

    /// Fallback module name.
    #[must_use]
    pub fn server_module(&self) -> &str {
        self.server_module.as_str()
    }

    /// Explicit server executable override.
    #[must_use]
    pub fn server_command(&self) -> Option<&Utf8PathBuf> {
        self.server_command.as_ref()
    }

    /// Liveness poll interval. Never shorter than one millisecond.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Grace period granted to the API server on stop.
    #[must_use]
    pub const fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    /// Maximum restarts per window.
    #[must_use]
    pub const fn restart_limit(&self) -> u32 {
        self.restart_limit
    }

    /// Sliding restart window.
    #[must_use]
    pub const fn restart_window(&self) -> Duration {
        Duration::from_secs(self.restart_window_secs)
    }

    /// Initial restart backoff.
    #[must_use]
    pub const fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_ms)
    }

    /// Restart backoff ceiling.
    #[must_use]
    pub const fn restart_backoff_max(&self) -> Duration {
        Duration::from_millis(self.restart_backoff_max_ms)
    }

    /// Captured output lines retained per API server run.
    #[must_use]
    pub const fn output_tail_lines(&self) -> usize {
        self.output_tail_lines
    }
}
