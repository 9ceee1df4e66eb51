use crate::logging::LogFormat;

/// Environment variable through which the API server receives its key.
pub const API_KEY_ENV_VAR: &str = "WINOPSTOOL_API_KEY";

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Interpreter that runs the API server.
pub const DEFAULT_SERVER_INTERPRETER: &str = "python";

/// API server script expected next to the service binaries.
pub const DEFAULT_SERVER_SCRIPT: &str = "server.py";

/// Module run when the co-located script is missing.
pub const DEFAULT_SERVER_MODULE: &str = "api_server.server";

/// Liveness poll interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Grace period before the API server is force-killed, in milliseconds.
pub const DEFAULT_STOP_GRACE_MS: u64 = 5_000;

/// Restarts tolerated inside one window before the supervisor gives up.
pub const DEFAULT_RESTART_LIMIT: u32 = 5;

/// Sliding restart window in seconds.
pub const DEFAULT_RESTART_WINDOW_SECS: u64 = 60;

/// First backoff delay in milliseconds.
pub const DEFAULT_RESTART_BACKOFF_MS: u64 = 500;

/// Backoff ceiling in milliseconds.
pub const DEFAULT_RESTART_BACKOFF_MAX_MS: u64 = 30_000;

/// Captured output lines kept per API server run.
pub const DEFAULT_OUTPUT_TAIL_LINES: usize = 200;

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}
