//! CLI argument definitions for the `winops` service controller.

use clap::Parser;

use crate::lifecycle::LifecycleAction;

/// Manages the WinOpsTool REST API service.
///
/// Actions may be combined; they always run in the order install,
/// uninstall, start, stop, status, generate-key and stop at the first
/// failure.
#[derive(Parser, Debug, Default)]
#[command(name = "winops", version)]
pub(crate) struct Cli {
    /// Registers the service with the host service manager and prints the
    /// API key.
    #[arg(long)]
    pub(crate) install: bool,
    /// Stops and deregisters the service.
    #[arg(long)]
    pub(crate) uninstall: bool,
    /// Starts the service, or runs it in this console when not installed.
    #[arg(long)]
    pub(crate) start: bool,
    /// Stops the service.
    #[arg(long)]
    pub(crate) stop: bool,
    /// Prints installation and run state and the current API key.
    #[arg(long)]
    pub(crate) status: bool,
    /// Replaces the API key. Takes effect when the API server next starts.
    #[arg(long = "generate-key")]
    pub(crate) generate_key: bool,
    /// Path to a configuration file.
    #[arg(long = "config-path", value_name = "PATH")]
    pub(crate) config_path: Option<String>,
    /// Directory holding the API server and the credential file.
    #[arg(long = "install-dir", value_name = "DIR")]
    pub(crate) install_dir: Option<String>,
    /// Log filter expression.
    #[arg(long = "log-filter", value_name = "FILTER")]
    pub(crate) log_filter: Option<String>,
    /// Log output format (`json` or `compact`).
    #[arg(long = "log-format", value_name = "FORMAT")]
    pub(crate) log_format: Option<String>,
}

impl Cli {
    /// Requested actions in execution order.
    pub(crate) fn actions(&self) -> Vec<LifecycleAction> {
        [
            (self.install, LifecycleAction::Install),
            (self.uninstall, LifecycleAction::Uninstall),
            (self.start, LifecycleAction::Start),
            (self.stop, LifecycleAction::Stop),
            (self.status, LifecycleAction::Status),
            (self.generate_key, LifecycleAction::GenerateKey),
        ]
        .into_iter()
        .filter_map(|(requested, action)| requested.then_some(action))
        .collect()
    }

    /// True when no action flag was supplied.
    pub(crate) fn is_bare_invocation(&self) -> bool {
        self.actions().is_empty()
    }
}
