//! Orchestrates the service lifecycle actions.
//!
//! Registered services are driven through the host service manager. When the
//! service is not registered, `start` hosts the agent in this console and
//! `stop` signals a console host found in the install directory.

use std::env;
use std::io::Write;
use std::path::PathBuf;

use tracing::{info, warn};

use winops_agent::{CredentialStore, HostError, StatusSnapshot, process_exists, run_console};
use winops_config::{Config, SERVICE_IDENTITY};

use super::error::LifecycleError;
use super::monitoring::{open_install_dir, read_pid, read_status};
use super::shutdown::{signal_host, wait_for_shutdown};
use super::spawning::{AGENT_BIN_ENV, resolve_agent_binary, service_definition};
use super::types::{LifecycleAction, LifecycleContext, LifecycleOutput};
use crate::service_manager::{
    ServiceManager, SystemServiceManager, system_service_manager,
};

const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");

/// Runs the agent in the foreground when the service is not registered.
pub trait ForegroundHost {
    fn run(&self, config: &Config) -> Result<(), HostError>;
}

/// Hosts the supervisor in this process until interrupted.
#[derive(Debug, Default, Clone, Copy)]
pub struct AgentConsoleHost;

impl ForegroundHost for AgentConsoleHost {
    fn run(&self, config: &Config) -> Result<(), HostError> {
        run_console(config)
    }
}

/// Executes [`LifecycleAction`]s against a service manager.
#[derive(Debug)]
pub struct ServiceLifecycle<M, F> {
    manager: M,
    foreground: F,
    agent_binary: Option<PathBuf>,
}

/// Production lifecycle controller.
pub type SystemLifecycle = ServiceLifecycle<SystemServiceManager, AgentConsoleHost>;

impl SystemLifecycle {
    /// Controller for the running host, honouring `WINOPS_AGENT_BIN`.
    #[must_use]
    pub fn system() -> Self {
        let lifecycle = ServiceLifecycle::new(system_service_manager(), AgentConsoleHost);
        match env::var_os(AGENT_BIN_ENV) {
            Some(binary) => lifecycle.with_agent_binary(binary),
            None => lifecycle,
        }
    }
}

impl<M: ServiceManager, F: ForegroundHost> ServiceLifecycle<M, F> {
    #[must_use]
    pub fn new(manager: M, foreground: F) -> Self {
        Self {
            manager,
            foreground,
            agent_binary: None,
        }
    }

    /// Registers `binary` instead of the agent next to the CLI.
    #[must_use]
    pub fn with_agent_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.agent_binary = Some(binary.into());
        self
    }

    pub fn handle<W: Write, E: Write>(
        &mut self,
        action: LifecycleAction,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<(), LifecycleError> {
        info!(target: LIFECYCLE_TARGET, %action, "running lifecycle action");
        match action {
            LifecycleAction::Install => self.install(context, output),
            LifecycleAction::Uninstall => self.uninstall(output),
            LifecycleAction::Start => self.start(context, output),
            LifecycleAction::Stop => self.stop(context, output),
            LifecycleAction::Status => self.status(context, output),
            LifecycleAction::GenerateKey => Self::generate_key(context, output),
        }
    }

    fn install<W: Write, E: Write>(
        &mut self,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<(), LifecycleError> {
        let installed = self
            .manager
            .is_installed()
            .map_err(|source| LifecycleError::Install { source })?;
        if installed {
            output.stderr_line(format_args!(
                "service {} is already installed; keeping its registration",
                SERVICE_IDENTITY.name
            ))?;
        } else {
            let binary = resolve_agent_binary(self.agent_binary.as_deref())?;
            let definition = service_definition(binary, context.paths)?;
            self.manager
                .install(&definition)
                .map_err(|source| LifecycleError::Install { source })?;
            output.stdout_line(format_args!(
                "service {} installed (automatic start)",
                SERVICE_IDENTITY.name
            ))?;
        }
        let key = CredentialStore::for_install(context.paths).get_or_create_key()?;
        output.stdout_line(format_args!("API key: {}", key.as_str()))
    }

    fn uninstall<W: Write, E: Write>(
        &mut self,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<(), LifecycleError> {
        if let Err(error) = self.manager.stop() {
            warn!(
                target: LIFECYCLE_TARGET,
                %error,
                "ignoring failure to stop the service before uninstalling"
            );
        }
        self.manager
            .uninstall()
            .map_err(|source| LifecycleError::Uninstall { source })?;
        output.stdout_line(format_args!(
            "service {} uninstalled",
            SERVICE_IDENTITY.name
        ))
    }

    fn start<W: Write, E: Write>(
        &mut self,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<(), LifecycleError> {
        let installed = self
            .manager
            .is_installed()
            .map_err(|source| LifecycleError::Start { source })?;
        if installed {
            self.manager
                .start()
                .map_err(|source| LifecycleError::Start { source })?;
            return output.stdout_line(format_args!(
                "service {} started",
                SERVICE_IDENTITY.name
            ));
        }
        output.stderr_line(format_args!(
            "service {} is not installed; running the API server in this console (Ctrl+C stops it)",
            SERVICE_IDENTITY.name
        ))?;
        self.foreground.run(context.config)?;
        output.stdout_line(format_args!("console host stopped"))
    }

    fn stop<W: Write, E: Write>(
        &mut self,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<(), LifecycleError> {
        let installed = self
            .manager
            .is_installed()
            .map_err(|source| LifecycleError::Stop { source })?;
        if installed {
            self.manager
                .stop()
                .map_err(|source| LifecycleError::Stop { source })?;
            return output.stdout_line(format_args!(
                "service {} stopped",
                SERVICE_IDENTITY.name
            ));
        }
        let dir = open_install_dir(context.paths)?;
        let Some(pid) = read_pid(&dir, context.paths.pid_path())? else {
            return output.stdout_line(format_args!(
                "service is not running (no console host pid file at {})",
                context.paths.pid_path().display()
            ));
        };
        if !process_exists(pid)? {
            return output.stdout_line(format_args!(
                "service is not running (stale runtime files for pid {pid})"
            ));
        }
        signal_host(pid)?;
        wait_for_shutdown(context.paths)?;
        output.stdout_line(format_args!("console host pid {pid} stopped"))
    }

    fn status<W: Write, E: Write>(
        &mut self,
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<(), LifecycleError> {
        let installed = self
            .manager
            .is_installed()
            .map_err(|source| LifecycleError::Query { source })?;
        let dir = open_install_dir(context.paths)?;
        let snapshot = read_status(&dir, context.paths.status_path())?;
        output.stdout_line(format_args!(
            "service: {} ({})",
            SERVICE_IDENTITY.name, SERVICE_IDENTITY.display_name
        ))?;
        output.stdout_line(format_args!(
            "installed: {}",
            if installed { "yes" } else { "no" }
        ))?;
        if installed {
            let state = self
                .manager
                .run_state()
                .map_err(|source| LifecycleError::Query { source })?;
            output.stdout_line(format_args!(
                "running: {} ({state})",
                if state.is_running() { "yes" } else { "no" }
            ))?;
        } else {
            let pid = read_pid(&dir, context.paths.pid_path())?;
            write_console_state(output, snapshot.as_ref(), pid)?;
        }
        if let Some(supervisor) = snapshot.as_ref().and_then(|s| s.supervisor.as_ref()) {
            output.stdout_line(format_args!("restarts: {}", supervisor.restart_count))?;
        }
        match CredentialStore::for_install(context.paths).read_key()? {
            Some(key) => output.stdout_line(format_args!("API key: {}", key.as_str())),
            None => output.stdout_line(format_args!(
                "API key: none (created by --install or --generate-key)"
            )),
        }
    }

    fn generate_key<W: Write, E: Write>(
        context: LifecycleContext<'_>,
        output: &mut LifecycleOutput<W, E>,
    ) -> Result<(), LifecycleError> {
        let key = CredentialStore::for_install(context.paths).regenerate_key()?;
        output.stdout_line(format_args!("new API key: {}", key.as_str()))?;
        output.stderr_line(format_args!(
            "a running API server keeps its old key until it is restarted"
        ))
    }
}

fn write_console_state<W: Write, E: Write>(
    output: &mut LifecycleOutput<W, E>,
    snapshot: Option<&StatusSnapshot>,
    pid: Option<u32>,
) -> Result<(), LifecycleError> {
    let Some(pid) = snapshot.map(|snapshot| snapshot.pid).or(pid) else {
        return output.stdout_line(format_args!("running: no"));
    };
    if !process_exists(pid)? {
        return output.stdout_line(format_args!(
            "running: no (stale runtime files for pid {pid})"
        ));
    }
    match snapshot {
        Some(snapshot) => output.stdout_line(format_args!(
            "running: yes (console host pid {pid}, {})",
            host_state_label(snapshot)
        )),
        None => output.stdout_line(format_args!(
            "running: yes (console host pid {pid}, status snapshot missing)"
        )),
    }
}

fn host_state_label(snapshot: &StatusSnapshot) -> String {
    match &snapshot.supervisor {
        Some(supervisor) => format!("{}, api server {}", snapshot.status, supervisor.state),
        None => snapshot.status.to_string(),
    }
}
