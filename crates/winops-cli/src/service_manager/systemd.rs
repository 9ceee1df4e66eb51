//! systemd adapter: the service is a system unit running the agent.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, warn};

use winops_config::ServiceIdentity;

use super::{
    ServiceDefinition, ServiceManager, ServiceManagerError, ServiceRunState,
};

const SYSTEM_UNIT_DIR: &str = "/etc/systemd/system";
const SERVICE_MANAGER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service_manager");

/// Captured result of one `systemctl` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemctlOutput {
    pub success: bool,
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs `systemctl` with the given arguments.
pub trait Systemctl {
    fn run(&self, args: &[&str]) -> Result<SystemctlOutput, ServiceManagerError>;
}

/// Invokes the real `systemctl` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSystemctl;

impl Systemctl for SystemSystemctl {
    fn run(&self, args: &[&str]) -> Result<SystemctlOutput, ServiceManagerError> {
        let output = Command::new("systemctl")
            .args(args)
            .output()
            .map_err(|source| ServiceManagerError::Spawn {
                program: "systemctl".to_owned(),
                source,
            })?;
        Ok(SystemctlOutput {
            success: output.status.success(),
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Registers the service as a systemd unit.
#[derive(Debug)]
pub struct SystemdServiceManager<S> {
    identity: ServiceIdentity,
    unit_dir: PathBuf,
    systemctl: S,
}

impl SystemdServiceManager<SystemSystemctl> {
    #[must_use]
    pub fn system(identity: ServiceIdentity) -> Self {
        Self::new(identity, SYSTEM_UNIT_DIR, SystemSystemctl)
    }
}

impl<S: Systemctl> SystemdServiceManager<S> {
    #[must_use]
    pub fn new(identity: ServiceIdentity, unit_dir: impl Into<PathBuf>, systemctl: S) -> Self {
        Self {
            identity,
            unit_dir: unit_dir.into(),
            systemctl,
        }
    }

    #[must_use]
    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(self.identity.unit_name())
    }

    fn checked(&self, args: &[&str]) -> Result<SystemctlOutput, ServiceManagerError> {
        let output = self.systemctl.run(args)?;
        if output.success {
            Ok(output)
        } else {
            Err(ServiceManagerError::CommandFailed {
                command: format!("systemctl {}", args.join(" ")),
                status: output.status,
                stderr: output.stderr.trim().to_owned(),
            })
        }
    }

    /// Removes a unit file whose registration did not complete, so the
    /// service does not look installed.
    fn discard_unit(&self, path: &Path) {
        if let Err(error) = fs::remove_file(path) {
            warn!(
                target: SERVICE_MANAGER_TARGET,
                file = %path.display(),
                %error,
                "failed to remove incomplete systemd unit"
            );
            return;
        }
        if let Err(error) = self.checked(&["daemon-reload"]) {
            warn!(target: SERVICE_MANAGER_TARGET, %error, "daemon-reload after rollback failed");
        }
    }

    fn ensure_installed(&self) -> Result<(), ServiceManagerError> {
        if self.unit_path().exists() {
            Ok(())
        } else {
            Err(ServiceManagerError::NotInstalled {
                name: self.identity.name.to_owned(),
            })
        }
    }
}

impl<S: Systemctl> ServiceManager for SystemdServiceManager<S> {
    fn is_installed(&self) -> Result<bool, ServiceManagerError> {
        Ok(self.unit_path().exists())
    }

    fn install(&self, definition: &ServiceDefinition) -> Result<(), ServiceManagerError> {
        let path = self.unit_path();
        fs::create_dir_all(&self.unit_dir)
            .and_then(|()| fs::write(&path, render_unit(definition)))
            .map_err(|source| ServiceManagerError::WriteDefinition {
                path: path.clone(),
                source,
            })?;
        let unit = self.identity.unit_name();
        if let Err(error) = self
            .checked(&["daemon-reload"])
            .and_then(|_| self.checked(&["enable", &unit]))
        {
            self.discard_unit(&path);
            return Err(error);
        }
        info!(
            target: SERVICE_MANAGER_TARGET,
            unit = %unit,
            file = %path.display(),
            "systemd unit installed"
        );
        Ok(())
    }

    fn uninstall(&self) -> Result<(), ServiceManagerError> {
        self.ensure_installed()?;
        let unit = self.identity.unit_name();
        self.checked(&["disable", &unit])?;
        let path = self.unit_path();
        fs::remove_file(&path).map_err(|source| ServiceManagerError::RemoveDefinition {
            path: path.clone(),
            source,
        })?;
        self.checked(&["daemon-reload"])?;
        info!(target: SERVICE_MANAGER_TARGET, unit = %unit, "systemd unit removed");
        Ok(())
    }

    fn start(&self) -> Result<(), ServiceManagerError> {
        self.ensure_installed()?;
        self.checked(&["start", &self.identity.unit_name()]).map(drop)
    }

    fn stop(&self) -> Result<(), ServiceManagerError> {
        self.ensure_installed()?;
        self.checked(&["stop", &self.identity.unit_name()]).map(drop)
    }

    fn run_state(&self) -> Result<ServiceRunState, ServiceManagerError> {
        // `is-active` exits non-zero for every state except active.
        let output = self.systemctl.run(&["is-active", &self.identity.unit_name()])?;
        Ok(match output.stdout.trim() {
            "active" => ServiceRunState::Running,
            "activating" | "reloading" => ServiceRunState::Starting,
            "deactivating" => ServiceRunState::Stopping,
            "inactive" | "failed" => ServiceRunState::Stopped,
            _ => ServiceRunState::Unknown,
        })
    }
}

fn render_unit(definition: &ServiceDefinition) -> String {
    let mut exec_start = quote(&definition.executable);
    for argument in &definition.arguments {
        exec_start.push(' ');
        exec_start.push_str(&quote(Path::new(argument)));
    }
    format!(
        "[Unit]\n\
         Description={description}\n\
         Documentation=man:winops(1)\n\
         After=network-online.target\n\
         Wants=network-online.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         ExecStart={exec_start}\n\
         WorkingDirectory={working_directory}\n\
         KillMode=mixed\n\
         TimeoutStopSec=30\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        description = definition.identity.description,
        working_directory = quote(&definition.working_directory),
    )
}

fn quote(value: &Path) -> String {
    let text = value.to_string_lossy();
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
