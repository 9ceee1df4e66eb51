//! Doubles shared by the CLI test suites.

use std::cell::RefCell;
use std::ffi::OsString;
use std::rc::Rc;

use tempfile::TempDir;
use winops_agent::HostError;
use winops_config::Config;

use crate::lifecycle::ForegroundHost;
use crate::service_manager::{
    ServiceDefinition, ServiceManager, ServiceManagerError, ServiceRunState,
};
use crate::{AppError, ConfigLoader};

/// Fails the test if configuration is ever loaded.
pub(in crate::tests) struct PanickingLoader;

impl ConfigLoader for PanickingLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        panic!("configuration must not be loaded");
    }
}

/// Returns a fixed configuration rooted in a temporary install directory.
pub(in crate::tests) struct TempInstallLoader {
    pub dir: TempDir,
}

impl TempInstallLoader {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("install dir"),
        }
    }
}

impl ConfigLoader for TempInstallLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        let install_dir = camino::Utf8PathBuf::from_path_buf(self.dir.path().to_path_buf())
            .expect("utf8 temp dir");
        Ok(Config {
            install_dir: Some(install_dir),
            ..Config::default()
        })
    }
}

#[derive(Debug, Default)]
pub(in crate::tests) struct FakeManagerState {
    pub definition: Option<ServiceDefinition>,
    pub run_state: Option<ServiceRunState>,
    pub calls: Vec<&'static str>,
    pub refuse_stop: bool,
}

/// In-memory service manager whose state stays observable after it is
/// moved into a lifecycle controller.
#[derive(Debug, Clone, Default)]
pub(in crate::tests) struct FakeServiceManager {
    pub state: Rc<RefCell<FakeManagerState>>,
}

impl FakeServiceManager {
    fn record(&self, call: &'static str) {
        self.state.borrow_mut().calls.push(call);
    }

    fn require_installed(&self) -> Result<(), ServiceManagerError> {
        if self.state.borrow().definition.is_some() {
            Ok(())
        } else {
            Err(ServiceManagerError::NotInstalled {
                name: winops_config::SERVICE_IDENTITY.name.to_owned(),
            })
        }
    }
}

impl ServiceManager for FakeServiceManager {
    fn is_installed(&self) -> Result<bool, ServiceManagerError> {
        self.record("is_installed");
        Ok(self.state.borrow().definition.is_some())
    }

    fn install(&self, definition: &ServiceDefinition) -> Result<(), ServiceManagerError> {
        self.record("install");
        let mut state = self.state.borrow_mut();
        state.definition = Some(definition.clone());
        state.run_state = Some(ServiceRunState::Stopped);
        Ok(())
    }

    fn uninstall(&self) -> Result<(), ServiceManagerError> {
        self.record("uninstall");
        self.require_installed()?;
        let mut state = self.state.borrow_mut();
        state.definition = None;
        state.run_state = None;
        Ok(())
    }

    fn start(&self) -> Result<(), ServiceManagerError> {
        self.record("start");
        self.require_installed()?;
        self.state.borrow_mut().run_state = Some(ServiceRunState::Running);
        Ok(())
    }

    fn stop(&self) -> Result<(), ServiceManagerError> {
        self.record("stop");
        self.require_installed()?;
        let mut state = self.state.borrow_mut();
        if state.refuse_stop {
            return Err(ServiceManagerError::CommandFailed {
                command: "stop".to_owned(),
                status: Some(1),
                stderr: "service did not respond".to_owned(),
            });
        }
        state.run_state = Some(ServiceRunState::Stopped);
        Ok(())
    }

    fn run_state(&self) -> Result<ServiceRunState, ServiceManagerError> {
        self.record("run_state");
        self.require_installed()?;
        Ok(self
            .state
            .borrow()
            .run_state
            .unwrap_or(ServiceRunState::Unknown))
    }
}

/// Counts foreground runs instead of hosting the agent.
#[derive(Debug, Clone, Default)]
pub(in crate::tests) struct RecordingForeground {
    pub runs: Rc<RefCell<u32>>,
}

impl ForegroundHost for RecordingForeground {
    fn run(&self, _config: &Config) -> Result<(), HostError> {
        *self.runs.borrow_mut() += 1;
        Ok(())
    }
}
