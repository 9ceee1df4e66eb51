//! Windows Service Control Manager adapter.

use std::ffi::{OsStr, OsString};

use tracing::info;
use windows_service::service::{
    Service, ServiceAccess, ServiceErrorControl, ServiceInfo, ServiceStartType, ServiceState,
    ServiceType,
};
use windows_service::service_manager::{
    ServiceManager as ScmConnection, ServiceManagerAccess,
};

use winops_config::ServiceIdentity;

use super::{
    ServiceDefinition, ServiceManager, ServiceManagerError, ServiceRunState,
};

const SERVICE_MANAGER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::service_manager");
const ERROR_SERVICE_DOES_NOT_EXIST: i32 = 1060;
const ERROR_SERVICE_NOT_ACTIVE: i32 = 1062;

/// Registers the service with the local Service Control Manager.
#[derive(Debug, Clone, Copy)]
pub struct ScmServiceManager {
    identity: ServiceIdentity,
}

impl ScmServiceManager {
    #[must_use]
    pub const fn new(identity: ServiceIdentity) -> Self {
        Self { identity }
    }

    fn connect(access: ServiceManagerAccess) -> Result<ScmConnection, ServiceManagerError> {
        ScmConnection::local_computer(None::<&str>, access).map_err(scm_error)
    }

    fn open(&self, access: ServiceAccess) -> Result<Service, ServiceManagerError> {
        let manager = Self::connect(ServiceManagerAccess::CONNECT)?;
        manager
            .open_service(self.identity.name, access)
            .map_err(|error| {
                if os_error(&error) == Some(ERROR_SERVICE_DOES_NOT_EXIST) {
                    ServiceManagerError::NotInstalled {
                        name: self.identity.name.to_owned(),
                    }
                } else {
                    scm_error(error)
                }
            })
    }
}

impl ServiceManager for ScmServiceManager {
    fn is_installed(&self) -> Result<bool, ServiceManagerError> {
        match self.open(ServiceAccess::QUERY_STATUS) {
            Ok(_) => Ok(true),
            Err(ServiceManagerError::NotInstalled { .. }) => Ok(false),
            Err(error) => Err(error),
        }
    }

    fn install(&self, definition: &ServiceDefinition) -> Result<(), ServiceManagerError> {
        let manager =
            Self::connect(ServiceManagerAccess::CONNECT | ServiceManagerAccess::CREATE_SERVICE)?;
        // The SCM has no working directory setting; the agent receives its
        // install directory as an argument instead.
        let info = ServiceInfo {
            name: OsString::from(definition.identity.name),
            display_name: OsString::from(definition.identity.display_name),
            service_type: ServiceType::OWN_PROCESS,
            start_type: ServiceStartType::AutoStart,
            error_control: ServiceErrorControl::Normal,
            executable_path: definition.executable.clone(),
            launch_arguments: definition.arguments.clone(),
            dependencies: Vec::new(),
            account_name: None,
            account_password: None,
        };
        let service = manager
            .create_service(&info, ServiceAccess::CHANGE_CONFIG)
            .map_err(scm_error)?;
        service
            .set_description(definition.identity.description)
            .map_err(scm_error)?;
        info!(
            target: SERVICE_MANAGER_TARGET,
            service = definition.identity.name,
            executable = %definition.executable.display(),
            "service registered"
        );
        Ok(())
    }

    fn uninstall(&self) -> Result<(), ServiceManagerError> {
        let service = self.open(ServiceAccess::DELETE)?;
        service.delete().map_err(scm_error)?;
        info!(target: SERVICE_MANAGER_TARGET, service = self.identity.name, "service deleted");
        Ok(())
    }

    fn start(&self) -> Result<(), ServiceManagerError> {
        let service = self.open(ServiceAccess::START)?;
        service.start::<&OsStr>(&[]).map_err(scm_error)
    }

    fn stop(&self) -> Result<(), ServiceManagerError> {
        let service = self.open(ServiceAccess::STOP)?;
        match service.stop() {
            Ok(_) => Ok(()),
            Err(error) if os_error(&error) == Some(ERROR_SERVICE_NOT_ACTIVE) => Ok(()),
            Err(error) => Err(scm_error(error)),
        }
    }

    fn run_state(&self) -> Result<ServiceRunState, ServiceManagerError> {
        let service = self.open(ServiceAccess::QUERY_STATUS)?;
        let status = service.query_status().map_err(scm_error)?;
        Ok(match status.current_state {
            ServiceState::Running => ServiceRunState::Running,
            ServiceState::StartPending | ServiceState::ContinuePending => {
                ServiceRunState::Starting
            }
            ServiceState::StopPending => ServiceRunState::Stopping,
            ServiceState::Stopped => ServiceRunState::Stopped,
            ServiceState::PausePending | ServiceState::Paused => ServiceRunState::Unknown,
        })
    }
}

fn os_error(error: &windows_service::Error) -> Option<i32> {
    match error {
        windows_service::Error::Winapi(io_error) => io_error.raw_os_error(),
        _ => None,
    }
}

fn scm_error(source: windows_service::Error) -> ServiceManagerError {
    ServiceManagerError::Scm { source }
}
