//! Windows Service Control Manager adapter.
//!
//! The SCM calls `service_main` on a dispatcher thread. Stop and shutdown
//! controls report `StopPending` and raise a flag that the wrapped
//! [`ConsoleHost`] polls, so the service lifecycle is the same one the
//! console host runs.

use std::ffi::OsString;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::{error, info};
use windows_service::service::{
    ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState, ServiceStatus,
    ServiceType,
};
use windows_service::service_control_handler::{self, ServiceControlHandlerResult, ServiceStatusHandle};
use windows_service::{define_windows_service, service_dispatcher};

use winops_config::{Config, InstallPaths, SERVICE_IDENTITY};

use super::console::ConsoleHost;
use super::errors::HostError;
use super::scm_status::{ReportedState, ScmStatus, StatusReporter};
use super::shutdown::ShutdownSignal;
use super::{HOST_TARGET, SupervisedService};

/// Win32 `ERROR_FAILED_SERVICE_CONTROLLER_CONNECT`.
const NOT_STARTED_BY_SCM: i32 = 1063;
const STOP_WAIT_HINT: Duration = Duration::from_secs(30);

static SERVICE_CONFIG: OnceCell<Config> = OnceCell::new();
static SERVICE_OUTCOME: Mutex<Option<HostError>> = Mutex::new(None);

define_windows_service!(ffi_service_main, service_main);

/// Hands the current thread to the SCM dispatcher.
///
/// Returns [`HostError::NotUnderScm`] when the process was started from a
/// console rather than by the SCM.
pub fn run_under_scm(config: &Config) -> Result<(), HostError> {
    let _ = SERVICE_CONFIG.set(config.clone());
    service_dispatcher::start(SERVICE_IDENTITY.name, ffi_service_main).map_err(|source| {
        match source {
            windows_service::Error::Winapi(ref io)
                if io.raw_os_error() == Some(NOT_STARTED_BY_SCM) =>
            {
                HostError::NotUnderScm
            }
            other => HostError::ServiceControl { source: other },
        }
    })?;
    let outcome = SERVICE_OUTCOME
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .take();
    outcome.map_or(Ok(()), Err)
}

fn service_main(_arguments: Vec<OsString>) {
    let Some(config) = SERVICE_CONFIG.get() else {
        error!(target: HOST_TARGET, "service started without configuration");
        return;
    };
    if let Err(error) = run_service(config) {
        error!(target: HOST_TARGET, %error, "service terminated with error");
        *SERVICE_OUTCOME
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(error);
    }
}

#[derive(Debug, Clone)]
struct ControlSignal {
    flag: Arc<AtomicBool>,
}

impl ShutdownSignal for ControlSignal {
    fn triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Reports status through the handle returned by control handler
/// registration.
struct HandleReporter(ServiceStatusHandle);

impl StatusReporter for HandleReporter {
    fn report(&self, state: ReportedState) -> Result<(), HostError> {
        let (current_state, exit_code) = match state {
            ReportedState::StartPending => (ServiceState::StartPending, 0),
            ReportedState::Running => (ServiceState::Running, 0),
            ReportedState::StopPending => (ServiceState::StopPending, 0),
            ReportedState::Stopped { exit_code } => (ServiceState::Stopped, exit_code),
        };
        let controls_accepted = match current_state {
            ServiceState::Running => ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN,
            _ => ServiceControlAccept::empty(),
        };
        let wait_hint = match current_state {
            ServiceState::StartPending | ServiceState::StopPending => STOP_WAIT_HINT,
            _ => Duration::ZERO,
        };
        self.0
            .set_service_status(ServiceStatus {
                service_type: ServiceType::OWN_PROCESS,
                current_state,
                controls_accepted,
                exit_code: ServiceExitCode::Win32(exit_code),
                checkpoint: 0,
                wait_hint,
                process_id: None,
            })
            .map_err(|source| HostError::ServiceControl { source })
    }
}

fn run_service(config: &Config) -> Result<(), HostError> {
    let status = Arc::new(ScmStatus::<HandleReporter>::new());
    let signal = ControlSignal {
        flag: status.stop_flag(),
    };
    let control_status = Arc::clone(&status);
    let status_handle = service_control_handler::register(
        SERVICE_IDENTITY.name,
        move |control| match control {
            ServiceControl::Stop | ServiceControl::Shutdown => {
                info!(target: HOST_TARGET, ?control, "stop requested by SCM");
                control_status.request_stop();
                ServiceControlHandlerResult::NoError
            }
            ServiceControl::Interrogate => ServiceControlHandlerResult::NoError,
            _ => ServiceControlHandlerResult::NotImplemented,
        },
    )
    .map_err(|source| HostError::ServiceControl { source })?;
    status.attach(HandleReporter(status_handle));

    status.starting()?;
    let outcome = InstallPaths::from_config(config)
        .map_err(HostError::from)
        .and_then(|paths| {
            let mut service = SupervisedService::from_config(config, paths.clone());
            status.running()?;
            ConsoleHost::new(paths, signal).run(&mut service)
        });
    status.stopped(outcome.is_err())?;
    outcome
}
