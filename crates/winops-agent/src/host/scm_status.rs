//! Service status sequence reported to the Service Control Manager.
//!
//! A run goes `StartPending → Running → StopPending → Stopped`. The stop
//! control reports `StopPending` as soon as it arrives, so the SCM never
//! sees `Running` while the API server is being torn down.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;
use tracing::warn;

use super::HOST_TARGET;
use super::errors::HostError;

/// States the host reports to the SCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReportedState {
    StartPending,
    Running,
    StopPending,
    Stopped { exit_code: u32 },
}

/// Sink for service status updates.
pub(crate) trait StatusReporter: Send + Sync {
    fn report(&self, state: ReportedState) -> Result<(), HostError>;
}

/// Tracks the reported state of one service run.
///
/// The reporter is attached after the control handler is registered,
/// because registering is what yields the SCM status handle.
pub(crate) struct ScmStatus<R> {
    reporter: OnceCell<R>,
    last: Mutex<Option<ReportedState>>,
    stop_requested: Arc<AtomicBool>,
}

impl<R: StatusReporter> ScmStatus<R> {
    pub(crate) fn new() -> Self {
        Self {
            reporter: OnceCell::new(),
            last: Mutex::new(None),
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn attach(&self, reporter: R) {
        if self.reporter.set(reporter).is_err() {
            warn!(target: HOST_TARGET, "status reporter already attached");
        }
    }

    /// Flag raised by the stop control, polled by the wrapped host.
    pub(crate) fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_requested)
    }

    pub(crate) fn starting(&self) -> Result<(), HostError> {
        self.transition(ReportedState::StartPending)
    }

    pub(crate) fn running(&self) -> Result<(), HostError> {
        self.transition(ReportedState::Running)
    }

    /// Handles a stop or shutdown control. Repeated controls report once.
    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Err(error) = self.stopping() {
            warn!(target: HOST_TARGET, %error, "failed to report stop pending");
        }
    }

    /// Reports the final state, passing through `StopPending` when the run
    /// ended on its own after reaching `Running`.
    pub(crate) fn stopped(&self, failed: bool) -> Result<(), HostError> {
        self.stopping()?;
        self.transition(ReportedState::Stopped {
            exit_code: u32::from(failed),
        })
    }

    fn stopping(&self) -> Result<(), HostError> {
        let mut last = self.lock_last();
        if *last != Some(ReportedState::Running) {
            return Ok(());
        }
        self.send(ReportedState::StopPending)?;
        *last = Some(ReportedState::StopPending);
        Ok(())
    }

    fn transition(&self, state: ReportedState) -> Result<(), HostError> {
        let mut last = self.lock_last();
        if *last == Some(ReportedState::StopPending) && state == ReportedState::Running {
            return Ok(());
        }
        self.send(state)?;
        *last = Some(state);
        Ok(())
    }

    fn send(&self, state: ReportedState) -> Result<(), HostError> {
        match self.reporter.get() {
            Some(reporter) => reporter.report(state),
            None => Ok(()),
        }
    }

    fn lock_last(&self) -> std::sync::MutexGuard<'_, Option<ReportedState>> {
        self.last
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
