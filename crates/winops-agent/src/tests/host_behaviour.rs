//! Behavioural tests for the console host and its runtime files.

use std::cell::RefCell;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::host::{
    ConsoleHost, HostError, HostState, ShutdownSignal, StatusSnapshot, SupervisedService,
};
use crate::supervisor::SupervisorState;
use crate::tests::support::{CRASHING_SERVER, LONG_RUNNING_SERVER, ScriptInstall, wait_for};

const REFRESH: Duration = Duration::from_millis(50);

type StepResult = Result<(), String>;

#[derive(Debug, Clone, Default)]
struct TestShutdownSignal {
    flag: Arc<AtomicBool>,
}

impl TestShutdownSignal {
    fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

impl ShutdownSignal for TestShutdownSignal {
    fn triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct HostWorld {
    handle: Option<JoinHandle<Result<(), HostError>>>,
    result: Option<Result<(), HostError>>,
    shutdown: TestShutdownSignal,
    install: Option<ScriptInstall>,
}

impl HostWorld {
    fn install(&self) -> Result<&ScriptInstall, String> {
        self.install
            .as_ref()
            .ok_or_else(|| "no install prepared".to_owned())
    }

    fn host(&self) -> Result<ConsoleHost<TestShutdownSignal>, String> {
        let paths = self.install()?.paths().clone();
        Ok(ConsoleHost::new(paths, self.shutdown.clone()).with_refresh(REFRESH))
    }

    fn service(&self) -> Result<SupervisedService, String> {
        let install = self.install()?;
        Ok(SupervisedService::from_config(
            install.config(),
            install.paths().clone(),
        ))
    }

    fn read_status(&self) -> Option<StatusSnapshot> {
        let install = self.install.as_ref()?;
        let raw = fs::read_to_string(install.paths().status_path()).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn join(&mut self) -> Result<&Result<(), HostError>, String> {
        if let Some(handle) = self.handle.take() {
            let result = handle
                .join()
                .map_err(|_| "host thread panicked".to_owned())?;
            self.result = Some(result);
        }
        self.result
            .as_ref()
            .ok_or_else(|| "host never ran".to_owned())
    }
}

impl Drop for HostWorld {
    fn drop(&mut self) {
        self.shutdown.trigger();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[fixture]
fn world() -> RefCell<HostWorld> {
    RefCell::new(HostWorld::default())
}

#[given("an install whose API server keeps running")]
fn given_running_install(world: &RefCell<HostWorld>) {
    world.borrow_mut().install = Some(ScriptInstall::new(LONG_RUNNING_SERVER));
}

#[given("an install whose API server crashes on start")]
fn given_crashing_install(world: &RefCell<HostWorld>) {
    world.borrow_mut().install = Some(ScriptInstall::new(CRASHING_SERVER));
}

#[when("the console host runs in the background")]
fn when_host_runs(world: &RefCell<HostWorld>) -> StepResult {
    let mut world = world.borrow_mut();
    let host = world.host()?;
    let mut service = world.service()?;
    world.handle = Some(thread::spawn(move || host.run(&mut service)));
    Ok(())
}

#[when("shutdown is requested")]
fn when_shutdown_requested(world: &RefCell<HostWorld>) {
    world.borrow().shutdown.trigger();
}

#[then("the status snapshot reports ready with a running supervisor")]
fn then_status_ready(world: &RefCell<HostWorld>) {
    let world = world.borrow();
    let mut last = None;
    let ready = wait_for(|| {
        last = world.read_status();
        last.as_ref().is_some_and(|snapshot| {
            snapshot.status == HostState::Ready
                && snapshot
                    .supervisor
                    .as_ref()
                    .is_some_and(|status| status.state == SupervisorState::Running)
        })
    });
    assert!(ready, "host never reported ready: {last:?}");
}

#[then("the pid file records this process")]
fn then_pid_recorded(world: &RefCell<HostWorld>) {
    let world = world.borrow();
    let path = world.install().expect("install").paths().pid_path().to_path_buf();
    let content = fs::read_to_string(path).expect("pid file should be readable");
    let pid: u32 = content.trim().parse().expect("pid file should hold an integer");
    assert_eq!(pid, std::process::id());
}

#[then("the host exits cleanly")]
fn then_host_exits_cleanly(world: &RefCell<HostWorld>) {
    let mut world = world.borrow_mut();
    let result = world.join().expect("host result");
    assert!(result.is_ok(), "host failed: {result:?}");
}

#[then("the host exits with a supervisor failure")]
fn then_host_fails(world: &RefCell<HostWorld>) {
    let mut world = world.borrow_mut();
    let result = world.join().expect("host result");
    match result {
        Err(HostError::ServiceFailed { message }) => {
            assert!(message.starts_with("SupervisorFatal"), "unexpected message: {message}");
        }
        other => panic!("expected a service failure, got {other:?}"),
    }
}

#[then("the runtime files are removed")]
fn then_runtime_removed(world: &RefCell<HostWorld>) {
    let world = world.borrow();
    let paths = world.install().expect("install").paths();
    assert!(!paths.lock_path().exists(), "lock file should be removed");
    assert!(!paths.pid_path().exists(), "pid file should be removed");
    assert!(!paths.status_path().exists(), "status file should be removed");
}

#[then("running a second host fails because one is already running")]
fn then_second_host_refused(world: &RefCell<HostWorld>) {
    let world = world.borrow();
    let paths = world.install().expect("install").paths().clone();
    let lock = paths.lock_path();
    assert!(
        wait_for(|| paths.pid_path().exists()),
        "first host never wrote its pid"
    );
    let second = world.host().expect("host");
    let mut service = world.service().expect("service");
    match second.run(&mut service) {
        Err(HostError::AlreadyRunning { pid }) => assert_eq!(pid, std::process::id()),
        other => panic!("expected already running, got {other:?}"),
    }
    assert!(lock.exists(), "refused host must not remove the owner's lock");
}

#[scenario(
    path = "tests/features/host.feature",
    name = "The host publishes runtime files while it runs"
)]
fn host_publishes_runtime_files(world: RefCell<HostWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/host.feature",
    name = "A second host on the same install is refused"
)]
fn second_host_is_refused(world: RefCell<HostWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/host.feature",
    name = "A supervisor failure stops the host"
)]
fn supervisor_failure_stops_host(world: RefCell<HostWorld>) {
    drop(world);
}
