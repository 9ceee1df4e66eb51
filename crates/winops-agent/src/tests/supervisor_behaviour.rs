//! Behavioural tests for crash recovery and teardown of the API server.

use std::cell::RefCell;
use std::fs;
use std::sync::Arc;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::supervisor::{
    ServerLauncher, Supervisor, SupervisorError, SupervisorSettings, SupervisorState,
};
use crate::tests::support::{RecordingSupervisorReporter, ScriptInstall, process_alive, wait_for};

/// Records the key it was given and the pid of a grandchild, then idles.
const OBSERVING_SERVER: &str = "printf '%s' \"$WINOPSTOOL_API_KEY\" > seen_key.txt\n\
                                sleep 30 &\n\
                                echo $! > sleeper.pid\n\
                                wait\n";

type StepResult = Result<(), String>;

#[derive(Default)]
struct SupervisorWorld {
    supervisor: Option<Supervisor<ServerLauncher>>,
    install: Option<ScriptInstall>,
    reporter: Arc<RecordingSupervisorReporter>,
    first_pid: Option<u32>,
    sleeper_pid: Option<u32>,
    outcome: Option<Result<(), SupervisorError>>,
}

impl SupervisorWorld {
    fn install(&self) -> Result<&ScriptInstall, String> {
        self.install
            .as_ref()
            .ok_or_else(|| "no install prepared".to_owned())
    }

    fn supervisor(&self) -> Result<&Supervisor<ServerLauncher>, String> {
        self.supervisor
            .as_ref()
            .ok_or_else(|| "supervisor not started".to_owned())
    }

    fn supervisor_mut(&mut self) -> Result<&mut Supervisor<ServerLauncher>, String> {
        self.supervisor
            .as_mut()
            .ok_or_else(|| "supervisor not started".to_owned())
    }

    fn read_install_file(&self, name: &str) -> Result<String, String> {
        let path = self.install()?.paths().install_dir().join(name);
        let mut contents = None;
        if !wait_for(|| {
            contents = fs::read_to_string(&path)
                .ok()
                .filter(|text| !text.trim().is_empty());
            contents.is_some()
        }) {
            return Err(format!("{name} was never written"));
        }
        contents.ok_or_else(|| format!("{name} was never written"))
    }
}

#[fixture]
fn world() -> RefCell<SupervisorWorld> {
    RefCell::new(SupervisorWorld::default())
}

#[given("an API server that keeps running")]
fn given_running_server(world: &RefCell<SupervisorWorld>) {
    world.borrow_mut().install = Some(ScriptInstall::new(OBSERVING_SERVER));
}

#[given("an API server that exits immediately with code {code}")]
fn given_crashing_server(world: &RefCell<SupervisorWorld>, code: i32) {
    world.borrow_mut().install = Some(ScriptInstall::new(&format!("exit {code}\n")));
}

#[when("the supervisor starts")]
fn when_supervisor_starts(world: &RefCell<SupervisorWorld>) -> StepResult {
    let mut world = world.borrow_mut();
    let install = world.install()?;
    let launcher = ServerLauncher::new(install.config().clone(), install.paths().clone());
    let settings = SupervisorSettings::from_config(install.config());
    let mut supervisor = Supervisor::new(launcher, settings, world.reporter.clone());
    supervisor.start().map_err(|error| error.to_string())?;
    world.first_pid = supervisor.status().child_pid;
    world.supervisor = Some(supervisor);
    Ok(())
}

#[when("the API server is killed from outside")]
fn when_server_killed(world: &RefCell<SupervisorWorld>) -> StepResult {
    let pid = world
        .borrow()
        .first_pid
        .ok_or_else(|| "no server pid recorded".to_owned())?;
    let raw = i32::try_from(pid).map_err(|error| error.to_string())?;
    kill(Pid::from_raw(raw), Signal::SIGKILL).map_err(|error| error.to_string())
}

#[when("the supervisor is stopped")]
fn when_supervisor_stopped(world: &RefCell<SupervisorWorld>) -> StepResult {
    let sleeper = world.borrow().read_install_file("sleeper.pid")?;
    let sleeper_pid = sleeper.trim().parse::<u32>().map_err(|error| error.to_string())?;
    let mut world = world.borrow_mut();
    world.sleeper_pid = Some(sleeper_pid);
    let outcome = world.supervisor_mut()?.stop_and_wait();
    world.outcome = Some(outcome);
    Ok(())
}

#[then("the supervisor relaunches the API server once")]
fn then_relaunched_once(world: &RefCell<SupervisorWorld>) {
    let world = world.borrow();
    let supervisor = world.supervisor().expect("supervisor");
    let first = world.first_pid;
    assert!(wait_for(|| {
        let status = supervisor.status();
        status.state == SupervisorState::Running && status.child_pid != first
    }));
    assert_eq!(supervisor.status().restart_count, 1);
}

#[then("supervision ends with a fatal error")]
fn then_fatal(world: &RefCell<SupervisorWorld>) {
    let mut world = world.borrow_mut();
    let outcome = world.supervisor_mut().expect("supervisor").wait();
    let error = outcome.expect_err("crash loop should be fatal");
    assert!(error.is_fatal(), "unexpected error: {error}");
    world.outcome = Some(Err(error));
}

#[then("the restart count equals the restart limit")]
fn then_restart_count_is_limit(world: &RefCell<SupervisorWorld>) {
    let world = world.borrow();
    let limit = world.install().expect("install").config().restart_limit();
    let status = world.supervisor().expect("supervisor").status();
    assert_eq!(status.restart_count, limit);
    assert_eq!(status.state, SupervisorState::Stopped);
}

#[then("the last exit code is {code}")]
fn then_last_exit_code(world: &RefCell<SupervisorWorld>, code: i32) {
    let status = world.borrow().supervisor().expect("supervisor").status();
    assert_eq!(status.last_exit_code, Some(code));
}

#[then("the API server and its children are gone")]
fn then_tree_gone(world: &RefCell<SupervisorWorld>) {
    let world = world.borrow();
    let server = world.first_pid.expect("server pid");
    let sleeper = world.sleeper_pid.expect("sleeper pid");
    assert!(!process_alive(server), "server {server} survived the stop");
    assert!(wait_for(|| !process_alive(sleeper)), "grandchild {sleeper} survived");
}

#[then("the supervisor reports stopped")]
fn then_reports_stopped(world: &RefCell<SupervisorWorld>) {
    let world = world.borrow();
    assert!(matches!(world.outcome, Some(Ok(()))));
    let status = world.supervisor().expect("supervisor").status();
    assert_eq!(status.state, SupervisorState::Stopped);
    assert_eq!(status.child_pid, None);
}

#[then("the API server environment carries the stored key")]
fn then_key_injected(world: &RefCell<SupervisorWorld>) {
    let world = world.borrow();
    let seen = world.read_install_file("seen_key.txt").expect("seen key");
    let stored = world
        .install()
        .expect("install")
        .credentials()
        .read_key()
        .expect("read key")
        .expect("key stored on launch");
    assert_eq!(seen, stored.as_str());
}

#[scenario(
    path = "tests/features/supervisor.feature",
    name = "A crashed API server is relaunched"
)]
fn crashed_server_is_relaunched(world: RefCell<SupervisorWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/supervisor.feature",
    name = "A crash loop exhausts the restart budget"
)]
fn crash_loop_exhausts_budget(world: RefCell<SupervisorWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/supervisor.feature",
    name = "Stopping tears down the whole process tree"
)]
fn stop_tears_down_tree(world: RefCell<SupervisorWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/supervisor.feature",
    name = "The server receives the stored API key"
)]
fn server_receives_key(world: RefCell<SupervisorWorld>) {
    drop(world);
}
