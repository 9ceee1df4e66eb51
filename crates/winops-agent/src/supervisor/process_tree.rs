//! Termination of the API server together with every process it spawned.
//!
//! On Unix the server leads its own process group. Descendants are collected
//! before anything is signalled, because an orphaned grandchild is
//! re-parented and can no longer be found through its original parent. They
//! are asked to exit first, deepest first, then the server itself. Anything
//! still alive after the grace period is killed. On Windows `taskkill /T`
//! walks the tree.

use std::io;
use std::process::{Child, ExitStatus};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::SUPERVISOR_TARGET;

const REAP_POLL: Duration = Duration::from_millis(25);

/// Terminates `child` and its descendants, escalating after `grace`.
pub(crate) fn terminate_tree(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    let root = child.id();
    let descendants = platform::descendants(root);
    debug!(
        target: SUPERVISOR_TARGET,
        pid = root,
        descendants = descendants.len(),
        "terminating API server process tree"
    );
    platform::request_exit(root, &descendants);
    let deadline = Instant::now() + grace;
    let status = wait_until(child, deadline)?;
    platform::force_kill(root, &descendants, status.is_none());
    match status {
        Some(status) => Ok(status),
        None => {
            match child.kill() {
                Err(error) if error.kind() != io::ErrorKind::InvalidInput => return Err(error),
                _ => {}
            }
            child.wait()
        }
    }
}

/// Kills processes left in the group of a server that already exited.
///
/// The group is only signalled while a member other than the reaped leader
/// is seen in it. A group ID is not handed out again while the group has
/// members, so this never reaches a process that merely reused the pid.
pub(crate) fn kill_leftovers(root: u32) {
    let members = platform::group_members(root);
    if members.is_empty() {
        return;
    }
    debug!(
        target: SUPERVISOR_TARGET,
        pgid = root,
        members = members.len(),
        "killing processes left by the API server"
    );
    platform::kill_group(root);
}

fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(REAP_POLL);
    }
}

#[cfg(unix)]
mod platform {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, kill, killpg};
    use nix::unistd::Pid;

    pub(super) fn descendants(root: u32) -> Vec<u32> {
        super::proc_scan::descendants(root)
    }

    pub(super) fn request_exit(root: u32, descendants: &[u32]) {
        for pid in descendants {
            send(*pid, Signal::SIGTERM);
        }
        send_group(root, Signal::SIGTERM);
    }

    pub(super) fn force_kill(root: u32, descendants: &[u32], root_alive: bool) {
        for pid in descendants {
            if is_alive(*pid) {
                send(*pid, Signal::SIGKILL);
            }
        }
        if root_alive {
            send_group(root, Signal::SIGKILL);
        }
    }

    pub(super) fn group_members(pgid: u32) -> Vec<u32> {
        super::proc_scan::group_members(pgid)
    }

    pub(super) fn kill_group(root: u32) {
        send_group(root, Signal::SIGKILL);
    }

    fn to_pid(pid: u32) -> Option<Pid> {
        i32::try_from(pid)
            .ok()
            .filter(|raw| *raw > 0)
            .map(Pid::from_raw)
    }

    fn send(pid: u32, signal: Signal) {
        if let Some(pid) = to_pid(pid) {
            let _ = kill(pid, signal);
        }
    }

    fn send_group(root: u32, signal: Signal) {
        if let Some(pgid) = to_pid(root) {
            match killpg(pgid, signal) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(errno) => tracing::debug!(
                    target: super::SUPERVISOR_TARGET,
                    pgid = root,
                    error = %errno,
                    "failed to signal API server process group"
                ),
            }
        }
    }

    fn is_alive(pid: u32) -> bool {
        to_pid(pid).is_some_and(|pid| matches!(kill(pid, None), Ok(()) | Err(Errno::EPERM)))
    }
}

#[cfg(windows)]
mod platform {
    use std::process::{Command, Stdio};

    pub(super) fn descendants(_root: u32) -> Vec<u32> {
        Vec::new()
    }

    pub(super) fn request_exit(root: u32, _descendants: &[u32]) {
        taskkill(root, false);
    }

    pub(super) fn force_kill(root: u32, _descendants: &[u32], root_alive: bool) {
        if root_alive {
            taskkill(root, true);
        }
    }

    pub(super) fn group_members(_pgid: u32) -> Vec<u32> {
        Vec::new()
    }

    pub(super) fn kill_group(_root: u32) {}

    fn taskkill(pid: u32, force: bool) {
        let pid = pid.to_string();
        let mut command = Command::new("taskkill");
        command.args(["/PID", pid.as_str(), "/T"]);
        if force {
            command.arg("/F");
        }
        let _ = command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

#[cfg(all(unix, target_os = "linux"))]
mod proc_scan {
    use std::collections::{HashMap, VecDeque};
    use std::fs;

    /// Every transitive child of `root`, deepest generation first.
    pub(super) fn descendants(root: u32) -> Vec<u32> {
        let parents = parent_table();
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for (pid, ppid) in parents {
            children.entry(ppid).or_default().push(pid);
        }
        let mut order = Vec::new();
        let mut queue = VecDeque::from([root]);
        while let Some(pid) = queue.pop_front() {
            if let Some(kids) = children.get(&pid) {
                for kid in kids {
                    order.push(*kid);
                    queue.push_back(*kid);
                }
            }
        }
        order.reverse();
        order
    }

    /// Live processes in group `pgid`, excluding the leader itself.
    pub(super) fn group_members(pgid: u32) -> Vec<u32> {
        process_table()
            .into_iter()
            .filter(|entry| entry.pgrp == pgid && entry.pid != pgid && !entry.zombie)
            .map(|entry| entry.pid)
            .collect()
    }

    fn parent_table() -> Vec<(u32, u32)> {
        process_table()
            .into_iter()
            .map(|entry| (entry.pid, entry.ppid))
            .collect()
    }

    pub(super) struct StatEntry {
        pub(super) pid: u32,
        pub(super) ppid: u32,
        pub(super) pgrp: u32,
        pub(super) zombie: bool,
    }

    fn process_table() -> Vec<StatEntry> {
        let Ok(entries) = fs::read_dir("/proc") else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
            .filter_map(|pid| {
                let stat = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
                parse_stat(pid, &stat)
            })
            .collect()
    }

    /// Parses a `/proc/<pid>/stat` line. The command name is parenthesised
    /// and may itself contain spaces or parentheses.
    pub(super) fn parse_stat(pid: u32, stat: &str) -> Option<StatEntry> {
        let (_, rest) = stat.rsplit_once(')')?;
        let mut fields = rest.split_whitespace();
        let state = fields.next()?;
        let ppid = fields.next()?.parse().ok()?;
        let pgrp = fields.next()?.parse().ok()?;
        Some(StatEntry {
            pid,
            ppid,
            pgrp,
            zombie: state == "Z",
        })
    }
}

// Without a process table leftovers are not collected.
#[cfg(all(unix, not(target_os = "linux")))]
mod proc_scan {
    pub(super) fn descendants(_root: u32) -> Vec<u32> {
        Vec::new()
    }

    pub(super) fn group_members(_pgid: u32) -> Vec<u32> {
        Vec::new()
    }
}
