//! Handle to one running API server process and its captured output.

use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, ExitStatus};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use super::errors::LaunchError;
use super::process_tree;

/// Which pipe a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One captured line of API server output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Ring buffer holding the most recent output lines of both pipes.
#[derive(Debug, Clone)]
pub struct OutputTail {
    lines: Arc<Mutex<VecDeque<OutputLine>>>,
    capacity: usize,
}

impl OutputTail {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    pub fn push(&self, stream: OutputStream, text: String) {
        if self.capacity == 0 {
            return;
        }
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(OutputLine { stream, text });
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<OutputLine> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// A running API server owned by the supervisor.
///
/// Only the supervisor holds this handle, so only it can signal or reap the
/// process.
#[derive(Debug)]
pub struct ServerProcess {
    child: Child,
    pid: u32,
    started: Instant,
    started_at: u64,
    output: OutputTail,
}

impl ServerProcess {
    /// Wraps a freshly spawned child and starts draining its pipes.
    pub(crate) fn capture(mut child: Child, tail_lines: usize) -> Result<Self, LaunchError> {
        let output = OutputTail::with_capacity(tail_lines);
        if let Some(stdout) = child.stdout.take() {
            spawn_reader("winops-stdout", stdout, OutputStream::Stdout, output.clone())
                .map_err(|source| abandon(&mut child, source))?;
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader("winops-stderr", stderr, OutputStream::Stderr, output.clone())
                .map_err(|source| abandon(&mut child, source))?;
        }
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or_default();
        Ok(Self {
            pid: child.id(),
            child,
            started: Instant::now(),
            started_at,
            output,
        })
    }

    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Start time in seconds since the Unix epoch.
    #[must_use]
    pub const fn started_at(&self) -> u64 {
        self.started_at
    }

    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    #[must_use]
    pub fn output_tail(&self) -> Vec<OutputLine> {
        self.output.snapshot()
    }

    /// Non-blocking exit check. Reaps the process when it has exited.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Kills whatever the exited server left behind in its process group.
    pub(crate) fn reap_leftovers(&self) {
        process_tree::kill_leftovers(self.pid);
    }

    /// Terminates the server and all of its descendants.
    pub(crate) fn terminate(mut self, grace: Duration) -> io::Result<ExitStatus> {
        process_tree::terminate_tree(&mut self.child, grace)
    }
}

fn abandon(child: &mut Child, source: io::Error) -> LaunchError {
    let _ = child.kill();
    let _ = child.wait();
    LaunchError::CaptureOutput { source }
}

fn spawn_reader<R>(
    name: &str,
    pipe: R,
    stream: OutputStream,
    tail: OutputTail,
) -> io::Result<()>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            let mut reader = BufReader::new(pipe);
            let mut buffer = Vec::new();
            loop {
                buffer.clear();
                match reader.read_until(b'\n', &mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&buffer);
                        tail.push(stream, text.trim_end_matches(['\r', '\n']).to_owned());
                    }
                }
            }
        })
        .map(|_| ())
}
