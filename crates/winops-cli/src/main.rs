//! Entry point for the `winops` service controller.
//!
//! Delegates to [`winops_cli::run`], which parses the action flags, loads
//! configuration, and drives the service lifecycle.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    winops_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
