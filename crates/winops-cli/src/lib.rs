//! Command-line runtime for the `winops` service controller.
//!
//! The runtime parses the action flags, loads the layered configuration,
//! initialises telemetry, and runs the requested lifecycle actions in their
//! fixed order, stopping at the first failure. IO streams, the configuration
//! loader, and the action handler can all be substituted by tests.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};

use winops_agent::LogSink;
use winops_agent::telemetry;
use winops_config::InstallPaths;

mod cli;
mod config;
mod errors;
pub mod lifecycle;
pub mod service_manager;

#[cfg(test)]
mod tests;

use cli::Cli;
use config::config_arguments;
pub(crate) use config::{ConfigLoader, OrthoConfigLoader};
pub(crate) use errors::AppError;
use lifecycle::{
    LifecycleAction, LifecycleContext, LifecycleError, LifecycleOutput, SystemLifecycle,
};

/// Bundles the IO streams provided to the CLI runtime.
pub(crate) struct IoStreams<'a, W: Write, E: Write> {
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
}

impl<'a, W: Write, E: Write> IoStreams<'a, W, E> {
    pub(crate) fn new(stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self { stdout, stderr }
    }
}

struct CliRunner<'a, W: Write, E: Write, L: ConfigLoader> {
    io: &'a mut IoStreams<'a, W, E>,
    loader: &'a L,
}

impl<'a, W, E, L> CliRunner<'a, W, E, L>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    fn new(io: &'a mut IoStreams<'a, W, E>, loader: &'a L) -> Self {
        Self { io, loader }
    }

    fn run<I>(&mut self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
    {
        let mut lifecycle = SystemLifecycle::system();
        self.run_with_handler(args, |action, context, output| {
            lifecycle.handle(action, context, output)
        })
    }

    fn run_with_handler<I, F>(&mut self, args: I, mut handler: F) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
        F: FnMut(
            LifecycleAction,
            LifecycleContext<'_>,
            &mut LifecycleOutput<&mut W, &mut E>,
        ) -> Result<(), LifecycleError>,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        let cli = match Cli::try_parse_from(&args) {
            Ok(cli) => cli,
            Err(error) if !error.use_stderr() => {
                // --help and --version
                let _ = write!(self.io.stdout, "{}", error.render());
                return ExitCode::SUCCESS;
            }
            Err(error) => {
                let _ = write!(self.io.stderr, "{}", AppError::CliUsage(error));
                return ExitCode::FAILURE;
            }
        };

        if cli.is_bare_invocation() {
            return match write_usage(&mut *self.io.stdout) {
                Ok(()) => ExitCode::SUCCESS,
                Err(_) => ExitCode::FAILURE,
            };
        }

        match self.execute(&args, &cli, &mut handler) {
            Ok(()) => ExitCode::SUCCESS,
            Err(error) => {
                let _ = writeln!(self.io.stderr, "{error}");
                ExitCode::FAILURE
            }
        }
    }

    fn execute<F>(&mut self, args: &[OsString], cli: &Cli, handler: &mut F) -> Result<(), AppError>
    where
        F: FnMut(
            LifecycleAction,
            LifecycleContext<'_>,
            &mut LifecycleOutput<&mut W, &mut E>,
        ) -> Result<(), LifecycleError>,
    {
        let config = self.loader.load(&config_arguments(args))?;
        telemetry::initialise(&config, &LogSink::Stderr)?;
        let paths = InstallPaths::from_config(&config)?;
        let context = LifecycleContext {
            config: &config,
            paths: &paths,
        };
        for action in cli.actions() {
            let mut output = LifecycleOutput::new(&mut *self.io.stdout, &mut *self.io.stderr);
            handler(action, context, &mut output)?;
        }
        Ok(())
    }
}

fn write_usage<W: Write>(stdout: &mut W) -> std::io::Result<()> {
    let help = Cli::command().render_help();
    write!(stdout, "{help}")?;
    stdout.flush()
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdout, stderr);
    run_with_loader(args, &mut io, &OrthoConfigLoader)
}

/// Runs the CLI with a custom configuration loader.
#[must_use]
pub(crate) fn run_with_loader<'a, I, W, E, L>(
    args: I,
    io: &'a mut IoStreams<'a, W, E>,
    loader: &'a L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    CliRunner::new(io, loader).run(args)
}

/// Runs the CLI with a custom configuration loader and action handler.
#[cfg(test)]
pub(crate) fn run_with_handler<'a, I, W, E, L, F>(
    args: I,
    io: &'a mut IoStreams<'a, W, E>,
    loader: &'a L,
    handler: F,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
    F: FnMut(
        LifecycleAction,
        LifecycleContext<'_>,
        &mut LifecycleOutput<&mut W, &mut E>,
    ) -> Result<(), LifecycleError>,
{
    CliRunner::new(io, loader).run_with_handler(args, handler)
}
