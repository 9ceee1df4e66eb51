//! Configuration loading helpers for the `winops` CLI.
//!
//! Every argument is parsed by clap, but only the configuration flags are
//! forwarded to `ortho-config`, which would otherwise reject the action
//! flags it does not know.

use std::ffi::{OsStr, OsString};

use winops_config::{Config, OrthoConfig};

use crate::AppError;

/// CLI flags recognised by the configuration loader.
///
/// Keep in sync with the configuration flags declared on [`crate::cli::Cli`].
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--install-dir",
    "--log-filter",
    "--log-format",
];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the program name plus configuration flags.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Skip;
    }
    let (flag, has_inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (text.as_ref(), false),
    };
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Skip
    }
}

/// Extracts the program name and every configuration flag, with its value,
/// from `args`.
pub(crate) fn config_arguments(args: &[OsString]) -> Vec<OsString> {
    let mut arguments = args.iter();
    let mut selected: Vec<OsString> = arguments.next().into_iter().cloned().collect();
    while let Some(argument) = arguments.next() {
        if let FlagAction::Include { needs_value } = classify(argument) {
            selected.push(argument.clone());
            if needs_value && let Some(value) = arguments.next() {
                selected.push(value.clone());
            }
        }
    }
    selected
}
