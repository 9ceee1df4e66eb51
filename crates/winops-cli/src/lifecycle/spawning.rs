//! Resolution of the agent binary registered with the service manager.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use winops_agent::RUN_FLAG;
use winops_config::{InstallPaths, SERVICE_IDENTITY};

use super::error::LifecycleError;
use crate::service_manager::ServiceDefinition;

/// Environment variable overriding the agent binary location.
pub const AGENT_BIN_ENV: &str = "WINOPS_AGENT_BIN";

const AGENT_BINARY_NAME: &str = "winops-agentd";

/// Locates `winops-agentd`: the override when given, otherwise the binary
/// installed next to the running CLI.
pub(super) fn resolve_agent_binary(
    binary_override: Option<&Path>,
) -> Result<PathBuf, LifecycleError> {
    let candidate = match binary_override {
        Some(path) => path.to_path_buf(),
        None => sibling_binary()?,
    };
    let binary = std::path::absolute(&candidate)
        .map_err(|source| LifecycleError::AgentBinary { source })?;
    if binary.is_file() {
        Ok(binary)
    } else {
        Err(LifecycleError::MissingAgentBinary { path: binary })
    }
}

fn sibling_binary() -> Result<PathBuf, LifecycleError> {
    let executable = env::current_exe().map_err(|source| LifecycleError::AgentBinary { source })?;
    let directory = executable.parent().unwrap_or_else(|| Path::new("."));
    Ok(directory.join(format!("{AGENT_BINARY_NAME}{}", env::consts::EXE_SUFFIX)))
}

/// Service registration running `binary` for the given install directory.
pub(super) fn service_definition(
    binary: PathBuf,
    paths: &InstallPaths,
) -> Result<ServiceDefinition, LifecycleError> {
    let install_dir = std::path::absolute(paths.install_dir())
        .map_err(|source| LifecycleError::AgentBinary { source })?;
    Ok(ServiceDefinition {
        identity: SERVICE_IDENTITY,
        executable: binary,
        arguments: vec![
            OsString::from(RUN_FLAG),
            OsString::from("--install-dir"),
            install_dir.clone().into_os_string(),
        ],
        working_directory: install_dir,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    #[rstest]
    fn override_must_exist() {
        let temp = TempDir::new().expect("temp dir");
        let missing = temp.path().join("winops-agentd");
        let error = resolve_agent_binary(Some(&missing)).expect_err("missing binary");
        let LifecycleError::MissingAgentBinary { path } = error else {
            panic!("expected MissingAgentBinary, got {error:?}");
        };
        assert_eq!(path, missing);
    }

    #[rstest]
    fn existing_override_is_used() {
        let temp = TempDir::new().expect("temp dir");
        let binary = temp.path().join("agent");
        fs::write(&binary, b"").expect("write binary");
        assert_eq!(resolve_agent_binary(Some(&binary)).expect("resolve"), binary);
    }

    #[rstest]
    fn definition_runs_the_agent_against_the_install_dir() {
        let temp = TempDir::new().expect("temp dir");
        let paths = InstallPaths::in_directory(temp.path());
        let definition =
            service_definition(PathBuf::from("/opt/winops/winops-agentd"), &paths).expect("definition");
        assert_eq!(definition.identity, SERVICE_IDENTITY);
        assert_eq!(
            definition.arguments,
            [
                OsString::from("--run"),
                OsString::from("--install-dir"),
                temp.path().as_os_str().to_owned(),
            ]
        );
        assert_eq!(definition.working_directory, temp.path());
    }
}
