//! Resolution and spawning of the API server entry point.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use winops_config::{API_KEY_ENV_VAR, Config, InstallPaths};

use crate::credentials::CredentialStore;

use super::child::ServerProcess;
use super::errors::LaunchError;

/// Starts API server processes for the supervisor.
pub trait ChildLauncher: Send + Sync + 'static {
    /// Spawns one API server process.
    fn launch(&self) -> Result<ServerProcess, LaunchError>;
}

/// How the API server is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryPoint {
    /// An explicitly configured executable.
    Command { program: PathBuf },
    /// A script found in the install directory, run by the interpreter.
    Script { interpreter: String, script: PathBuf },
    /// A module run by the interpreter with `-m`.
    Module { interpreter: String, module: String },
}

impl EntryPoint {
    /// Picks the entry point: explicit command, then co-located script, then
    /// module.
    pub fn resolve(config: &Config, paths: &InstallPaths) -> Result<Self, LaunchError> {
        if let Some(command) = config.server_command() {
            let program = command.as_std_path().to_path_buf();
            if !program.is_file() {
                return Err(LaunchError::MissingCommand { path: program });
            }
            return Ok(Self::Command { program });
        }
        let script = paths.install_dir().join(config.server_script());
        if script.is_file() {
            return Ok(Self::Script {
                interpreter: config.server_interpreter().to_owned(),
                script,
            });
        }
        Ok(Self::Module {
            interpreter: config.server_interpreter().to_owned(),
            module: config.server_module().to_owned(),
        })
    }

    fn program(&self) -> OsString {
        match self {
            Self::Command { program } => program.clone().into_os_string(),
            Self::Script { interpreter, .. } | Self::Module { interpreter, .. } => {
                OsString::from(interpreter)
            }
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(self.program());
        match self {
            Self::Command { .. } => {}
            Self::Script { script, .. } => {
                command.arg(script);
            }
            Self::Module { module, .. } => {
                command.args(["-m", module.as_str()]);
            }
        }
        command
    }
}

/// Production launcher: resolves the entry point and injects the API key.
///
/// Both are re-evaluated on every launch, so a rotated key reaches the API
/// server on its next (re)start.
#[derive(Debug, Clone)]
pub struct ServerLauncher {
    config: Config,
    paths: InstallPaths,
    credentials: CredentialStore,
}

impl ServerLauncher {
    #[must_use]
    pub fn new(config: Config, paths: InstallPaths) -> Self {
        let credentials = CredentialStore::for_install(&paths);
        Self {
            config,
            paths,
            credentials,
        }
    }

    /// The entry point the next launch would use.
    pub fn entry_point(&self) -> Result<EntryPoint, LaunchError> {
        EntryPoint::resolve(&self.config, &self.paths)
    }
}

impl ChildLauncher for ServerLauncher {
    fn launch(&self) -> Result<ServerProcess, LaunchError> {
        let key = self.credentials.get_or_create_key()?;
        let entry = self.entry_point()?;
        let mut command = entry.command();
        command
            .current_dir(self.paths.install_dir())
            .env(API_KEY_ENV_VAR, key.as_str())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let child = command.spawn().map_err(|source| LaunchError::Spawn {
            program: entry.program(),
            source,
        })?;
        ServerProcess::capture(child, self.config.output_tail_lines())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    #[fixture]
    fn install() -> (TempDir, Config, InstallPaths) {
        let dir = TempDir::new().expect("temp dir");
        let config = Config {
            install_dir: Some(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8")),
            ..Config::default()
        };
        let paths = InstallPaths::from_config(&config).expect("paths");
        (dir, config, paths)
    }

    #[rstest]
    fn prefers_the_co_located_script(install: (TempDir, Config, InstallPaths)) {
        let (_dir, config, paths) = install;
        fs::write(paths.install_dir().join("server.py"), "").expect("write script");
        let entry = EntryPoint::resolve(&config, &paths).expect("resolve");
        assert_eq!(
            entry,
            EntryPoint::Script {
                interpreter: "python".to_owned(),
                script: paths.install_dir().join("server.py"),
            }
        );
    }

    #[rstest]
    fn falls_back_to_the_module(install: (TempDir, Config, InstallPaths)) {
        let (_dir, config, paths) = install;
        let entry = EntryPoint::resolve(&config, &paths).expect("resolve");
        assert_eq!(
            entry,
            EntryPoint::Module {
                interpreter: "python".to_owned(),
                module: "api_server.server".to_owned(),
            }
        );
    }

    #[rstest]
    fn missing_explicit_command_is_a_launch_error(install: (TempDir, Config, InstallPaths)) {
        let (dir, config, paths) = install;
        let config = Config {
            server_command: Some(
                Utf8PathBuf::from_path_buf(dir.path().join("absent")).expect("utf8"),
            ),
            ..config
        };
        let error = EntryPoint::resolve(&config, &paths).expect_err("missing command");
        assert!(matches!(error, LaunchError::MissingCommand { .. }));
    }

    #[rstest]
    fn unknown_interpreter_fails_to_spawn(install: (TempDir, Config, InstallPaths)) {
        let (_dir, config, paths) = install;
        let config = Config {
            server_interpreter: "/nonexistent/winops-interpreter".to_owned(),
            ..config
        };
        let launcher = ServerLauncher::new(config, paths);
        let error = launcher.launch().expect_err("spawn should fail");
        assert!(matches!(error, LaunchError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[rstest]
    fn injects_the_stored_key(install: (TempDir, Config, InstallPaths)) {
        use std::time::{Duration, Instant};

        let (_dir, config, paths) = install;
        fs::write(
            paths.install_dir().join("server.sh"),
            "printf '%s' \"$WINOPSTOOL_API_KEY\" > seen_key.txt\n",
        )
        .expect("write script");
        let config = Config {
            server_interpreter: "/bin/sh".to_owned(),
            server_script: "server.sh".to_owned(),
            ..config
        };
        let launcher = ServerLauncher::new(config, paths.clone());
        let mut process = launcher.launch().expect("launch");
        let deadline = Instant::now() + Duration::from_secs(5);
        while process.try_wait().expect("poll").is_none() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        let seen = fs::read_to_string(paths.install_dir().join("seen_key.txt")).expect("seen");
        let stored = CredentialStore::for_install(&paths)
            .read_key()
            .expect("read")
            .expect("key created on launch");
        assert_eq!(seen, stored.as_str());
    }
}
