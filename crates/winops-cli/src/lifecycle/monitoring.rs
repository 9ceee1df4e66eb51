//! Reads the runtime files a console-hosted agent keeps in the install
//! directory.

use std::io;
use std::path::Path;

use cap_std::ambient_authority;
use cap_std::fs::Dir;

use winops_agent::StatusSnapshot;
use winops_config::InstallPaths;

use super::error::LifecycleError;

/// Opens the install directory with capability-scoped access.
pub(super) fn open_install_dir(paths: &InstallPaths) -> Result<Dir, LifecycleError> {
    Dir::open_ambient_dir(paths.install_dir(), ambient_authority()).map_err(|source| {
        LifecycleError::OpenInstallDir {
            path: paths.install_dir().to_path_buf(),
            source,
        }
    })
}

fn read_optional_file(dir: &Dir, filename: &str) -> Result<Option<String>, io::Error> {
    match dir.read_to_string(filename) {
        Ok(content) => Ok(Some(content)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error),
    }
}

/// Reads an optional runtime file and parses it, mapping both failure kinds
/// to lifecycle errors.
fn read_and_parse<T, R, P>(
    dir: &Dir,
    filename: &str,
    read_error: R,
    parse: P,
) -> Result<Option<T>, LifecycleError>
where
    R: FnOnce(io::Error) -> LifecycleError,
    P: FnOnce(&str) -> Result<Option<T>, LifecycleError>,
{
    let Some(content) = read_optional_file(dir, filename).map_err(read_error)? else {
        return Ok(None);
    };
    parse(&content)
}

/// Status snapshot of the console host, if one is running.
pub(super) fn read_status(
    dir: &Dir,
    full_path: &Path,
) -> Result<Option<StatusSnapshot>, LifecycleError> {
    let path = full_path.to_path_buf();
    let parse_path = path.clone();
    read_and_parse(
        dir,
        InstallPaths::status_file_name(),
        |source| LifecycleError::ReadStatus { path, source },
        |content| {
            serde_json::from_str(content)
                .map(Some)
                .map_err(|source| LifecycleError::ParseStatus {
                    path: parse_path,
                    source,
                })
        },
    )
}

/// PID recorded by the console host. An empty file counts as absent.
pub(super) fn read_pid(dir: &Dir, full_path: &Path) -> Result<Option<u32>, LifecycleError> {
    let path = full_path.to_path_buf();
    let parse_path = path.clone();
    read_and_parse(
        dir,
        InstallPaths::pid_file_name(),
        |source| LifecycleError::ReadPid { path, source },
        |content| {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<u32>()
                .map(Some)
                .map_err(|source| LifecycleError::ParsePid {
                    path: parse_path,
                    source,
                })
        },
    )
}
