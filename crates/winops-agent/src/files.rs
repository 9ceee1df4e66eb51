use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::Builder;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Replaces the file at `path` with `contents` in a single rename.
///
/// The payload is fsync'd in a sibling temporary file before it is persisted
/// over the target, so readers see either the previous or the new contents
/// and never a mix. Missing parent directories are created. On Unix the file
/// is readable by its owner only.
pub(crate) fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let directory = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::NotFound,
            "target path did not have a parent directory",
        )
    })?;
    fs::create_dir_all(directory)?;

    let mut builder = Builder::new();
    builder.prefix(
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("winops"),
    );
    #[cfg(unix)]
    {
        builder.permissions(fs::Permissions::from_mode(0o600));
    }

    let mut file = builder.tempfile_in(directory)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|error| error.error)?;
    Ok(())
}

/// Removes `path`, treating an already missing file as success.
pub(crate) fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn creates_missing_parents_and_replaces_content() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("a").join("b").join("value.txt");
        atomic_write(&path, b"first").expect("first write");
        atomic_write(&path, b"second").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "second");
        let leftovers = fs::read_dir(path.parent().expect("parent"))
            .expect("list")
            .count();
        assert_eq!(leftovers, 1, "temporary files must not linger");
    }

    #[cfg(unix)]
    #[test]
    fn restricts_permissions_to_owner() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("secret");
        atomic_write(&path, b"x").expect("write");
        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn removing_missing_file_succeeds() {
        let dir = TempDir::new().expect("temp dir");
        remove_if_present(&dir.path().join("absent")).expect("missing file is fine");
    }
}
