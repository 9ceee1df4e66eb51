//! Persistent storage for the API key shared with the API server.
//!
//! Exactly one key exists per installation. It lives in a plain text file in
//! the install directory and is re-read on every call, so a key rotated by
//! one process is visible to the next reader without coordination.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::RngCore;
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::info;

use winops_config::InstallPaths;

use crate::files::atomic_write;

const CREDENTIALS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::credentials");

/// Number of random bytes behind every key.
pub const API_KEY_BYTES: usize = 32;

/// Opaque bearer token handed to the API server.
///
/// `Debug` never prints the secret, so keys can travel through structured
/// logging fields without leaking.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Draws a fresh key from the operating system's CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; API_KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// The key as written to disk and exported to the API server.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn parse(content: &str) -> Option<Self> {
        let trimmed = content.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_owned()))
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("ApiKey(<redacted>)")
    }
}

/// Errors raised while reading or writing the key file.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read API key file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write API key file '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// File-backed key store.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store backed by the given key file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store backed by the install directory's key file.
    #[must_use]
    pub fn for_install(paths: &InstallPaths) -> Self {
        Self::new(paths.api_key_path())
    }

    /// Location of the key file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Returns the stored key, creating and persisting one when none exists.
    ///
    /// A file that holds only whitespace counts as missing.
    pub fn get_or_create_key(&self) -> Result<ApiKey, StorageError> {
        if let Some(key) = self.read_key()? {
            return Ok(key);
        }
        let key = ApiKey::generate();
        self.persist(&key)?;
        info!(
            target: CREDENTIALS_TARGET,
            file = %self.path.display(),
            "generated new API key"
        );
        Ok(key)
    }

    /// Replaces the stored key unconditionally.
    ///
    /// The previous key stops being valid the moment the new file is in
    /// place. A running API server keeps the key it was started with until it
    /// is relaunched.
    pub fn regenerate_key(&self) -> Result<ApiKey, StorageError> {
        let key = ApiKey::generate();
        self.persist(&key)?;
        info!(
            target: CREDENTIALS_TARGET,
            file = %self.path.display(),
            "rotated API key"
        );
        Ok(key)
    }

    /// Reads the stored key without creating one.
    pub fn read_key(&self) -> Result<Option<ApiKey>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(ApiKey::parse(&content)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn persist(&self, key: &ApiKey) -> Result<(), StorageError> {
        atomic_write(&self.path, key.as_str().as_bytes()).map_err(|source| StorageError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    #[fixture]
    fn store() -> (TempDir, CredentialStore) {
        let dir = TempDir::new().expect("temp dir");
        let store = CredentialStore::new(dir.path().join("install").join("api_key.txt"));
        (dir, store)
    }

    #[rstest]
    fn repeated_reads_return_the_same_key(store: (TempDir, CredentialStore)) {
        let (_dir, store) = store;
        let first = store.get_or_create_key().expect("create key");
        let second = store.get_or_create_key().expect("read key");
        assert_eq!(first, second);
    }

    #[rstest]
    fn keys_are_long_hex_strings(store: (TempDir, CredentialStore)) {
        let (_dir, store) = store;
        let key = store.get_or_create_key().expect("create key");
        assert_eq!(key.as_str().len(), API_KEY_BYTES * 2);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[rstest]
    fn regeneration_replaces_the_file(store: (TempDir, CredentialStore)) {
        let (_dir, store) = store;
        let original = store.get_or_create_key().expect("create key");
        let rotated = store.regenerate_key().expect("rotate key");
        assert_ne!(original, rotated);
        assert_eq!(store.get_or_create_key().expect("read key"), rotated);
        let on_disk = fs::read_to_string(store.path()).expect("read file");
        assert_eq!(on_disk, rotated.as_str());
    }

    #[rstest]
    fn blank_file_is_replaced(store: (TempDir, CredentialStore)) {
        let (_dir, store) = store;
        fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
        fs::write(store.path(), "  \n").expect("seed blank file");
        let key = store.get_or_create_key().expect("create key");
        assert!(!key.as_str().is_empty());
        assert_eq!(store.read_key().expect("read"), Some(key));
    }

    #[rstest]
    fn stored_whitespace_is_trimmed(store: (TempDir, CredentialStore)) {
        let (_dir, store) = store;
        fs::create_dir_all(store.path().parent().expect("parent")).expect("mkdir");
        fs::write(store.path(), "abc123\r\n").expect("seed key");
        let key = store.get_or_create_key().expect("read key");
        assert_eq!(key.as_str(), "abc123");
    }

    #[rstest]
    fn read_key_does_not_create(store: (TempDir, CredentialStore)) {
        let (_dir, store) = store;
        assert_eq!(store.read_key().expect("read"), None);
        assert!(!store.path().exists());
    }

    #[rstest]
    fn debug_output_is_redacted() {
        let key = ApiKey::generate();
        let rendered = format!("{key:?}");
        assert!(!rendered.contains(key.as_str()));
    }

    #[cfg(unix)]
    #[rstest]
    fn unreadable_path_reports_storage_error(store: (TempDir, CredentialStore)) {
        let (_dir, store) = store;
        fs::create_dir_all(store.path()).expect("directory in place of key file");
        let error = store.get_or_create_key().expect_err("directory cannot be read");
        assert!(matches!(error, StorageError::Read { .. }));
    }
}
