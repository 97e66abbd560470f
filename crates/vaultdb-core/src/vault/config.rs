//! Vault configuration.
//!
//! The password is an explicit value handed to the vault; nothing in the
//! crate falls back to a built-in default.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};

use crate::crypto::PBKDF2_ITERATIONS;
use crate::fs::CleanupPolicy;

/// Extension of the encrypted container next to the database path.
pub const CONTAINER_EXTENSION: &str = "enc";

/// Extension of the salt file next to the database path.
pub const SALT_EXTENSION: &str = "salt";

/// Everything needed to open a store.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    db_path: PathBuf,
    password: SecretString,
    kdf_iterations: u32,
    cleanup: CleanupPolicy,
}

impl VaultConfig {
    /// Configure a store whose plaintext working file lives at `db_path`.
    ///
    /// The container and salt are kept beside it as `<db_path>.enc` and
    /// `<db_path>.salt`.
    pub fn new(db_path: impl Into<PathBuf>, password: SecretString) -> Self {
        Self {
            db_path: db_path.into(),
            password,
            kdf_iterations: PBKDF2_ITERATIONS,
            cleanup: CleanupPolicy::default(),
        }
    }

    /// Override the PBKDF2 iteration count. Must match the count the store was created with.
    pub fn kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    /// Override the retry policy for removing the plaintext file.
    pub fn cleanup(mut self, policy: CleanupPolicy) -> Self {
        self.cleanup = policy;
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn container_path(&self) -> PathBuf {
        with_suffix(&self.db_path, CONTAINER_EXTENSION)
    }

    pub fn salt_path(&self) -> PathBuf {
        with_suffix(&self.db_path, SALT_EXTENSION)
    }

    pub fn iterations(&self) -> u32 {
        self.kdf_iterations
    }

    pub fn cleanup_policy(&self) -> &CleanupPolicy {
        &self.cleanup
    }

    pub(crate) fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Append `.suffix` to the full file name (`data.db` -> `data.db.enc`).
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
