//! Encrypted-at-rest store lifecycle.
//!
//! - [`container`]: the JSON container holding the sealed database file
//! - [`session`]: the guard that owns the plaintext working file
//! - [`config`]: paths, password and tuning for one store
//!
//! Not safe for concurrent use by several processes: callers that need that
//! must serialize sessions themselves (for example with an advisory lock).

pub mod config;
pub mod container;
pub mod session;

use serde::Serialize;
use tracing::error;

pub use crate::fs::CleanupPolicy;
pub use config::VaultConfig;
pub use container::ContainerVault;
pub use session::VaultSession;

use crate::error::Result;
use crate::storage::Repository;

/// Where the store is in its seal/unseal cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultState {
    /// Nothing on disk yet.
    Empty,
    /// Only the container exists.
    AtRestOnly,
    /// A plaintext working file exists (open session, or leftovers).
    PlaintextOpen,
    /// A decrypt or encrypt is underway.
    Transitioning,
}

impl VaultState {
    /// Inspect the files of a store. Never returns `Transitioning`.
    pub fn detect(config: &VaultConfig) -> Self {
        if config.db_path().exists() {
            VaultState::PlaintextOpen
        } else if config.container_path().exists() {
            VaultState::AtRestOnly
        } else {
            VaultState::Empty
        }
    }
}

impl std::fmt::Display for VaultState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            VaultState::Empty => "empty",
            VaultState::AtRestOnly => "at rest",
            VaultState::PlaintextOpen => "plaintext open",
            VaultState::Transitioning => "transitioning",
        };
        f.write_str(label)
    }
}

/// A configured store. Cheap to hold; all work happens in sessions.
#[derive(Debug, Clone)]
pub struct Vault {
    config: VaultConfig,
}

impl Vault {
    pub fn new(config: VaultConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Current on-disk state.
    pub fn state(&self) -> VaultState {
        VaultState::detect(&self.config)
    }

    /// Unseal the store. The returned guard seals it again on close or drop.
    pub fn open(&self) -> Result<VaultSession<'_>> {
        VaultSession::open(&self.config)
    }

    /// Run `f` inside a session, sealing the store whatever `f` returns.
    ///
    /// An error from `f` takes precedence over an error while sealing; the
    /// latter is logged in that case. Plaintext left behind by the seal is
    /// logged as an error; use [`Vault::state`] to check for it.
    pub fn with_session<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Repository<'_>) -> Result<T>,
    {
        let session = self.open()?;
        let outcome = session.repository().and_then(|repo| f(&repo));
        let sealed = session.close().map(|state| {
            if state == VaultState::PlaintextOpen {
                error!(
                    path = %self.config.db_path().display(),
                    "plaintext still on disk after sealing"
                );
            }
            state
        });

        match (outcome, sealed) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(_)) => Err(err),
            (Err(err), Err(seal_err)) => {
                error!("sealing after failed operation also failed: {}", seal_err);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::fs;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> VaultConfig {
        VaultConfig::new(dir.join("users.db"), SecretString::from("test-password-secure-123"))
            .kdf_iterations(1_000)
    }

    #[test]
    fn test_detect_follows_files() {
        let dir = tempdir().unwrap();
        let config = config(dir.path());
        assert_eq!(VaultState::detect(&config), VaultState::Empty);

        fs::write(config.container_path(), b"{}").unwrap();
        assert_eq!(VaultState::detect(&config), VaultState::AtRestOnly);

        fs::write(config.db_path(), b"leftover").unwrap();
        assert_eq!(VaultState::detect(&config), VaultState::PlaintextOpen);
    }

    #[test]
    fn test_with_session_leaves_store_at_rest() {
        let dir = tempdir().unwrap();
        let vault = Vault::new(config(dir.path()));

        let names = vault.with_session(|repo| repo.list_names()).unwrap();
        assert!(names.is_empty());
        assert_eq!(vault.state(), VaultState::AtRestOnly);
    }
}
