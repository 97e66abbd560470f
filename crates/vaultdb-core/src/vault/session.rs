//! Scoped lifecycle of the plaintext working file.
//!
//! A [`VaultSession`] is a guard: creating it unseals the container and opens
//! SQLite on the plaintext; closing or dropping it closes the connection and
//! seals the file again. Drop covers early returns, `?` and panics, so the
//! plaintext never outlives the session.

use rusqlite::Connection;
use tracing::{debug, error, warn};

use crate::crypto::{derive_key, load_or_create_salt, validate_password, FieldCipher};
use crate::error::{Result, VaultError};
use crate::storage::Repository;
use crate::vault::config::VaultConfig;
use crate::vault::container::ContainerVault;
use crate::vault::VaultState;

/// An open store. See the module docs for the guarantees.
pub struct VaultSession<'v> {
    config: &'v VaultConfig,
    container: ContainerVault,
    cipher: FieldCipher,
    conn: Option<Connection>,
    state: VaultState,
    sealed: bool,
}

impl<'v> VaultSession<'v> {
    /// Unseal the store and open a connection on the plaintext.
    ///
    /// Nothing is unsealed unless key material is present and the container
    /// verifies. Once the plaintext exists, any later failure in this
    /// function seals it again through `Drop`.
    ///
    /// # Errors
    ///
    /// - `VaultError::KeyMaterialMissing` if the password is empty or the
    ///   container exists without its salt
    /// - `VaultError::AuthenticationFailure` for a wrong password or tampered container
    /// - `VaultError::Sqlite` if the database cannot be opened or migrated
    pub(crate) fn open(config: &'v VaultConfig) -> Result<Self> {
        validate_password(config.password())?;

        let container_path = config.container_path();
        let salt_path = config.salt_path();
        if container_path.exists() && !salt_path.exists() {
            return Err(VaultError::KeyMaterialMissing(format!(
                "Salt file {} is missing; the container cannot be decrypted",
                salt_path.display()
            )));
        }

        let salt = load_or_create_salt(&salt_path)?;
        let key = derive_key(config.password(), &salt, config.iterations())?;
        let container = ContainerVault::new(key.clone(), *config.cleanup_policy());

        container.decrypt_container(&container_path, config.db_path())?;

        let mut session = Self {
            config,
            container,
            cipher: FieldCipher::new(key),
            conn: None,
            state: VaultState::Transitioning,
            sealed: false,
        };

        let conn = Connection::open(config.db_path())?;
        session.conn = Some(conn);
        crate::fs::set_owner_only(config.db_path())?;
        session.state = VaultState::PlaintextOpen;

        session.repository()?.ensure_schema()?;
        debug!(path = %config.db_path().display(), "session open");
        Ok(session)
    }

    /// Repository bound to this session's connection and field key.
    pub fn repository(&self) -> Result<Repository<'_>> {
        Ok(Repository::new(self.connection()?, &self.cipher))
    }

    /// Raw connection, for statements the repository does not cover.
    pub fn connection(&self) -> Result<&Connection> {
        self.conn
            .as_ref()
            .ok_or_else(|| VaultError::Storage("Session is closed".to_string()))
    }

    pub fn state(&self) -> VaultState {
        self.state
    }

    /// Close the connection and seal the store, reporting the outcome.
    ///
    /// Returns the on-disk state afterwards: `AtRestOnly` normally, or
    /// `PlaintextOpen` when the plaintext stayed locked and was left for the
    /// next session to overwrite.
    pub fn close(mut self) -> Result<VaultState> {
        self.seal()
    }

    fn seal(&mut self) -> Result<VaultState> {
        if self.sealed {
            return Ok(self.state);
        }
        self.sealed = true;
        self.state = VaultState::Transitioning;

        if let Some(conn) = self.conn.take() {
            if let Err((conn, err)) = conn.close() {
                warn!("closing SQLite connection failed: {}", err);
                drop(conn);
            }
        }

        let result = self
            .container
            .encrypt_container(self.config.db_path(), &self.config.container_path());
        self.state = VaultState::detect(self.config);
        result.map(|_| self.state)
    }
}

impl Drop for VaultSession<'_> {
    fn drop(&mut self) {
        if self.sealed {
            return;
        }
        if let Err(err) = self.seal() {
            error!(
                path = %self.config.db_path().display(),
                "failed to seal store on drop: {}", err
            );
        }
    }
}
