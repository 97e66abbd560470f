//! Key derivation using PBKDF2-HMAC-SHA256.
//!
//! The salt is generated once per store and persisted next to it. Losing the
//! salt file makes the container unrecoverable even with the right password,
//! so an existing salt is never regenerated.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use aes_gcm::aead::OsRng;
use rand::RngCore;
use sha2::Sha256;
use tracing::{debug, info};
use zeroize::ZeroizeOnDrop;

use crate::error::{Result, VaultError};

/// Default PBKDF2 iteration count for new stores.
///
/// The count is not recorded on disk; a store must always be opened with the
/// count it was created with.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Length of the persisted salt in bytes.
pub const SALT_SIZE: usize = 32;

/// Minimum salt length accepted by [`derive_key`].
const MIN_SALT_SIZE: usize = 16;

/// Length of derived key in bytes (32 bytes = 256 bits for AES-256).
const KEY_LENGTH: usize = 32;

/// A cryptographic key derived from a password.
///
/// This type ensures that key material is securely zeroized from memory
/// when dropped, reducing the window of exposure.
#[derive(Clone, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_LENGTH],
}

impl DerivedKey {
    /// Create a new DerivedKey from raw bytes.
    ///
    /// # Security
    ///
    /// The caller is responsible for ensuring the bytes come from a secure source.
    pub fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Get a reference to the raw key bytes.
    ///
    /// # Security
    ///
    /// Avoid storing or logging this value. Use only for immediate encryption operations.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive an encryption key from a password and salt.
///
/// # Security
///
/// - Same password + salt + iterations always produces the same key
/// - Different salt produces a different key (salt must be stored with the store)
///
/// # Examples
///
/// ```
/// use vaultdb_core::crypto::derive_key;
///
/// let salt = [7u8; 32];
/// let key = derive_key("my-password", &salt, 1_000).unwrap();
/// assert_eq!(key.as_bytes().len(), 32);
/// ```
pub fn derive_key(password: &str, salt: &[u8], iterations: u32) -> Result<DerivedKey> {
    if password.is_empty() {
        return Err(VaultError::KeyMaterialMissing(
            "Password cannot be empty".to_string(),
        ));
    }

    if salt.len() < MIN_SALT_SIZE {
        return Err(VaultError::InvalidInput(format!(
            "Salt must be at least {} bytes",
            MIN_SALT_SIZE
        )));
    }

    if iterations == 0 {
        return Err(VaultError::InvalidInput(
            "Iteration count must be positive".to_string(),
        ));
    }

    let mut key_bytes = [0u8; KEY_LENGTH];
    pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut key_bytes);
    debug!(iterations, "derived store key");

    Ok(DerivedKey::from_bytes(key_bytes))
}

/// Read the salt at `path`, creating it with fresh random bytes if absent.
///
/// The file is created with `create_new`, so a concurrent creator can never
/// overwrite a salt that already protects data.
///
/// # Errors
///
/// - `VaultError::Io` if the path cannot be read or written
/// - `VaultError::KeyMaterialMissing` if an existing salt file has the wrong length
pub fn load_or_create_salt(path: &Path) -> Result<[u8; SALT_SIZE]> {
    if path.exists() {
        return read_salt(path);
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => return read_salt(path),
        Err(err) => return Err(err.into()),
    };
    let written = crate::fs::set_owner_only(path)
        .and_then(|_| file.write_all(&salt))
        .and_then(|_| file.sync_all());
    if let Err(err) = written {
        // A short salt file would lock the store forever; start over next time.
        drop(file);
        let _ = fs::remove_file(path);
        return Err(err.into());
    }
    info!(path = %path.display(), "created new salt");

    Ok(salt)
}

fn read_salt(path: &Path) -> Result<[u8; SALT_SIZE]> {
    let bytes = fs::read(path)?;
    bytes.as_slice().try_into().map_err(|_| {
        VaultError::KeyMaterialMissing(format!(
            "Salt file {} must be {} bytes (got {})",
            path.display(),
            SALT_SIZE,
            bytes.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TEST_ITERATIONS: u32 = 1_000;

    #[test]
    fn test_key_derivation_deterministic() {
        let salt = [1u8; SALT_SIZE];

        let key1 = derive_key("test-password", &salt, TEST_ITERATIONS).unwrap();
        let key2 = derive_key("test-password", &salt, TEST_ITERATIONS).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_salt_different_key() {
        let key1 = derive_key("test-password", &[1u8; SALT_SIZE], TEST_ITERATIONS).unwrap();
        let key2 = derive_key("test-password", &[2u8; SALT_SIZE], TEST_ITERATIONS).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_iterations_different_key() {
        let salt = [1u8; SALT_SIZE];
        let key1 = derive_key("test-password", &salt, 1_000).unwrap();
        let key2 = derive_key("test-password", &salt, 1_001).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_empty_password_is_missing_key_material() {
        let result = derive_key("", &[1u8; SALT_SIZE], TEST_ITERATIONS);
        assert!(matches!(result, Err(VaultError::KeyMaterialMissing(_))));
    }

    #[test]
    fn test_short_salt_rejected() {
        let result = derive_key("test-password", b"short", TEST_ITERATIONS);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Salt must be at least 16 bytes"));
    }

    #[test]
    fn test_derived_key_debug_redacts() {
        let key = derive_key("test-password", &[3u8; SALT_SIZE], TEST_ITERATIONS).unwrap();

        let debug_output = format!("{:?}", key);
        assert!(debug_output.contains("REDACTED"));

        let key_hex = hex::encode(&key.as_bytes()[..4]);
        assert!(!debug_output.contains(&key_hex));
    }

    #[test]
    fn test_salt_created_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db.salt");

        let first = load_or_create_salt(&path).unwrap();
        let second = load_or_create_salt(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(fs::read(&path).unwrap(), first.to_vec());
    }

    #[test]
    fn test_salt_created_in_missing_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db.salt");

        let salt = load_or_create_salt(&path).unwrap();
        assert_eq!(fs::read(&path).unwrap().len(), SALT_SIZE);
        assert_ne!(salt, [0u8; SALT_SIZE]);
    }

    #[test]
    fn test_truncated_salt_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.db.salt");
        fs::write(&path, [0u8; 10]).unwrap();

        let result = load_or_create_salt(&path);
        assert!(matches!(result, Err(VaultError::KeyMaterialMissing(_))));
    }

    #[test]
    fn test_unwritable_salt_path_is_io_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let path = blocker.join("store.db.salt");

        let result = load_or_create_salt(&path);
        assert!(matches!(result, Err(VaultError::Io { .. })));
    }
}
