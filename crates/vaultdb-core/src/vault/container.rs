//! Whole-file encryption of the database into a JSON container.
//!
//! Container format (`<db>.enc`):
//!
//! ```json
//! {"nonce": "<hex>", "tag": "<hex>", "ciphertext": "<hex>"}
//! ```
//!
//! The entire database file is one AEAD message. Destination files are only
//! written after encryption or decryption has completed in memory, and always
//! through a temp file and rename.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::crypto::{DerivedKey, EncryptedBlob};
use crate::error::{Result, VaultError};
use crate::fs::{remove_with_retry_using, write_atomic, CleanupPolicy};

/// Associated data binding container blobs to this use.
const CONTAINER_CONTEXT: &[u8] = b"vaultdb-container-v1";

/// On-disk JSON shape of the container.
#[derive(Debug, Serialize, Deserialize)]
pub struct ContainerFile {
    #[serde(with = "hex::serde")]
    pub nonce: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub tag: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
}

impl From<EncryptedBlob> for ContainerFile {
    fn from(blob: EncryptedBlob) -> Self {
        Self {
            nonce: blob.nonce.to_vec(),
            tag: blob.tag.to_vec(),
            ciphertext: blob.ciphertext,
        }
    }
}

impl TryFrom<ContainerFile> for EncryptedBlob {
    type Error = VaultError;

    fn try_from(file: ContainerFile) -> Result<Self> {
        EncryptedBlob::from_parts(&file.nonce, &file.tag, file.ciphertext)
    }
}

/// Read and parse a container file.
///
/// # Errors
///
/// `VaultError::MalformedInput` for invalid JSON, hex or part lengths.
pub fn read_container(path: &Path) -> Result<EncryptedBlob> {
    let contents = fs::read(path)?;
    let file: ContainerFile = serde_json::from_slice(&contents).map_err(|e| {
        VaultError::MalformedInput(format!("Container {} is unreadable: {}", path.display(), e))
    })?;
    file.try_into()
}

/// Serialize a blob and write it atomically as a container file.
pub fn write_container(path: &Path, blob: EncryptedBlob) -> Result<()> {
    let json = serde_json::to_vec(&ContainerFile::from(blob))
        .map_err(|e| VaultError::Storage(format!("Container serialization failed: {}", e)))?;
    write_atomic(path, &json)
}

/// Seals and unseals the plaintext database file.
pub struct ContainerVault {
    key: DerivedKey,
    cleanup: CleanupPolicy,
    remove: fn(&Path) -> io::Result<()>,
}

impl std::fmt::Debug for ContainerVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerVault")
            .field("key", &self.key)
            .field("cleanup", &self.cleanup)
            .finish_non_exhaustive()
    }
}

impl ContainerVault {
    pub fn new(key: DerivedKey, cleanup: CleanupPolicy) -> Self {
        Self {
            key,
            cleanup,
            remove: |path| fs::remove_file(path),
        }
    }

    /// Replace the step that deletes the plaintext after sealing.
    pub fn with_remover(mut self, remove: fn(&Path) -> io::Result<()>) -> Self {
        self.remove = remove;
        self
    }

    /// Encrypt `plain_path` into `container_path`, then remove the plaintext.
    ///
    /// A missing plaintext file is a no-op. If the plaintext stays locked
    /// after every retry it is left in place (the container is already
    /// written) and the next [`ContainerVault::decrypt_container`] overwrites it.
    pub fn encrypt_container(&self, plain_path: &Path, container_path: &Path) -> Result<()> {
        if !plain_path.exists() {
            debug!(path = %plain_path.display(), "no plaintext to seal");
            return Ok(());
        }

        let plaintext = zeroize::Zeroizing::new(fs::read(plain_path)?);
        let blob = EncryptedBlob::seal(&self.key, &plaintext, CONTAINER_CONTEXT)?;
        write_container(container_path, blob)?;
        info!(
            container = %container_path.display(),
            bytes = plaintext.len(),
            "sealed store"
        );

        match remove_with_retry_using(plain_path, &self.cleanup, self.remove) {
            Ok(()) => Ok(()),
            Err(VaultError::TransientLock(reason)) => {
                warn!(
                    path = %plain_path.display(),
                    "plaintext left on disk until next session: {}", reason
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Decrypt `container_path` into `plain_path`.
    ///
    /// Returns `Ok(false)` without touching anything when there is no
    /// container (fresh store). Any plaintext already at `plain_path` is
    /// replaced only after the container has verified.
    ///
    /// # Errors
    ///
    /// - `VaultError::MalformedInput` if the container cannot be parsed
    /// - `VaultError::AuthenticationFailure` for a wrong key or tampered container
    pub fn decrypt_container(&self, container_path: &Path, plain_path: &Path) -> Result<bool> {
        if !container_path.exists() {
            debug!(path = %container_path.display(), "no container yet");
            return Ok(false);
        }

        let blob = read_container(container_path)?;
        let plaintext = blob.open(&self.key, CONTAINER_CONTEXT)?;

        if plain_path.exists() {
            warn!(
                path = %plain_path.display(),
                "overwriting plaintext left by an interrupted session"
            );
        }
        write_atomic(plain_path, &plaintext)?;
        info!(
            container = %container_path.display(),
            bytes = plaintext.len(),
            "unsealed store"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn vault(byte: u8) -> ContainerVault {
        ContainerVault::new(
            DerivedKey::from_bytes([byte; 32]),
            CleanupPolicy {
                attempts: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
        )
    }

    fn flip_container_bit(path: &Path, field: &str, byte: usize, bit: u8) {
        let mut json: serde_json::Value =
            serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        let mut raw = hex::decode(json[field].as_str().unwrap()).unwrap();
        if raw.is_empty() {
            return;
        }
        let index = byte % raw.len();
        raw[index] ^= 1 << (bit % 8);
        json[field] = serde_json::Value::String(hex::encode(raw));
        fs::write(path, serde_json::to_vec(&json).unwrap()).unwrap();
    }

    #[test]
    fn test_round_trip_removes_plaintext() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("data.db");
        let container = dir.path().join("data.db.enc");
        fs::write(&plain, b"SQLite format 3\0 pretend pages").unwrap();

        let vault = vault(1);
        vault.encrypt_container(&plain, &container).unwrap();
        assert!(!plain.exists());
        assert!(container.exists());

        assert!(vault.decrypt_container(&container, &plain).unwrap());
        assert_eq!(fs::read(&plain).unwrap(), b"SQLite format 3\0 pretend pages");
    }

    #[test]
    fn test_locked_plaintext_is_left_and_overwritten_next_time() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("data.db");
        let container = dir.path().join("data.db.enc");
        fs::write(&plain, b"sealed pages").unwrap();

        let vault =
            vault(1).with_remover(|_| Err(io::Error::from(io::ErrorKind::PermissionDenied)));
        vault.encrypt_container(&plain, &container).unwrap();
        assert!(plain.exists());
        assert!(container.exists());

        fs::write(&plain, b"edits after the seal").unwrap();
        assert!(vault.decrypt_container(&container, &plain).unwrap());
        assert_eq!(fs::read(&plain).unwrap(), b"sealed pages");
    }

    #[test]
    fn test_remover_errors_other_than_locks_propagate() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("data.db");
        let container = dir.path().join("data.db.enc");
        fs::write(&plain, b"pages").unwrap();

        let vault = vault(1).with_remover(|_| Err(io::Error::other("disk gone")));
        let result = vault.encrypt_container(&plain, &container);
        assert!(matches!(result, Err(VaultError::Io { .. })));
        assert!(container.exists());
    }

    #[test]
    fn test_container_is_hex_json() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("data.db");
        let container = dir.path().join("data.db.enc");
        fs::write(&plain, b"abc").unwrap();

        vault(1).encrypt_container(&plain, &container).unwrap();

        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(&container).unwrap()).unwrap();
        assert_eq!(json["nonce"].as_str().unwrap().len(), 32);
        assert_eq!(json["tag"].as_str().unwrap().len(), 32);
        assert_eq!(json["ciphertext"].as_str().unwrap().len(), 6);
        assert_ne!(json["ciphertext"].as_str().unwrap(), hex::encode(b"abc"));
    }

    #[test]
    fn test_missing_plaintext_is_noop() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("data.db");
        let container = dir.path().join("data.db.enc");

        vault(1).encrypt_container(&plain, &container).unwrap();
        assert!(!container.exists());
    }

    #[test]
    fn test_missing_container_is_noop() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("data.db");
        let container = dir.path().join("data.db.enc");

        assert!(!vault(1).decrypt_container(&container, &plain).unwrap());
        assert!(!plain.exists());
    }

    #[test]
    fn test_wrong_key_fails_and_writes_nothing() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("data.db");
        let container = dir.path().join("data.db.enc");
        fs::write(&plain, b"secret").unwrap();
        vault(1).encrypt_container(&plain, &container).unwrap();

        let result = vault(2).decrypt_container(&container, &plain);
        assert!(matches!(result, Err(VaultError::AuthenticationFailure(_))));
        assert!(!plain.exists());
    }

    #[test]
    fn test_stale_plaintext_is_overwritten() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("data.db");
        let container = dir.path().join("data.db.enc");
        fs::write(&plain, b"good").unwrap();
        vault(1).encrypt_container(&plain, &container).unwrap();

        fs::write(&plain, b"stale leftovers from a crash").unwrap();
        vault(1).decrypt_container(&container, &plain).unwrap();
        assert_eq!(fs::read(&plain).unwrap(), b"good");
    }

    #[test]
    fn test_tamper_keeps_stale_plaintext_untouched() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("data.db");
        let container = dir.path().join("data.db.enc");
        fs::write(&plain, b"good").unwrap();
        vault(1).encrypt_container(&plain, &container).unwrap();
        fs::write(&plain, b"stale").unwrap();
        flip_container_bit(&container, "tag", 0, 0);

        assert!(vault(1).decrypt_container(&container, &plain).is_err());
        assert_eq!(fs::read(&plain).unwrap(), b"stale");
    }

    #[test]
    fn test_malformed_container() {
        let dir = tempdir().unwrap();
        let plain = dir.path().join("data.db");
        let container = dir.path().join("data.db.enc");

        fs::write(&container, b"not json").unwrap();
        assert!(matches!(
            vault(1).decrypt_container(&container, &plain),
            Err(VaultError::MalformedInput(_))
        ));

        fs::write(&container, br#"{"nonce":"zz","tag":"00","ciphertext":""}"#).unwrap();
        assert!(matches!(
            vault(1).decrypt_container(&container, &plain),
            Err(VaultError::MalformedInput(_))
        ));

        fs::write(&container, br#"{"nonce":"0011","tag":"00","ciphertext":""}"#).unwrap();
        assert!(matches!(
            vault(1).decrypt_container(&container, &plain),
            Err(VaultError::MalformedInput(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_round_trip(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let dir = tempdir().unwrap();
            let plain = dir.path().join("data.db");
            let container = dir.path().join("data.db.enc");
            fs::write(&plain, &payload).unwrap();

            let vault = vault(3);
            vault.encrypt_container(&plain, &container).unwrap();
            vault.decrypt_container(&container, &plain).unwrap();
            prop_assert_eq!(fs::read(&plain).unwrap(), payload);
        }

        #[test]
        fn prop_bit_flip_fails(
            payload in proptest::collection::vec(any::<u8>(), 1..512),
            in_tag in any::<bool>(),
            byte in any::<usize>(),
            bit in 0u8..8,
        ) {
            let dir = tempdir().unwrap();
            let plain = dir.path().join("data.db");
            let container = dir.path().join("data.db.enc");
            fs::write(&plain, &payload).unwrap();

            let vault = vault(3);
            vault.encrypt_container(&plain, &container).unwrap();
            let field = if in_tag { "tag" } else { "ciphertext" };
            flip_container_bit(&container, field, byte, bit);

            let result = vault.decrypt_container(&container, &plain);
            prop_assert!(matches!(result, Err(VaultError::AuthenticationFailure(_))));
            prop_assert!(!plain.exists());
        }
    }
}
