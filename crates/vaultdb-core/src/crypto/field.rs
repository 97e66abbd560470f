//! Per-field authenticated encryption.
//!
//! Each confidential column value is sealed on its own and stored as a packed
//! base64 blob that carries its nonce and tag. `None` is passed through
//! unchanged: whether a field is empty is not hidden.

use tracing::warn;

use crate::crypto::aead::EncryptedBlob;
use crate::crypto::key::DerivedKey;
use crate::error::{Result, VaultError};

/// Associated data binding field blobs to this use.
const FIELD_CONTEXT: &[u8] = b"vaultdb-field-v1";

/// Encrypts and decrypts individual string values under the store key.
#[derive(Debug, Clone)]
pub struct FieldCipher {
    key: DerivedKey,
}

impl FieldCipher {
    pub fn new(key: DerivedKey) -> Self {
        Self { key }
    }

    /// Encrypt a value with a fresh nonce. `None` stays `None`.
    ///
    /// # Examples
    ///
    /// ```
    /// use vaultdb_core::crypto::{DerivedKey, FieldCipher};
    ///
    /// let cipher = FieldCipher::new(DerivedKey::from_bytes([9u8; 32]));
    /// let sealed = cipher.encrypt_field(Some("42000")).unwrap().unwrap();
    /// assert_eq!(cipher.decrypt_field(Some(&sealed)).unwrap().as_deref(), Some("42000"));
    /// assert_eq!(cipher.encrypt_field(None).unwrap(), None);
    /// ```
    pub fn encrypt_field(&self, plain: Option<&str>) -> Result<Option<String>> {
        plain
            .map(|value| {
                EncryptedBlob::seal(&self.key, value.as_bytes(), FIELD_CONTEXT)
                    .map(|blob| blob.to_packed())
            })
            .transpose()
    }

    /// Decrypt a packed blob. `None` stays `None`.
    ///
    /// # Errors
    ///
    /// - `VaultError::MalformedInput` if the blob is not a packed blob or the
    ///   plaintext is not UTF-8
    /// - `VaultError::AuthenticationFailure` if the tag does not verify
    pub fn decrypt_field(&self, blob: Option<&str>) -> Result<Option<String>> {
        let Some(packed) = blob else {
            return Ok(None);
        };
        let blob = EncryptedBlob::from_packed(packed)?;
        let plain = blob.open(&self.key, FIELD_CONTEXT)?;
        let value = std::str::from_utf8(&plain)
            .map_err(|_| VaultError::MalformedInput("Field is not valid UTF-8".to_string()))?;
        Ok(Some(value.to_string()))
    }

    /// Fail-closed decrypt: any failure yields `None` and a warning.
    pub fn decrypt_field_or_none(&self, blob: Option<&str>) -> Option<String> {
        match self.decrypt_field(blob) {
            Ok(value) => value,
            Err(err) => {
                warn!("field decryption failed: {}", err);
                None
            }
        }
    }
}
