//! AES-256-GCM with 16-byte nonces and detached tags.
//!
//! Both the container and the per-field cipher seal through this module, each
//! with its own associated-data label so a blob from one context never
//! verifies in the other.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{AeadInPlace, KeyInit, OsRng};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce, Tag};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::crypto::key::DerivedKey;
use crate::error::{Result, VaultError};

/// Size of the GCM nonce in bytes.
pub const NONCE_SIZE: usize = 16;

/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// One AEAD output: nonce, tag and ciphertext, kept separate.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub nonce: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
    pub ciphertext: Vec<u8>,
}

impl std::fmt::Debug for EncryptedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedBlob")
            .field("nonce", &hex::encode(self.nonce))
            .field("tag", &hex::encode(self.tag))
            .field("ciphertext_len", &self.ciphertext.len())
            .finish()
    }
}

fn cipher(key: &DerivedKey) -> Result<Aes256Gcm16> {
    Aes256Gcm16::new_from_slice(key.as_bytes())
        .map_err(|e| VaultError::Crypto(format!("Invalid key: {}", e)))
}

impl EncryptedBlob {
    /// Encrypt `plaintext` under `key` with a fresh random nonce.
    pub fn seal(key: &DerivedKey, plaintext: &[u8], associated_data: &[u8]) -> Result<Self> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce);

        let mut ciphertext = plaintext.to_vec();
        let tag = cipher(key)?
            .encrypt_in_place_detached(
                Nonce::<U16>::from_slice(&nonce),
                associated_data,
                &mut ciphertext,
            )
            .map_err(|_| VaultError::Crypto("Encryption failed".to_string()))?;

        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(tag.as_slice());

        Ok(Self {
            nonce,
            tag: tag_bytes,
            ciphertext,
        })
    }

    /// Decrypt and verify. No plaintext is returned unless the tag matches.
    ///
    /// # Errors
    ///
    /// Returns `VaultError::AuthenticationFailure` for a wrong key or any
    /// modification of nonce, tag or ciphertext.
    pub fn open(&self, key: &DerivedKey, associated_data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let mut buffer = Zeroizing::new(self.ciphertext.clone());
        cipher(key)?
            .decrypt_in_place_detached(
                Nonce::<U16>::from_slice(&self.nonce),
                associated_data,
                buffer.as_mut_slice(),
                Tag::<U16>::from_slice(&self.tag),
            )
            .map_err(|_| {
                VaultError::AuthenticationFailure(
                    "wrong password or corrupted data".to_string(),
                )
            })?;
        Ok(buffer)
    }

    /// Pack as `base64(nonce ‖ tag ‖ ciphertext)` for storage in one text column.
    pub fn to_packed(&self) -> String {
        let mut packed = Vec::with_capacity(NONCE_SIZE + TAG_SIZE + self.ciphertext.len());
        packed.extend_from_slice(&self.nonce);
        packed.extend_from_slice(&self.tag);
        packed.extend_from_slice(&self.ciphertext);
        STANDARD.encode(packed)
    }

    /// Inverse of [`EncryptedBlob::to_packed`].
    ///
    /// # Errors
    ///
    /// Returns `VaultError::MalformedInput` for invalid base64 or a payload
    /// shorter than nonce plus tag.
    pub fn from_packed(packed: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(packed.trim())
            .map_err(|e| VaultError::MalformedInput(format!("Invalid field blob: {}", e)))?;
        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(VaultError::MalformedInput(format!(
                "Field blob too short ({} bytes)",
                bytes.len()
            )));
        }

        let (nonce, rest) = bytes.split_at(NONCE_SIZE);
        let (tag, ciphertext) = rest.split_at(TAG_SIZE);
        Self::from_parts(nonce, tag, ciphertext.to_vec())
    }

    /// Assemble a blob from separately stored parts, checking their lengths.
    pub fn from_parts(nonce: &[u8], tag: &[u8], ciphertext: Vec<u8>) -> Result<Self> {
        let nonce: [u8; NONCE_SIZE] = nonce.try_into().map_err(|_| {
            VaultError::MalformedInput(format!(
                "Nonce must be {} bytes (got {})",
                NONCE_SIZE,
                nonce.len()
            ))
        })?;
        let tag: [u8; TAG_SIZE] = tag.try_into().map_err(|_| {
            VaultError::MalformedInput(format!(
                "Tag must be {} bytes (got {})",
                TAG_SIZE,
                tag.len()
            ))
        })?;
        Ok(Self {
            nonce,
            tag,
            ciphertext,
        })
    }
}
