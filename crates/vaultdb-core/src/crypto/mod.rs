//! Cryptographic operations for VaultDB.
//!
//! This module provides encryption and key derivation services using
//! well-audited libraries:
//! - **AES-256-GCM**: authenticated encryption for the container and for fields
//! - **PBKDF2-HMAC-SHA256**: password-based key derivation with a fixed
//!   iteration count
//!
//! ## Security Model
//!
//! - One key per store, derived from the password and a persisted 32-byte salt
//! - A fresh random 16-byte nonce for every encryption
//! - Tag verification before any plaintext is returned or written
//! - Key material zeroized from memory on drop
//!
//! ## Threat Model
//!
//! We defend against:
//! - Theft of the encrypted container or a database copy with encrypted fields
//! - Tampering with ciphertext at rest
//!
//! We do NOT defend against:
//! - Compromised OS / keylogger
//! - Access to the plaintext working file while a session is open

pub mod aead;
pub mod field;
pub mod key;
pub mod password;

pub use aead::{EncryptedBlob, NONCE_SIZE, TAG_SIZE};
pub use field::FieldCipher;
pub use key::{derive_key, load_or_create_salt, DerivedKey, PBKDF2_ITERATIONS, SALT_SIZE};
pub use password::validate_password;
