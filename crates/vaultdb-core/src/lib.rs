//! # VaultDB Core
//!
//! Core library for VaultDB - a local SQLite store encrypted at rest, with
//! per-field encryption for confidential columns.
//!
//! This crate provides the encryption lifecycle, the record repository and
//! the data model independent of the CLI interface.
//!
//! ## Architecture
//!
//! - **crypto**: key derivation, AES-GCM primitive, per-field cipher
//! - **vault**: encrypted container format and the scoped session that owns
//!   the plaintext working file
//! - **storage**: schema migrations, record types and the repository
//! - **auth**: password hashes for user login
//!
//! ## Lifecycle
//!
//! ```text
//! AtRestOnly --open--> Transitioning --> PlaintextOpen --close--> Transitioning --> AtRestOnly
//! ```
//!
//! The plaintext database exists on disk only while a [`VaultSession`] is
//! alive. Dropping the session without closing it still seals the store.

pub mod auth;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod storage;
pub mod vault;

pub use error::{Result, VaultError};
pub use storage::{Column, FieldValue, Repository, UserProfile, UserUpdate};
pub use vault::{CleanupPolicy, Vault, VaultConfig, VaultSession, VaultState};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
