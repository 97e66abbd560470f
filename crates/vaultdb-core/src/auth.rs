//! Login password hashing using Argon2id.
//!
//! Hashes are stored as PHC strings (`$argon2id$v=19$m=...$salt$hash`), so the
//! parameters travel with each hash and can be raised later without breaking
//! existing logins.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::crypto::validate_password;
use crate::error::{Result, VaultError};

/// Argon2id parameters for new hashes.
///
/// - Memory: 19 MB (19 * 1024 KB)
/// - Iterations: 2
/// - Parallelism: 1
const ARGON2_MEMORY_KB: u32 = 19 * 1024;
const ARGON2_ITERATIONS: u32 = 2;
const ARGON2_PARALLELISM: u32 = 1;

fn hasher() -> Result<Argon2<'static>> {
    let params = argon2::Params::new(
        ARGON2_MEMORY_KB,
        ARGON2_ITERATIONS,
        ARGON2_PARALLELISM,
        None,
    )
    .map_err(|e| VaultError::Crypto(format!("Failed to create Argon2 params: {}", e)))?;

    Ok(Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    ))
}

/// Hash a login password into a PHC string with a fresh random salt.
///
/// # Errors
///
/// Same length rules as store passwords (see [`validate_password`]).
pub fn hash_password(password: &str) -> Result<String> {
    validate_password(password)?;

    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| VaultError::Crypto(format!("Password hashing failed: {}", e)))?;
    Ok(hash.to_string())
}

/// Check `password` against a stored PHC string.
///
/// # Errors
///
/// `VaultError::MalformedInput` if `phc` is not a valid hash string.
pub fn verify_password(password: &str, phc: &str) -> Result<bool> {
    let parsed = PasswordHash::new(phc)
        .map_err(|e| VaultError::MalformedInput(format!("Invalid password hash: {}", e)))?;

    match hasher()?.verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(VaultError::Crypto(format!(
            "Password verification failed: {}",
            e
        ))),
    }
}
