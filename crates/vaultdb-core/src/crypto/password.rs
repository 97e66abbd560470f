//! Password validation.
//!
//! Enforces minimum security requirements for store passwords.

use crate::error::{Result, VaultError};

/// Minimum password length in characters.
const MIN_PASSWORD_LENGTH: usize = 8;

/// Validate a store password meets minimum security requirements.
///
/// # Requirements
///
/// - Not empty or only whitespace (`KeyMaterialMissing`)
/// - At least 8 characters long (`InvalidInput`)
///
/// # Examples
///
/// ```
/// use vaultdb_core::crypto::validate_password;
///
/// assert!(validate_password("my-secure-password-123").is_ok());
/// assert!(validate_password("short").is_err());
/// ```
pub fn validate_password(password: &str) -> Result<()> {
    if password.trim().is_empty() {
        return Err(VaultError::KeyMaterialMissing(
            "Password cannot be empty".to_string(),
        ));
    }

    let length = password.chars().count();
    if length < MIN_PASSWORD_LENGTH {
        return Err(VaultError::InvalidInput(format!(
            "Password must be at least {} characters (got {})",
            MIN_PASSWORD_LENGTH, length
        )));
    }

    Ok(())
}
