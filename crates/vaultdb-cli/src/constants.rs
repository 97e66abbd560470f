//! Constants used throughout the CLI.

/// Environment variable holding the store password.
pub const PASSWORD_ENV: &str = "VAULTDB_PASSWORD";

/// Environment variable holding a user's login password for `passwd` and `login`.
pub const LOGIN_PASSWORD_ENV: &str = "VAULTDB_LOGIN_PASSWORD";

/// Environment variable with a `tracing` filter directive.
pub const LOG_ENV: &str = "VAULTDB_LOG";

/// Exit codes for the CLI.
///
/// These follow common Unix conventions:
/// - 0: Success
/// - 1: General error
/// - 2: Misuse of shell command (reserved by shells)
/// - 3+: Application-specific errors
pub mod exit_codes {
    /// Unknown user, or no store at the configured path.
    pub const NOT_FOUND: i32 = 3;

    /// Invalid user input or arguments.
    pub const INVALID_INPUT: i32 = 4;

    /// Authentication failed (wrong password, missing salt, tampered data).
    pub const AUTH_FAILED: i32 = 5;
}
