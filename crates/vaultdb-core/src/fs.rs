//! Filesystem utilities for atomic writes and plaintext cleanup.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::error::{Result, VaultError};

/// Windows `ERROR_SHARING_VIOLATION`.
const ERROR_SHARING_VIOLATION: i32 = 32;
/// Windows `ERROR_LOCK_VIOLATION`.
const ERROR_LOCK_VIOLATION: i32 = 33;

/// Bounded exponential backoff for removing the plaintext working file.
///
/// SQLite may keep the file handle for a moment after the connection is told
/// to close, so removal is retried before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupPolicy {
    /// Total number of attempts (at least one is always made).
    pub attempts: u32,
    /// Delay before the second attempt; doubled after every failure.
    pub initial_delay: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for CleanupPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl CleanupPolicy {
    /// Delay to wait after the given (zero-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Atomically rename a file, with fallback for platforms where rename fails if target exists.
///
/// On some platforms (notably Windows), `fs::rename` fails if the destination already exists.
/// This function handles that case by removing the destination first and retrying.
///
/// If the rename ultimately fails, the temp file is cleaned up.
///
/// # Errors
///
/// Returns an error if the rename fails even after the fallback attempt.
pub fn rename_with_fallback(temp_path: &Path, destination: &Path) -> io::Result<()> {
    if let Err(initial_err) = fs::rename(temp_path, destination) {
        let _ = fs::remove_file(destination);
        fs::rename(temp_path, destination).map_err(|retry_err| {
            let _ = fs::remove_file(temp_path);
            io::Error::new(
                retry_err.kind(),
                format!(
                    "Atomic rename failed (initial: {}, retry: {})",
                    initial_err, retry_err
                ),
            )
        })?;
    }
    Ok(())
}

/// Write `data` to `path` through a synced temp file in the same directory.
///
/// Readers see either the old file or the complete new one, never a torn write.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| VaultError::Storage(format!("System time error: {}", e)))?
        .as_nanos();
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| VaultError::Storage(format!("Invalid filename: {}", path.display())))?;
    let temp_path = parent.join(format!(".{}.{}.tmp", filename, nanos));

    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)?;
    set_owner_only(&temp_path)?;
    let written = file.write_all(data).and_then(|_| file.sync_all());
    if let Err(err) = written {
        drop(file);
        let _ = fs::remove_file(&temp_path);
        return Err(err.into());
    }
    drop(file);

    rename_with_fallback(&temp_path, path)?;
    Ok(())
}

/// Restrict a file to its owner (no-op off unix).
pub fn set_owner_only(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Whether an I/O error looks like another handle still holding the file.
pub fn is_transient_lock(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    matches!(
        err.raw_os_error(),
        Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
    )
}

/// Run `op` until it succeeds, retrying transient lock errors per `policy`.
///
/// Non-transient errors are returned immediately. When every attempt hits a
/// transient error the result is [`VaultError::TransientLock`].
pub fn retry_with_backoff<F>(policy: &CleanupPolicy, what: &str, mut op: F) -> Result<()>
where
    F: FnMut() -> io::Result<()>,
{
    let attempts = policy.attempts.max(1);
    let mut last_err = None;
    for attempt in 0..attempts {
        match op() {
            Ok(()) => return Ok(()),
            Err(err) if is_transient_lock(&err) => {
                debug!(attempt = attempt + 1, attempts, "{} is locked: {}", what, err);
                last_err = Some(err);
                if attempt + 1 < attempts {
                    sleep(policy.delay_after(attempt));
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
    Err(VaultError::TransientLock(format!(
        "{} still locked after {} attempts: {}",
        what,
        attempts,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Remove a file, retrying while it is locked. A missing file counts as removed.
pub fn remove_with_retry(path: &Path, policy: &CleanupPolicy) -> Result<()> {
    remove_with_retry_using(path, policy, |p| fs::remove_file(p))
}

/// [`remove_with_retry`] with a caller-supplied removal step.
pub fn remove_with_retry_using<R>(path: &Path, policy: &CleanupPolicy, mut remove: R) -> Result<()>
where
    R: FnMut(&Path) -> io::Result<()>,
{
    retry_with_backoff(policy, &path.display().to_string(), || {
        match remove(path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    })
}
