use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use vaultdb_core::crypto::PBKDF2_ITERATIONS;
use vaultdb_core::CleanupPolicy;

#[derive(Debug, Serialize, Deserialize)]
pub struct VaultdbConfig {
    pub store: StoreSection,
    #[serde(default)]
    pub kdf: KdfSection,
    #[serde(default)]
    pub cleanup: CleanupSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSection {
    pub path: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KdfSection {
    pub iterations: u32,
}

impl Default for KdfSection {
    fn default() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupSection {
    pub attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for CleanupSection {
    fn default() -> Self {
        let policy = CleanupPolicy::default();
        Self {
            attempts: policy.attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
        }
    }
}

impl VaultdbConfig {
    pub fn new(store_path: PathBuf, iterations: u32) -> Self {
        Self {
            store: StoreSection {
                path: store_path.to_string_lossy().to_string(),
            },
            kdf: KdfSection { iterations },
            cleanup: CleanupSection::default(),
        }
    }

    pub fn cleanup_policy(&self) -> CleanupPolicy {
        CleanupPolicy {
            attempts: self.cleanup.attempts.max(1),
            initial_delay: Duration::from_millis(self.cleanup.initial_delay_ms),
            max_delay: Duration::from_millis(self.cleanup.max_delay_ms),
        }
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_config_dir()?.join("config.toml"))
}

pub fn default_store_path() -> anyhow::Result<PathBuf> {
    Ok(xdg_data_dir()?.join("users.db"))
}

pub fn read_config(path: &Path) -> anyhow::Result<VaultdbConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
    toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Failed to parse config {}: {}", path.display(), e))
}

pub fn write_config(path: &Path, config: &VaultdbConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create config directory {}: {}",
                parent.display(),
                e
            )
        })?;
    }
    let contents =
        toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("TOML error: {}", e))?;
    std::fs::write(path, contents)
        .map_err(|e| anyhow::anyhow!("Failed to write config {}: {}", path.display(), e))?;
    Ok(())
}

pub fn xdg_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_CONFIG_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("vaultdb"));
        }
    }
    Ok(home_dir()?.join(".config").join("vaultdb"))
}

pub fn xdg_data_dir() -> anyhow::Result<PathBuf> {
    if let Ok(value) = std::env::var("XDG_DATA_HOME") {
        if !value.trim().is_empty() {
            return Ok(PathBuf::from(value).join("vaultdb"));
        }
    }
    Ok(home_dir()?.join(".local").join("share").join("vaultdb"))
}

fn home_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("HOME is not set; cannot resolve default paths"))?;
    Ok(PathBuf::from(home))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: VaultdbConfig = toml::from_str("[store]\npath = \"/tmp/users.db\"\n").unwrap();
        assert_eq!(config.store.path, "/tmp/users.db");
        assert_eq!(config.kdf.iterations, PBKDF2_ITERATIONS);
        assert_eq!(config.cleanup_policy(), CleanupPolicy::default());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = VaultdbConfig::new(dir.path().join("users.db"), 2_000);

        write_config(&path, &config).unwrap();
        let loaded = read_config(&path).unwrap();

        assert_eq!(loaded.store.path, config.store.path);
        assert_eq!(loaded.kdf.iterations, 2_000);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let config: VaultdbConfig = toml::from_str(
            "[store]\npath = \"x\"\n[cleanup]\nattempts = 0\ninitial_delay_ms = 5\nmax_delay_ms = 10\n",
        )
        .unwrap();
        assert_eq!(config.cleanup_policy().attempts, 1);
    }
}
