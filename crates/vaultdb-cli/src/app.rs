//! Resolving the store, its config and the password from CLI flags and environment.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use dialoguer::Password;
use secrecy::SecretString;
use vaultdb_core::{Vault, VaultConfig, VaultError};

use crate::cli::Cli;
use crate::config::{default_config_path, read_config, VaultdbConfig};
use crate::constants::{exit_codes, PASSWORD_ENV};

pub fn resolve_config_path(cli: &Cli) -> anyhow::Result<PathBuf> {
    match &cli.config {
        Some(path) => Ok(path.clone()),
        None => default_config_path(),
    }
}

/// Config file contents, or `None` when there is no config file yet.
pub fn load_config(cli: &Cli) -> anyhow::Result<Option<VaultdbConfig>> {
    let path = resolve_config_path(cli)?;
    if !path.exists() {
        return Ok(None);
    }
    read_config(&path).map(Some)
}

pub fn resolve_store_path(cli: &Cli, config: Option<&VaultdbConfig>) -> anyhow::Result<PathBuf> {
    if let Some(path) = &cli.store {
        return Ok(path.clone());
    }
    match config {
        Some(config) => Ok(PathBuf::from(&config.store.path)),
        None => Err(anyhow::anyhow!(missing_config_message(
            &resolve_config_path(cli)?
        ))),
    }
}

fn missing_config_message(config_path: &Path) -> String {
    format!(
        "No store configured (looked for {}). Run `vaultdb init` or pass --store.",
        config_path.display()
    )
}

/// Read the store password from VAULTDB_PASSWORD, or prompt on a TTY.
pub fn prompt_password(cli: &Cli) -> anyhow::Result<SecretString> {
    if let Ok(value) = std::env::var(PASSWORD_ENV) {
        if !value.trim().is_empty() {
            return Ok(SecretString::from(value));
        }
    }
    let interactive = std::io::stdin().is_terminal() && !cli.no_input;
    if !interactive {
        return Err(anyhow::anyhow!(
            "No password provided and no TTY available. Set {}.",
            PASSWORD_ENV
        ));
    }
    Password::new()
        .with_prompt("Store password")
        .interact()
        .map(SecretString::from)
        .map_err(|e| anyhow::anyhow!("Failed to read password: {}", e))
}

/// Read a secret from `env_var`, or prompt for it (twice when `confirm` is set).
pub fn prompt_secret(cli: &Cli, prompt: &str, env_var: &str, confirm: bool) -> anyhow::Result<String> {
    if let Ok(value) = std::env::var(env_var) {
        if !value.trim().is_empty() {
            return Ok(value);
        }
    }
    if !std::io::stdin().is_terminal() || cli.no_input {
        return Err(anyhow::anyhow!(
            "No value provided and no TTY available. Set {}.",
            env_var
        ));
    }
    let mut input = Password::new().with_prompt(prompt);
    if confirm {
        input = input.with_confirmation("Confirm", "Values do not match");
    }
    input
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to read input: {}", e))
}

/// Build the vault for the configured store.
pub fn open_vault(cli: &Cli) -> anyhow::Result<Vault> {
    let config = load_config(cli)?;
    let store_path = resolve_store_path(cli, config.as_ref())?;
    let password = prompt_password(cli)?;
    Ok(Vault::new(vault_config(store_path, password, config.as_ref())))
}

pub fn vault_config(
    store_path: PathBuf,
    password: SecretString,
    config: Option<&VaultdbConfig>,
) -> VaultConfig {
    let vault_config = VaultConfig::new(store_path, password);
    match config {
        Some(config) => vault_config
            .kdf_iterations(config.kdf.iterations)
            .cleanup(config.cleanup_policy()),
        None => vault_config,
    }
}

/// Exit code for an error that reached `main`.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<VaultError>() {
        Some(VaultError::NotFound(_)) => exit_codes::NOT_FOUND,
        Some(VaultError::InvalidInput(_)) | Some(VaultError::MalformedInput(_)) => {
            exit_codes::INVALID_INPUT
        }
        Some(VaultError::AuthenticationFailure(_)) | Some(VaultError::KeyMaterialMissing(_)) => {
            exit_codes::AUTH_FAILED
        }
        _ => 1,
    }
}
