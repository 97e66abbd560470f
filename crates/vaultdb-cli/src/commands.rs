//! Command handlers.

use clap::CommandFactory;
use clap_complete::generate;
use secrecy::SecretString;
use tracing::debug;

use vaultdb_core::crypto::PBKDF2_ITERATIONS;
use vaultdb_core::{Column, FieldValue, UserProfile, UserUpdate, Vault, VaultError};

use crate::app::{
    load_config, open_vault, prompt_secret, resolve_config_path, resolve_store_path,
    vault_config,
};
use crate::cli::{AddArgs, Cli, Commands, InitArgs, UpdateArgs};
use crate::config::{default_store_path, write_config, VaultdbConfig};
use crate::constants::{LOGIN_PASSWORD_ENV, PASSWORD_ENV};
use crate::output::{print_profile, print_status, profile_json};

pub fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init(args) => handle_init(cli, args),
        Commands::Status { json } => handle_status(cli, *json),
        Commands::Add(args) => handle_add(cli, args),
        Commands::Show { name, json } => handle_show(cli, name, *json),
        Commands::Get { name, column } => handle_get(cli, name, column),
        Commands::Update(args) => handle_update(cli, args),
        Commands::List { json } => handle_list(cli, *json),
        Commands::Delete { name } => handle_delete(cli, name),
        Commands::Passwd { name } => handle_passwd(cli, name),
        Commands::Login { name } => handle_login(cli, name),
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            generate(*shell, &mut command, "vaultdb", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn handle_init(cli: &Cli, args: &InitArgs) -> anyhow::Result<()> {
    let config_path = resolve_config_path(cli)?;
    if config_path.exists() && !args.force {
        return Err(anyhow::anyhow!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        ));
    }

    let store_path = match args.path.clone().or_else(|| cli.store.clone()) {
        Some(path) => path,
        None => default_store_path()?,
    };
    if let Some(parent) = store_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let config = VaultdbConfig::new(
        store_path.clone(),
        args.kdf_iterations.unwrap_or(PBKDF2_ITERATIONS),
    );
    let password = prompt_secret(cli, "Choose a store password", PASSWORD_ENV, true)?;
    let vault = Vault::new(vault_config(
        store_path.clone(),
        SecretString::from(password),
        Some(&config),
    ));

    // Creates the salt on a fresh store, or checks the password on an existing one.
    let state = vault.open()?.close()?;
    write_config(&config_path, &config)?;

    if !cli.quiet {
        println!("Initialized store at {} ({})", store_path.display(), state);
        println!("Config written to {}", config_path.display());
    }
    Ok(())
}

fn handle_status(cli: &Cli, json: bool) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let store_path = resolve_store_path(cli, config.as_ref())?;
    // Inspecting files needs no key material.
    let vault = Vault::new(vault_config(
        store_path.clone(),
        SecretString::from(String::new()),
        config.as_ref(),
    ));
    print_status(&store_path.display().to_string(), vault.state(), json)
}

fn handle_add(cli: &Cli, args: &AddArgs) -> anyhow::Result<()> {
    let changes = match &args.json {
        Some(raw) => UserUpdate::from_json(&serde_json::from_str(raw).map_err(VaultError::from)?)?,
        None => parse_assignments(&args.set, &[])?,
    };
    let mut profile = UserProfile::new(args.name.clone());
    profile.apply(&changes)?;

    let vault = open_vault(cli)?;
    let id = vault.with_session(|repo| repo.save(&profile))?;
    if !cli.quiet {
        println!("Added {} (id {})", args.name, id);
    }
    Ok(())
}

fn handle_show(cli: &Cli, name: &str, json: bool) -> anyhow::Result<()> {
    let vault = open_vault(cli)?;
    let profile = vault
        .with_session(|repo| repo.get(name))?
        .ok_or_else(|| VaultError::NotFound(format!("No user named {:?}", name)))?;

    if json {
        println!("{}", profile_json(&profile)?);
    } else {
        print_profile(&profile);
    }
    if !profile.unreadable.is_empty() {
        eprintln!(
            "Warning: {} field(s) could not be decrypted",
            profile.unreadable.len()
        );
    }
    Ok(())
}

fn handle_get(cli: &Cli, name: &str, column: &str) -> anyhow::Result<()> {
    let column: Column = column.parse()?;
    let vault = open_vault(cli)?;
    let value = vault
        .with_session(|repo| repo.get_field(name, column))?
        .ok_or_else(|| VaultError::NotFound(format!("No user named {:?}", name)))?;

    match value {
        FieldValue::Null => {}
        value => println!("{}", value),
    }
    Ok(())
}

fn handle_update(cli: &Cli, args: &UpdateArgs) -> anyhow::Result<()> {
    let update = match &args.json {
        Some(raw) => UserUpdate::from_json(&serde_json::from_str(raw).map_err(VaultError::from)?)?,
        None => parse_assignments(&args.set, &args.unset)?,
    };
    if update.is_empty() {
        return Err(VaultError::InvalidInput(
            "Nothing to update; pass --set, --unset or --json".to_string(),
        )
        .into());
    }

    let vault = open_vault(cli)?;
    let rows = vault.with_session(|repo| repo.update(&args.name, &update))?;
    if !cli.quiet {
        println!("Updated {} row(s) for {}", rows, args.name);
    }
    Ok(())
}

fn handle_list(cli: &Cli, json: bool) -> anyhow::Result<()> {
    let vault = open_vault(cli)?;
    let names = vault.with_session(|repo| repo.list_names())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
    } else {
        for name in names {
            println!("{}", name);
        }
    }
    Ok(())
}

fn handle_delete(cli: &Cli, name: &str) -> anyhow::Result<()> {
    let vault = open_vault(cli)?;
    let rows = vault.with_session(|repo| repo.delete(name))?;
    if !cli.quiet {
        println!("Deleted {} row(s) for {}", rows, name);
    }
    Ok(())
}

fn handle_passwd(cli: &Cli, name: &str) -> anyhow::Result<()> {
    let vault = open_vault(cli)?;
    let login = prompt_secret(cli, "New login password", LOGIN_PASSWORD_ENV, true)?;
    vault.with_session(|repo| repo.set_password(name, &login))?;
    if !cli.quiet {
        println!("Login password set for {}", name);
    }
    Ok(())
}

fn handle_login(cli: &Cli, name: &str) -> anyhow::Result<()> {
    let vault = open_vault(cli)?;
    let login = prompt_secret(cli, "Login password", LOGIN_PASSWORD_ENV, false)?;
    if vault.with_session(|repo| repo.verify_password(name, &login))? {
        if !cli.quiet {
            println!("Login ok");
        }
        Ok(())
    } else {
        Err(VaultError::AuthenticationFailure("Incorrect login password".to_string()).into())
    }
}

/// Turn `COLUMN=VALUE` and bare `COLUMN` (cleared) arguments into an update.
fn parse_assignments(set: &[String], unset: &[String]) -> anyhow::Result<UserUpdate> {
    let mut update = UserUpdate::new();
    for assignment in set {
        let (column, raw) = assignment.split_once('=').ok_or_else(|| {
            VaultError::InvalidInput(format!("Expected COLUMN=VALUE, got {:?}", assignment))
        })?;
        let column: Column = column.parse()?;
        update = update.set(column, FieldValue::parse(column, raw)?)?;
    }
    for column in unset {
        let column: Column = column.parse()?;
        update = update.set(column, FieldValue::Null)?;
    }
    debug!(columns = update.len(), "parsed assignments");
    Ok(update)
}
