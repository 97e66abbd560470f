use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use vaultdb_core::VERSION;

/// VaultDB - a local user-profile store encrypted at rest
#[derive(Parser)]
#[command(name = "vaultdb")]
#[command(author, version = VERSION, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the plaintext working file (container and salt live beside it)
    #[arg(short, long, global = true, env = "VAULTDB_STORE")]
    pub store: Option<PathBuf>,

    /// Config file (default: $XDG_CONFIG_HOME/vaultdb/config.toml)
    #[arg(long, global = true, env = "VAULTDB_CONFIG")]
    pub config: Option<PathBuf>,

    /// Never prompt; fail if the password is not in VAULTDB_PASSWORD
    #[arg(long, global = true)]
    pub no_input: bool,

    /// Debug logging (overridden by VAULTDB_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a config file and create an empty sealed store
    Init(InitArgs),

    /// Show where the store lives and whether it is sealed
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a user profile
    Add(AddArgs),

    /// Show a user profile
    Show {
        /// Identity key of the user
        #[arg(value_name = "NAME")]
        name: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print one column of a user profile
    Get {
        #[arg(value_name = "NAME")]
        name: String,

        /// Column name, e.g. monthly_income
        #[arg(value_name = "COLUMN")]
        column: String,
    },

    /// Update columns of a user profile
    Update(UpdateArgs),

    /// List user names
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete every profile with the given name
    Delete {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Set a user's login password
    Passwd {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Check a user's login password
    Login {
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments for the `init` command
#[derive(Args)]
pub struct InitArgs {
    /// Where the plaintext working file goes (default: $XDG_DATA_HOME/vaultdb/users.db)
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// PBKDF2 iterations; fixed for the life of the store
    #[arg(long)]
    pub kdf_iterations: Option<u32>,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `add` command
#[derive(Args)]
pub struct AddArgs {
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Column value as COLUMN=VALUE (repeatable)
    #[arg(long = "set", value_name = "COLUMN=VALUE")]
    pub set: Vec<String>,

    /// Profile fields as a JSON object; unknown keys are ignored
    #[arg(long, value_name = "JSON", conflicts_with = "set")]
    pub json: Option<String>,
}

/// Arguments for the `update` command
#[derive(Args)]
pub struct UpdateArgs {
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Column value as COLUMN=VALUE (repeatable)
    #[arg(long = "set", value_name = "COLUMN=VALUE")]
    pub set: Vec<String>,

    /// Clear a column (repeatable)
    #[arg(long, value_name = "COLUMN")]
    pub unset: Vec<String>,

    /// Changes as a JSON object; unknown keys are ignored
    #[arg(long, value_name = "JSON", conflicts_with_all = ["set", "unset"])]
    pub json: Option<String>,
}
