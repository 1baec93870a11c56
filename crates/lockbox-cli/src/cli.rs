use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "lockbox")]
#[command(about = "Keep credentials encrypted, with offline-first sync")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local cache database
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Override the server base URL (LOCKBOX_SERVER_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub server_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a server account
    Register {
        #[arg(long, value_name = "NAME")]
        username: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Sign in and store the session in the OS keychain
    Login {
        #[arg(long, value_name = "NAME")]
        username: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Clear the stored session
    Logout,
    /// Show sign-in state and pending local changes
    Status,
    /// Create a lock box
    #[command(alias = "add")]
    Create(LockBoxArgs),
    /// Show one lock box
    Get {
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List lock boxes
    #[command(alias = "ls")]
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change the given fields of a lock box
    #[command(alias = "edit")]
    Update(LockBoxArgs),
    /// Delete a lock box
    #[command(alias = "rm")]
    Delete { name: String },
    /// Push local changes and pull server records once
    Sync,
    /// Remove expired deleted records from the local cache
    Purge,
    /// Run background sync and purge until interrupted
    Daemon,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct LockBoxArgs {
    /// Lock box name, unique per user
    pub name: String,
    #[arg(long, value_name = "URL")]
    pub url: Option<String>,
    #[arg(long, value_name = "LOGIN")]
    pub login: Option<String>,
    #[arg(long, value_name = "PASSWORD")]
    pub password: Option<String>,
    #[arg(long, value_name = "TEXT")]
    pub description: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
