//! Lockbox CLI - encrypted credentials from the terminal
//!
//! Works against the server when it is reachable and against the local
//! cache when it is not; `lockbox sync` or `lockbox daemon` catch up later.

mod auth;
mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::{run_login, run_logout, run_register, run_status};
use crate::commands::common::CliContext;
use crate::commands::completions::run_completions;
use crate::commands::create::run_create;
use crate::commands::daemon::run_daemon;
use crate::commands::delete::run_delete;
use crate::commands::get::run_get;
use crate::commands::list::run_list;
use crate::commands::sync::{run_purge, run_sync};
use crate::commands::update::run_update;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "lockbox=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Completions must work before any vault configuration exists
    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let context = CliContext::load(cli.db_path, cli.server_url)?;

    match cli.command {
        Commands::Register { username, password } => {
            run_register(&context, &username, &password).await?;
        }
        Commands::Login { username, password } => {
            run_login(&context, &username, &password).await?;
        }
        Commands::Logout => run_logout(&context)?,
        Commands::Status => run_status(&context).await?,
        Commands::Create(args) => run_create(&context, args).await?,
        Commands::Get { name, json } => run_get(&context, &name, json).await?,
        Commands::List { json } => run_list(&context, json).await?,
        Commands::Update(args) => run_update(&context, args).await?,
        Commands::Delete { name } => run_delete(&context, &name).await?,
        Commands::Sync => run_sync(&context).await?,
        Commands::Purge => run_purge(&context).await?,
        Commands::Daemon => run_daemon(&context).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
