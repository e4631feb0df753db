// SPDX-FileCopyrightText: 2026 Serialite Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Serialite - a serialized single-writer SQLite coordinator.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod client;
mod serve;
mod shutdown;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serialite_config::{ConfigError, SerialiteConfig};
use serialite_core::SerialiteError;

/// Serialite - a serialized single-writer SQLite coordinator.
#[derive(Parser, Debug)]
#[command(name = "serialite", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the default hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Own the database and serve callers until SIGINT/SIGTERM.
    Serve,
    /// Run one statement and print its rows as JSON.
    Sql {
        /// The statement (or `;`-separated script).
        statement: String,
        /// JSON array of parameters: flat for one binding, nested for a batch.
        #[arg(long)]
        params: Option<String>,
        /// Print rows as value lists instead of column maps.
        #[arg(long)]
        list: bool,
    },
    /// Ask the coordinator to commit now.
    Commit,
    /// Ask the coordinator to take a backup now and print its path.
    Backup,
    /// Check whether the RPC server answers.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration and print the resolved values.
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<SerialiteConfig, Vec<ConfigError>> {
    match path {
        Some(path) => serialite_config::load_and_validate_path(path),
        None => serialite_config::load_and_validate(),
    }
}

fn check_config(config: &SerialiteConfig) -> Result<(), SerialiteError> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| SerialiteError::Internal(format!("render config: {e}")))?;
    println!("{rendered}");
    eprintln!("serialite: configuration is valid");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("serialite={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            serialite_config::render_errors(&errors);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.logging.level);

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Sql {
            statement,
            params,
            list,
        }) => client::run_sql(&config, &statement, params.as_deref(), list).await,
        Some(Commands::Commit) => client::run_commit(&config).await,
        Some(Commands::Backup) => client::run_backup(&config).await,
        Some(Commands::Status { json }) => client::run_status(&config, json).await,
        Some(Commands::CheckConfig) => check_config(&config),
        None => {
            println!("serialite: use --help for available commands");
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("serialite: {} error: {e}", e.kind());
            ExitCode::FAILURE
        }
    }
}
