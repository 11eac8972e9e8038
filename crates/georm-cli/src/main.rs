//! georm command-line client
//!
//! Compiles query requests, runs them against a SQLite database (optionally
//! federated with remote georm endpoints) and manages cache mirror tables.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

mod commands;
mod config;
mod error;
mod formatter;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::{Args, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("georm=info")),
        )
        .init();

    let args = Args::parse();

    match run(args).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            tracing::debug!(kind = ?e.kind(), "command failed");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<String, CliError> {
    match args.command {
        Command::Compile(compile) => commands::compile(&compile),
        Command::Query(query) => commands::query(&query).await,
        Command::InitCache(init) => commands::init_cache(&init),
    }
}
