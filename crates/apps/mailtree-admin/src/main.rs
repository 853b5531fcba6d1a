//! mailtree-admin - maintenance entry point for the mail tree store
//!
//! Runs ingest, Maildir and mbox export, orphan sweeps and inspection
//! against the database named by `--db`, the config file, or the default
//! data directory.

use anyhow::Result;
use clap::Parser;
use log::{debug, error, info};
use mailtree::{SqliteMailTree, StoreConfig};

mod cli;
mod commands;

use cli::{Cli, Command};

fn main() {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut store_config = match &cli.config {
        Some(path) => StoreConfig::load_from(path)?,
        None => {
            // Bootstrap config directory
            config::init()?;
            if let Some(path) = StoreConfig::write_default_file()? {
                info!("Wrote default config to {}", path.display());
            }
            StoreConfig::load()?
        }
    };
    if let Some(db) = cli.db {
        store_config.db_path = Some(db);
    }
    debug!("Using store config {:?}", store_config);

    let store = SqliteMailTree::from_config(store_config)?;

    match &cli.command {
        Command::Ingest(cmd) => commands::ingest(&store, cmd),
        Command::Export(cmd) => commands::export(&store, cmd),
        Command::Tree(cmd) => commands::tree(&store, cmd),
        Command::Sweep => commands::sweep(&store),
        Command::Delete(cmd) => commands::delete(&store, cmd),
        Command::Stats => commands::stats(&store),
    }
}
