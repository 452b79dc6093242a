// SPDX-FileCopyrightText: 2026 Dentassist Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dentassist - on-device clinical documentation backend.
//!
//! Binary entry point: parses the CLI and hands off to the serve loop.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod serve;

/// Dentassist - on-device clinical documentation backend.
#[derive(Parser, Debug)]
#[command(name = "dentassist", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the backend HTTP service.
    Serve {
        /// Explicit config file instead of the standard lookup.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the resolved configuration and data directory.
    Config {
        /// Explicit config file instead of the standard lookup.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve { config } => serve::run_serve(config).await,
        Commands::Config { config } => serve::print_config(config),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
