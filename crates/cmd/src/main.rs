// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use cmd::commands::{check_command, parse_interval, run_command, seed_command};
use cmd::config::DEFAULT_CONFIG_FILE;
use diagnostics::*;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "collector")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect files from the active servers into the archive store
    Run(RunArgs),
    /// Validate the configuration and print the resolved servers
    Check(ConfigArgs),
    /// Upload the configured sample files to the test server
    Seed(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Only collect from this server (repeatable)
    #[arg(long = "server")]
    servers: Vec<String>,

    /// Repeat the collection at this interval until interrupted, e.g. 15m
    #[arg(long, value_parser = parse_interval)]
    every: Option<Duration>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_diagnostics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_command(&args.config.config, &args.servers, args.every).await,
        Commands::Check(args) => check_command(&args.config),
        Commands::Seed(args) => seed_command(&args.config).await,
    }
}
