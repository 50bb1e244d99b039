//! cmakeup CLI - provisions CMake and drives cmake/ctest

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("cmakeup=debug")
    } else {
        EnvFilter::new("cmakeup=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    match cli.command {
        Commands::GetBinaries(args) => commands::get_binaries::execute(args),
        Commands::Generate(args) => commands::generate::execute(args),
        Commands::Install(args) => commands::install::execute(args),
        Commands::Test(args) => commands::test::execute(args),
    }
}
