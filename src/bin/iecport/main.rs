//! iecport CLI - build IEC 61131-3 structured text programs for Arduino boards

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use iecport::BuildError;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::GlobalOpts;

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {:#}", e);
        let code = e
            .downcast_ref::<BuildError>()
            .map(BuildError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn run() -> Result<()> {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("iecport=debug")
    } else {
        EnvFilter::new("iecport=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let global = GlobalOpts {
        verbose: cli.verbose,
        quiet: cli.quiet,
        no_color: cli.no_color,
        root: cli.root,
        catalog: cli.catalog,
    };

    // Execute command
    match cli.command {
        Commands::Build(args) => commands::build::execute(args, &global),
        Commands::Boards(args) => commands::boards::execute(args, &global),
        Commands::Core(args) => commands::core::execute(args, &global),
        Commands::Lib(args) => commands::lib::execute(args, &global),
        Commands::Doctor(args) => commands::doctor::execute(args, &global),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
