//! pilot CLI - C/C++ toolchain resolution

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pilot::util::diagnostic;
use pilot::ResolveError;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    let color = !cli.no_color && std::io::stderr().is_terminal();

    if let Err(e) = run(cli) {
        match e.downcast_ref::<ResolveError>() {
            Some(resolve_err) => diagnostic::emit(&resolve_err.to_diagnostic(), color),
            None => eprintln!("error: {:#}", e),
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("pilot=debug")
    } else {
        EnvFilter::new("pilot=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let ctx = commands::Context::load(&cli)?;

    match cli.command {
        Commands::Resolve(args) => commands::resolve::execute(&ctx, args),
        Commands::Cache(args) => commands::cache::execute(&ctx, args),
        Commands::Generators(args) => commands::generators::execute(args),
        Commands::Completions(args) => commands::completions::execute(args),
    }
}
