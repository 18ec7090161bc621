// ABOUTME: Entry point for the autodeploy CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;
mod commands;

use autodeploy::config::{self, Config};
use autodeploy::error::Result;
use autodeploy::output::{Output, OutputMode};
use clap::Parser;
use cli::{Cli, Commands};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn mode(json: bool, quiet: bool) -> OutputMode {
    if json {
        OutputMode::Json
    } else if quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cwd = env::current_dir()?;

    match cli.command {
        Commands::Init { region, force } => config::init_config(&cwd, region.as_deref(), force),
        Commands::Plan {
            request,
            template,
            json,
        } => {
            let config = Config::discover(&cwd)?;
            commands::plan(&config, &request, template, &Output::new(mode(json, false)))
        }
        Commands::Deploy {
            request,
            json,
            quiet,
        } => {
            let config = Config::discover(&cwd)?;
            commands::deploy(config, &request, Output::new(mode(json, quiet))).await
        }
        Commands::Status { job, json } => {
            let config = Config::discover(&cwd)?;
            commands::status(&config, &job, &Output::new(mode(json, false)))
        }
        Commands::Logs { job, json } => {
            let config = Config::discover(&cwd)?;
            commands::logs(&config, &job, &Output::new(mode(json, false)))
        }
    }
}
