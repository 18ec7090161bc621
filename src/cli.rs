// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "autodeploy")]
#[command(about = "Deploy a repository to AWS from a deployment request")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new autodeploy.yml configuration file
    Init {
        /// AWS region to deploy into
        #[arg(long)]
        region: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Show which infrastructure a request would get, without creating anything
    Plan {
        /// Deployment request (YAML)
        request: PathBuf,

        /// Also print the generated Terraform
        #[arg(long)]
        template: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Provision infrastructure and deploy the repository
    Deploy {
        /// Deployment request (YAML)
        request: PathBuf,

        /// Output JSON lines (for scripting)
        #[arg(long, conflicts_with = "quiet")]
        json: bool,

        /// Only print the final URL
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show the state of a job
    Status {
        /// Job id printed by `deploy`
        job: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a job's log
    Logs {
        /// Job id printed by `deploy`
        job: String,

        /// Output JSON lines
        #[arg(long)]
        json: bool,
    },
}
