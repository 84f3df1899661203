mod ask;
mod serve;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "ticket-query")]
#[command(about = "Ask ServiceNow about incidents and problems in plain language")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file (environment variables override it)
    #[arg(long, short = 'c', global = true, env = "TICKET_QUERY_CONFIG")]
    config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve(serve::ServeArgs),

    /// Answer a single question and exit
    Ask(ask::AskArgs),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let output = OutputConfig {
            json: self.json,
            quiet: self.quiet,
        };
        let config_path = self.config;

        match self.command {
            Commands::Serve(args) => serve::run(args, config_path, output).await,
            Commands::Ask(args) => ask::run(args, config_path, output).await,
        }
    }
}

/// Output configuration passed to all commands
#[derive(Debug, Clone, Copy)]
pub struct OutputConfig {
    pub json: bool,
    pub quiet: bool,
}

fn load_config(path: Option<PathBuf>) -> Result<Config> {
    Config::resolve(path.as_deref())
}
