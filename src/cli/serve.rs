use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use super::OutputConfig;

#[derive(Args)]
pub struct ServeArgs {
    /// Address to bind (overrides config and API_HOST)
    #[arg(long)]
    host: Option<String>,

    /// HTTP server port (overrides config and API_PORT)
    #[arg(long)]
    port: Option<u16>,
}

pub async fn run(args: ServeArgs, config_path: Option<PathBuf>, output: OutputConfig) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if !output.quiet && !output.json {
        println!(
            "Serving on http://{}:{} (POST /query, POST /query/raw, GET /health)",
            config.server.host, config.server.port
        );
    }

    crate::http::run_server(config).await
}
