use anyhow::Result;
use clap::Parser;

use sattrack_backend::{config, init_tracing, server};

#[derive(Parser, Debug)]
#[command(name = "sattrack-backend", version, about = "Satellite tracking backend service")]
struct Cli {
    /// Bind address, overrides the configured value
    #[arg(long)]
    host: Option<String>,

    /// Bind port, overrides the configured value
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database URL, overrides the configured value
    #[arg(long, env = "SATTRACK_DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    init_tracing();

    let mut cfg = config::load_config()?;
    if let Some(host) = args.host {
        cfg.server.host = host;
    }
    if let Some(port) = args.port {
        cfg.server.port = port;
    }
    if let Some(database_url) = args.database_url {
        cfg.database.url = database_url;
    }

    server::start_server(cfg).await
}
