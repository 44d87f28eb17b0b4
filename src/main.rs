use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docrelay::config::Config;
use docrelay::gateway;

#[derive(Parser)]
#[command(name = "docrelay", version, about = "Webhook relay between workchat and docspace")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the webhook gateway (default)
    Serve {
        /// Bind host, overrides DOCRELAY_HOST
        #[arg(long)]
        host: Option<String>,
        /// Bind port, overrides DOCRELAY_PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate configuration and print a masked summary
    ConfigCheck,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve {
        host: None,
        port: None,
    }) {
        Command::Serve { host, port } => {
            let mut config = Config::from_env()?;
            if let Some(host) = host {
                config.gateway.host = host;
            }
            if let Some(port) = port {
                config.gateway.port = port;
            }
            gateway::run_gateway(config).await
        }
        Command::ConfigCheck => {
            let config = Config::from_env()?;
            println!("{}", config.summary());
            Ok(())
        }
    }
}
