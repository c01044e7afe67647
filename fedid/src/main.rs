use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod client;
mod commands;
mod common;
mod server;

use commands::{ClientCommand, ServerCommand, TokenCommand};

#[derive(Parser)]
#[command(
    name = "fedid",
    about = "AWS federated identity tokens for non-AWS services",
    version = env!("CARGO_PKG_VERSION"),
    author = "ktruck"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the token verifying server
    Server(ServerCommand),
    /// Send a request, optionally carrying an aws-fed-id token
    Client(ClientCommand),
    /// Print a subject token for the current AWS credentials
    Token(TokenCommand),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over the flags when set
    let log_level = if cli.verbose { "debug" } else { &cli.log_level };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = dispatch(cli.command).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Server(server_cmd) => {
            info!("Starting fedid server");
            server::run(server_cmd).await
        }
        Commands::Client(client_cmd) => client::run(client_cmd).await,
        Commands::Token(token_cmd) => client::run_token(token_cmd).await,
    }
}
