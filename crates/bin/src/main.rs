use clap::Parser;
use tracing_subscriber::EnvFilter;

mod checksum;
mod cli;
mod commands;
mod delta_log;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("rosetta=info".parse()?)
                .add_directive("chat=info".parse()?),
        )
        .init();

    match cli.command {
        Commands::Serve(args) => commands::serve::run(&args).await,
        Commands::Connect(args) => commands::connect::run(&args).await,
    }
}
