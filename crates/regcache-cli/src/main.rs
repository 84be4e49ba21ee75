mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use regcache_config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    let config = Config::load(cli.config.as_deref())?;

    // Initialize tracing; RUST_LOG wins over the config file
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log.filter)),
        )
        .init();

    match cli.command {
        cli::Commands::Serve(args) => commands::serve::handle(config, args).await,
        cli::Commands::Cache(cmd) => commands::cache::handle(cmd, &config).await,
        cli::Commands::Config(cmd) => commands::config::handle(cmd, &config),
    }
}
