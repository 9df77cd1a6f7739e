mod cli;
mod server;

use clap::Parser;
use cli::{Cli, Commands};
use jobledger::config::Config;
use jobledger::observability::init_tracing;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    init_tracing(&config.telemetry);

    match cli.command {
        Commands::Serve(args) => server::run(config, args.address).await?,
        Commands::Trim => {
            let repository = server::open_repository(&config)?;
            let stats = repository.trim_all().await?;
            repository.persist().await?;
            info!(evicted = stats.total(), records_deleted = stats.records_deleted, "Trim complete");
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Stats => {
            let repository = server::open_repository(&config)?;
            println!("{}", serde_json::to_string_pretty(&repository.stats())?);
        }
    }

    Ok(())
}
