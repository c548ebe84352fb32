use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use stockledger_api::{
    db::{self, DbConfig},
    migrator::Migrator,
};

#[derive(Parser)]
#[command(name = "migration", about = "Manage the stock ledger database schema")]
struct Cli {
    /// Database URL; falls back to DATABASE_URL, then an in-memory SQLite database
    #[arg(long, help = "Database connection URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations (default)
    Up,
    /// Roll back the last `steps` migrations
    Down {
        #[arg(long, default_value_t = 1, help = "Number of migrations to roll back")]
        steps: u32,
    },
    /// Print applied and pending migrations
    Status,
    /// Drop every table and re-apply all migrations
    Fresh,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    let url = cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
        .unwrap_or_else(|| "sqlite::memory:".to_string());

    info!("Connecting to database");
    let config = DbConfig {
        url,
        max_connections: 1,
        min_connections: 1,
        ..Default::default()
    };
    let conn = db::establish_connection_with_config(&config)
        .await
        .context("failed to connect to the database")?;

    match cli.command.unwrap_or(Commands::Up) {
        Commands::Up => {
            Migrator::up(&conn, None).await?;
            info!("Migrations applied");
        }
        Commands::Down { steps } => {
            Migrator::down(&conn, Some(steps)).await?;
            info!(steps, "Migrations rolled back");
        }
        Commands::Status => {
            Migrator::status(&conn).await?;
        }
        Commands::Fresh => {
            Migrator::fresh(&conn).await?;
            info!("Schema recreated");
        }
    }

    Ok(())
}
