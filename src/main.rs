//! Ops entry point for the accord run ledger.
//!
//! Applies migrations and inspects run history and watermarks; actual
//! reconciliation runs are driven by the host application through
//! [`accord::engine::SyncEngine`].

use accord::config::ConfigLoader;
use accord::engine::watermark::WatermarkResolver;
use accord::models::sync_run::SyncDirection;
use accord::repositories::SyncRunRepository;
use accord::{db, logging};
use anyhow::anyhow;
use clap::{Parser, Subcommand};
use migration::{Migrator, MigratorTrait};

#[derive(Parser)]
#[command(name = "accord", about = "Reconciliation run ledger operations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply ledger migrations
    Migrate,
    /// Show recent runs for a table and direction
    History {
        #[arg(long)]
        table: String,
        /// primary-to-remote or remote-to-primary
        #[arg(long)]
        direction: String,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
    /// Show the next incremental watermark for a table and direction
    Watermark {
        #[arg(long)]
        table: String,
        /// primary-to-remote or remote-to-primary
        #[arg(long)]
        direction: String,
    },
}

fn parse_direction(value: &str) -> anyhow::Result<SyncDirection> {
    value.parse::<SyncDirection>().map_err(|err| anyhow!(err))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load()?;
    logging::init_subscriber(&config);

    let db = db::init_pool(&config).await?;

    match cli.command {
        Command::Migrate => {
            Migrator::up(&db, None).await?;
            println!("migrations applied");
        }
        Command::History {
            table,
            direction,
            limit,
        } => {
            let direction = parse_direction(&direction)?;
            let runs = SyncRunRepository::new(db)
                .recent_for(&table, direction, limit)
                .await?;
            if runs.is_empty() {
                println!("no runs recorded for {table} ({direction})");
            }
            for run in runs {
                println!(
                    "{}  {:<11}  synced {}/{} ({:.2}%)  {}",
                    run.ran_on,
                    run.status,
                    run.records_synced,
                    run.records_required,
                    run.completion_percentage(),
                    run.error_message.as_deref().unwrap_or("-"),
                );
            }
        }
        Command::Watermark { table, direction } => {
            let direction = parse_direction(&direction)?;
            let repository = SyncRunRepository::new(db);
            let watermark = WatermarkResolver::new(&repository)
                .resolve(&table, direction)
                .await?;
            println!("{watermark}");
        }
    }

    Ok(())
}
