//! Operator tool for the replay archive.
//!
//! Lists replayable batches, replays one under a fresh batch id, or marks
//! one non-replayable. Talks straight to the pipeline's Postgres ports;
//! `DATABASE_URL` must point at the valuation database.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::PgPool;
use uuid::Uuid;

use gridiron_pipeline::archive::ReplayArchive;
use gridiron_pipeline::config::PipelineConfig;
use gridiron_pipeline::store::postgres::PgArchiveStore;

#[derive(Parser)]
#[command(name = "replay_admin", about = "Replay archive administration")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List batches still eligible for replay, newest first.
    List,
    /// Re-ingest an archived batch under a new batch id.
    Replay {
        /// Batch id of the archived ingestion.
        batch_id: Uuid,
    },
    /// Permanently mark a batch non-replayable.
    Disable {
        batch_id: Uuid,
        /// Why the batch must not be replayed (recorded in the logs).
        #[arg(long)]
        reason: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = PgPool::connect(&database_url).await?;

    let config = PipelineConfig::from_env();
    let archive = ReplayArchive::new(Arc::new(PgArchiveStore::new(pool)))
        .with_page_size(config.replay_page_size);

    match args.command {
        Command::List => {
            let batches = archive.list_replayable().await?;
            if batches.is_empty() {
                println!("no replayable batches");
                return Ok(());
            }
            println!(
                "{:<38} {:<14} {:<22} {:>6} {:>8} {:>7}",
                "BATCH", "SOURCE", "TABLE", "ROWS", "SIZE", "REPLAYS"
            );
            for batch in batches {
                println!(
                    "{:<38} {:<14} {:<22} {:>6} {:>8} {:>7}",
                    batch.batch_id,
                    batch.source,
                    batch.target_table,
                    batch.row_count,
                    batch.compressed_size,
                    batch.replay_count
                );
            }
        }
        Command::Replay { batch_id } => {
            let receipt = archive.replay(batch_id).await?;
            println!(
                "replayed {} -> {} ({} rows pending)",
                batch_id, receipt.new_batch_id, receipt.rows_processed
            );
        }
        Command::Disable { batch_id, reason } => {
            archive.mark_non_replayable(batch_id, &reason).await?;
            println!("batch {batch_id} marked non-replayable");
        }
    }

    Ok(())
}
