//! chartmill CLI — operator interface to the enrichment job host.

use std::sync::Arc;

use chartmill::config::Config;
use chartmill::db::{LogStore, Store};
use chartmill::engine::{
    DedupeSweeper, IndicatorJob, StageJob, ValidateJob, indicators::BATCH_RANGE, spawn_supervised,
};
use chartmill::enrich::DifyClient;
use chartmill::model::RunStats;
use chartmill::telemetry::init_logging;
use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "chartmill", about = "Maintenance and enrichment job host")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Classify visit stages for the unprocessed document backlog
    Stage,
    /// Extract indicator values for flagged document batches
    Indicators {
        /// Run a single batch index instead of all of 1..=6
        #[arg(long)]
        batch: Option<i32>,
    },
    /// Flag attribute rows whose values violate their catalog format rules
    Validate,
    /// Delete duplicate task-definition log rows, keeping the newest per key
    Sweep,
    /// Run stage, indicators, and validate in sequence as supervised tasks
    All,
    /// Check connectivity to both stores
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_logging(&config.log_level);

    // One shared cancellation signal; Ctrl-C flips it and every worker
    // observes it at its next select point.
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        ctrl_c_cancel.cancel();
    });

    match cli.command {
        Command::Stage => {
            let store = connect_store(&config).await?;
            let client = Arc::new(DifyClient::new(config.dify.clone(), cancel.clone())?);
            let job = StageJob::new(store, client, config.worker_count, cancel);
            print_stats("stage", job.run().await?);
        }
        Command::Indicators { batch } => {
            if let Some(batch) = batch
                && !BATCH_RANGE.contains(&batch)
            {
                anyhow::bail!("batch must be in {BATCH_RANGE:?}, got {batch}");
            }
            let store = connect_store(&config).await?;
            let client = Arc::new(DifyClient::new(config.dify.clone(), cancel.clone())?);
            let job = IndicatorJob::new(store, client, config.worker_count, cancel);
            let stats = match batch {
                Some(batch) => job.run_batch(batch).await?,
                None => job.run().await?,
            };
            print_stats("indicators", stats);
        }
        Command::Validate => {
            let store = connect_store(&config).await?;
            let stats = ValidateJob::new(store).run().await?;
            println!(
                "validate: {} row(s) checked, {} flagged deleted",
                stats.checked, stats.flagged
            );
        }
        Command::All => {
            let store = connect_store(&config).await?;
            let client = Arc::new(DifyClient::new(config.dify.clone(), cancel.clone())?);

            // Jobs run in sequence (indicators consume the flags stage
            // assigns); a failed job is logged by its supervisor and does
            // not stop the later ones.
            let stage = StageJob::new(
                Arc::clone(&store),
                Arc::clone(&client),
                config.worker_count,
                cancel.clone(),
            );
            spawn_supervised("stage", async move { stage.run().await }).await?;

            let indicators =
                IndicatorJob::new(Arc::clone(&store), client, config.worker_count, cancel.clone());
            spawn_supervised("indicators", async move { indicators.run().await }).await?;

            let validate = ValidateJob::new(store);
            spawn_supervised("validate", async move { validate.run().await }).await?;

            println!("all: jobs finished, per-job stats in the log");
        }
        Command::Sweep => {
            let store = LogStore::connect(config.sweep_database_url.expose_secret()).await?;
            let sweeper = DedupeSweeper::new(Arc::new(store));
            let stats = sweeper.sweep().await?;
            println!(
                "sweep: {} duplicate group(s), {} row(s) deleted",
                stats.groups, stats.deleted
            );
        }
        Command::Health => {
            let store = connect_store(&config).await?;
            store.health_check().await?;
            println!("document store: ok");
            let log = LogStore::connect(config.sweep_database_url.expose_secret()).await?;
            log.health_check().await?;
            println!("scheduler log: ok");
        }
    }

    Ok(())
}

async fn connect_store(config: &Config) -> anyhow::Result<Arc<Store>> {
    let store = Store::connect(config.database_url.expose_secret(), config.worker_count).await?;
    Ok(Arc::new(store))
}

fn print_stats(job: &str, stats: RunStats) {
    println!(
        "{job}: {} attempted, {} succeeded, {} failed",
        stats.attempted, stats.succeeded, stats.failed
    );
}
