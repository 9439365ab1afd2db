//! Job engines: enrichment runs and the dedupe sweep.

pub mod indicators;
pub mod pool;
pub mod stage;
pub mod sweep;
pub mod validate;

pub use indicators::IndicatorJob;
pub use pool::{Process, WorkerPool};
pub use stage::StageJob;
pub use sweep::DedupeSweeper;
pub use validate::ValidateJob;

use tracing::{error, info};

use crate::error::Result;

/// Spawn a job with an explicit handle instead of fire-and-forget.
///
/// The caller may await the handle or let it run; either way the outcome
/// lands in the supervisory log with the job's name, elapsed time, and
/// stats.
pub fn spawn_supervised<F, S>(name: &'static str, job: F) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = Result<S>> + Send + 'static,
    S: std::fmt::Debug + Send + 'static,
{
    tokio::spawn(async move {
        let started = std::time::Instant::now();
        match job.await {
            Ok(stats) => info!(
                job = name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                stats = ?stats,
                "job finished"
            ),
            Err(e) => error!(job = name, error = %e, "job failed"),
        }
    })
}
