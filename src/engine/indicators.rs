//! Indicator extraction run: six flag batches, chunked candidate catalogs.
//!
//! Each batch index selects both a document backlog (`deleted_flag =
//! batch`) and a candidate indicator catalog. Candidates are sent to the
//! workflow in chunks of 50 alongside the document text; validated results
//! replace the document's attribute rows.

use std::ops::RangeInclusive;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::db::Store;
use crate::engine::pool::{Process, WorkerPool};
use crate::enrich::DifyClient;
use crate::error::Result;
use crate::model::{BacklogItem, RunStats};

/// Batch indices recognized in the document flag column.
pub const BATCH_RANGE: RangeInclusive<i32> = 1..=6;

/// Candidates per workflow request.
const CANDIDATE_CHUNK: usize = 50;

pub struct IndicatorJob {
    store: Arc<Store>,
    client: Arc<DifyClient>,
    pool: WorkerPool,
}

impl IndicatorJob {
    pub fn new(
        store: Arc<Store>,
        client: Arc<DifyClient>,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            client,
            pool: WorkerPool::new(workers, cancel),
        }
    }

    /// Run every batch in order. A batch whose backlog cannot be read
    /// aborts the remaining batches; item-level failures do not.
    pub async fn run(&self) -> Result<RunStats> {
        let mut total = RunStats::default();
        for batch in BATCH_RANGE {
            total.merge(self.run_batch(batch).await?);
        }
        Ok(total)
    }

    /// Run a single batch index.
    pub async fn run_batch(&self, batch: i32) -> Result<RunStats> {
        let items = self.store.indicator_backlog(batch).await?;
        info!(batch, count = items.len(), "indicator backlog loaded");
        if items.is_empty() {
            return Ok(RunStats::default());
        }

        let processor = Arc::new(IndicatorProcessor {
            store: Arc::clone(&self.store),
            client: Arc::clone(&self.client),
            batch,
        });
        let stats = self.pool.run(items, processor).await;
        info!(
            batch,
            attempted = stats.attempted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "indicator batch finished"
        );
        Ok(stats)
    }
}

struct IndicatorProcessor {
    store: Arc<Store>,
    client: Arc<DifyClient>,
    batch: i32,
}

#[async_trait]
impl Process for IndicatorProcessor {
    type Item = BacklogItem;

    async fn process(&self, worker_id: usize, item: BacklogItem) -> Result<()> {
        let candidates = self.store.candidate_indicators(self.batch).await?;
        debug!(
            worker_id,
            key = %item.key,
            candidates = candidates.len(),
            "extracting indicators"
        );
        for chunk in candidates.chunks(CANDIDATE_CHUNK) {
            let extracted = self.client.extract_indicators(&item.content, chunk).await?;
            self.store.replace_attributes(&item.key, &extracted).await?;
        }
        Ok(())
    }
}
