//! Stage classification run over the outpatient document backlog.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::db::Store;
use crate::engine::pool::{Process, WorkerPool};
use crate::enrich::DifyClient;
use crate::error::Result;
use crate::model::{BacklogItem, RunStats};

/// Blocking entry point for the enrichment job: reads every document with
/// no assigned stage, classifies each through the workflow, and writes the
/// stage back.
pub struct StageJob {
    store: Arc<Store>,
    client: Arc<DifyClient>,
    pool: WorkerPool,
}

impl StageJob {
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

    pub async fn run(&self) -> Result<RunStats> {
        let items = self.store.stage_backlog().await?;
        info!(count = items.len(), "stage backlog loaded");
        if items.is_empty() {
            return Ok(RunStats::default());
        }

        let processor = Arc::new(StageProcessor {
            store: Arc::clone(&self.store),
            client: Arc::clone(&self.client),
        });
        let stats = self.pool.run(items, processor).await;
        info!(
            attempted = stats.attempted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            "stage run finished"
        );
        Ok(stats)
    }
}

struct StageProcessor {
    store: Arc<Store>,
    client: Arc<DifyClient>,
}

#[async_trait]
impl Process for StageProcessor {
    type Item = BacklogItem;

    async fn process(&self, worker_id: usize, item: BacklogItem) -> Result<()> {
        debug!(worker_id, key = %item.key, "classifying document");
        let outcome = self.client.classify_stage(&item.content).await?;
        self.store.apply_stage(&item.key, &outcome).await
    }
}
