//! Duplicate elimination over the scheduler task-definition log.
//!
//! Rows sharing a (code, version) key should have exactly one live
//! representative: the one with the newest create_time. The whole
//! scan-and-delete runs inside a single transaction so a mid-sweep
//! failure leaves the table unchanged; dropping the transaction without
//! commit rolls everything back. A second run after a successful sweep
//! finds no groups and deletes nothing.

use std::sync::Arc;

use tracing::{debug, info};

use crate::db::LogStore;
use crate::error::{Error, Result};
use crate::model::SweepStats;

pub struct DedupeSweeper {
    store: Arc<LogStore>,
}

impl DedupeSweeper {
    pub fn new(store: Arc<LogStore>) -> Self {
        Self { store }
    }

    /// Blocking entry point for the dedupe job.
    pub async fn sweep(&self) -> Result<SweepStats> {
        let mut tx = self.store.pool().begin().await?;

        let groups: Vec<(i64, i32, i64)> = sqlx::query_as(
            "SELECT code, version, COUNT(1) AS cnt
             FROM t_ds_task_definition_log
             GROUP BY code, version
             HAVING COUNT(1) > 1",
        )
        .fetch_all(&mut *tx)
        .await?;

        let mut stats = SweepStats::default();
        for (code, version, cnt) in groups {
            debug!(code, version, rows = cnt, "duplicate group found");

            // Newest first; id breaks create_time ties deterministically.
            let rows: Vec<(i64, chrono::NaiveDateTime)> = sqlx::query_as(
                "SELECT id, create_time FROM t_ds_task_definition_log
                 WHERE code = ? AND version = ?
                 ORDER BY create_time DESC, id DESC",
            )
            .bind(code)
            .bind(version)
            .fetch_all(&mut *tx)
            .await?;

            let mut rows = rows.into_iter();
            if let Some((id, create_time)) = rows.next() {
                debug!(code, version, id, %create_time, "keeping newest row");
            }
            for (id, _) in rows {
                let deleted = sqlx::query("DELETE FROM t_ds_task_definition_log WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                stats.deleted += deleted;
            }
            stats.groups += 1;
        }

        tx.commit()
            .await
            .map_err(|e| Error::Transaction(e.to_string()))?;

        info!(
            groups = stats.groups,
            deleted = stats.deleted,
            "dedupe sweep committed"
        );
        Ok(stats)
    }
}
