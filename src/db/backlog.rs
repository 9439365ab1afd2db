//! Backlog queries: stage backlog, indicator batches, candidate catalogs.
//!
//! Each reader materializes the full ordered row set before the pool fans
//! it out. A row that fails to decode aborts the whole read — no partial
//! backlog is ever handed to the pool. An empty result set is not an error.

use crate::error::Result;
use crate::model::{BacklogItem, Indicator};

/// Shared SELECT list: natural key plus the concatenated narrative handed
/// to the workflow as its query text.
const BACKLOG_COLUMNS: &str = "encounter_id, person_id, patient_id, CONCAT_WS('; ',
    'patient name: ' || patient_name,
    'gender: ' || gender_name,
    'age: ' || age,
    'department: ' || department_name,
    'document name: ' || document_name,
    'document content: ' || COALESCE(document_content_txt, 'no text content'),
    'diagnosis: ' || COALESCE(diag_name, 'no diagnosis')
) AS content";

impl super::Store {
    /// Documents with no assigned stage yet.
    pub async fn stage_backlog(&self) -> Result<Vec<BacklogItem>> {
        let sql = format!(
            "SELECT {BACKLOG_COLUMNS}
             FROM dc_mr_document_index_outpat
             WHERE deleted_flag IS NULL
             ORDER BY encounter_id"
        );
        let items = sqlx::query_as(&sql).fetch_all(self.pool()).await?;
        Ok(items)
    }

    /// Documents assigned to one indicator batch (`deleted_flag = batch`,
    /// batch in 1..=6).
    pub async fn indicator_backlog(&self, batch: i32) -> Result<Vec<BacklogItem>> {
        let sql = format!(
            "SELECT {BACKLOG_COLUMNS}
             FROM dc_mr_document_index_outpat
             WHERE deleted_flag = $1
             ORDER BY encounter_id"
        );
        let items = sqlx::query_as(&sql).bind(batch).fetch_all(self.pool()).await?;
        Ok(items)
    }

    /// Candidate indicator catalog for one batch. Values are NULL here;
    /// the workflow fills them in its response.
    pub async fn candidate_indicators(&self, batch: i32) -> Result<Vec<Indicator>> {
        let candidates = sqlx::query_as(
            "SELECT id AS code, name, NULL::text AS value, alias AS value_explain
             FROM t_model_view
             WHERE batch_no = $1
             ORDER BY id",
        )
        .bind(batch)
        .fetch_all(self.pool())
        .await?;
        Ok(candidates)
    }
}
