//! Result writes, scoped to one item's natural key.
//!
//! Two write shapes: a single UPDATE for stage outcomes, and a
//! delete-then-insert replace for indicator attributes. The replace pair
//! runs inside one transaction per indicator so a crash cannot leave an
//! attribute value missing. A write error abandons the item; it never
//! halts the pool or touches sibling items.

use tracing::warn;

use crate::error::Result;
use crate::model::{DocumentKey, Indicator, StageOutcome};

impl super::Store {
    /// Apply a stage classification to the row matched by `key`.
    ///
    /// Zero rows affected is logged but not fatal — the row may have been
    /// removed since the backlog was read.
    pub async fn apply_stage(&self, key: &DocumentKey, outcome: &StageOutcome) -> Result<()> {
        let result = sqlx::query(
            "UPDATE dc_mr_document_index_outpat
             SET deleted_flag = $1, patient_external = $2
             WHERE encounter_id = $3 AND person_id = $4 AND patient_id = $5",
        )
        .bind(outcome.visit_number)
        .bind(outcome.gestational_weeks)
        .bind(&key.encounter_id)
        .bind(&key.person_id)
        .bind(&key.patient_id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            warn!(%key, "stage update matched no rows");
        }
        Ok(())
    }

    /// Replace attribute rows for every indicator that came back with a
    /// non-empty value. Indicators with blank values are skipped.
    pub async fn replace_attributes(
        &self,
        key: &DocumentKey,
        indicators: &[Indicator],
    ) -> Result<()> {
        for indicator in indicators {
            let Some(value) = indicator
                .value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
            else {
                continue;
            };

            let mut tx = self.pool().begin().await?;
            sqlx::query(
                "DELETE FROM t_patient_data
                 WHERE p_id = $1 AND v_id = $2 AND field_id = $3",
            )
            .bind(&key.patient_id)
            .bind(&key.encounter_id)
            .bind(&indicator.code)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO t_patient_data (p_id, v_id, field_id, value, source)
                 VALUES ($1, $2, $3, $4, 'dify')",
            )
            .bind(&key.patient_id)
            .bind(&key.encounter_id)
            .bind(&indicator.code)
            .bind(value)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }
        Ok(())
    }
}
