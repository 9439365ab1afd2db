//! Attribute audit reads and delete-flagging for the validation sweep.

use crate::error::{Error, Result};
use crate::model::AttributeRow;

impl super::Store {
    /// Every attribute row joined with its catalog rule. Rows whose
    /// field_id has no catalog entry come back with no rule and are
    /// treated as valid.
    pub async fn attribute_audit_rows(&self) -> Result<Vec<AttributeRow>> {
        let rows = sqlx::query_as(
            "SELECT t.p_id, t.field_id, t.value, m.value_type, m.is_multi_choice
             FROM t_patient_data t
             LEFT JOIN t_model_view m ON t.field_id = m.id",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Mark the given (p_id, field_id) attribute rows deleted, all inside
    /// one transaction. Returns the number of rows flagged.
    pub async fn flag_attributes_deleted(&self, keys: &[(String, String)]) -> Result<u64> {
        let mut tx = self.pool().begin().await?;
        let mut flagged = 0;
        for (p_id, field_id) in keys {
            flagged += sqlx::query(
                "UPDATE t_patient_data SET del_flag = 1
                 WHERE p_id = $1 AND field_id = $2",
            )
            .bind(p_id)
            .bind(field_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        }
        tx.commit()
            .await
            .map_err(|e| Error::Transaction(e.to_string()))?;
        Ok(flagged)
    }
}
