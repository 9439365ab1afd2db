//! Attribute format validation over the patient data table.
//!
//! Each attribute row is checked against the format rule its catalog entry
//! declares: integer fields must hold an optionally-signed digit string,
//! date fields must be YYYY/MM/DD, and single-choice fields must hold the
//! integer index of the chosen option. Rows that fail their rule are
//! marked deleted (`del_flag = 1`) in one transaction; rows with no
//! catalog entry, no value, or no rule for their type pass untouched.

use std::sync::Arc;

use tracing::{info, warn};

use crate::db::Store;
use crate::error::Result;
use crate::model::ValidateStats;

/// Catalog marker for single-choice fields.
const SINGLE_CHOICE: &str = "single";

pub struct ValidateJob {
    store: Arc<Store>,
}

impl ValidateJob {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Blocking entry point for the validation job.
    pub async fn run(&self) -> Result<ValidateStats> {
        let rows = self.store.attribute_audit_rows().await?;
        info!(count = rows.len(), "attribute rows loaded for validation");

        let mut invalid = Vec::new();
        for row in &rows {
            let Some(value) = row.value.as_deref() else {
                continue;
            };
            if !value_matches_rule(value, row.value_type, row.is_multi_choice.as_deref()) {
                warn!(
                    p_id = %row.p_id,
                    field_id = %row.field_id,
                    value,
                    value_type = row.value_type,
                    "attribute value fails its format rule"
                );
                invalid.push((row.p_id.clone(), row.field_id.clone()));
            }
        }

        let flagged = if invalid.is_empty() {
            0
        } else {
            self.store.flag_attributes_deleted(&invalid).await?
        };
        info!(checked = rows.len(), flagged, "attribute validation finished");
        Ok(ValidateStats {
            checked: rows.len(),
            flagged,
        })
    }
}

/// Apply the catalog rule for one value. Types without a rule, and rows
/// with no catalog entry at all, are always valid.
fn value_matches_rule(value: &str, value_type: Option<i32>, multi_choice: Option<&str>) -> bool {
    match value_type {
        Some(4) if multi_choice == Some(SINGLE_CHOICE) => is_integer(value),
        Some(3) => is_slash_date(value),
        Some(1) => is_integer(value),
        _ => true,
    }
}

/// Optionally-signed run of ASCII digits, nothing else.
fn is_integer(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Exactly YYYY/MM/DD: ten bytes, slashes at 4 and 7, digits elsewhere.
/// Component ranges are not checked.
fn is_slash_date(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 10
        && b[4] == b'/'
        && b[7] == b'/'
        && b.iter()
            .enumerate()
            .all(|(i, c)| i == 4 || i == 7 || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_rule_accepts_signed_digit_runs() {
        assert!(is_integer("42"));
        assert!(is_integer("-7"));
        assert!(!is_integer(""));
        assert!(!is_integer("-"));
        assert!(!is_integer("4x"));
        assert!(!is_integer("4.2"));
    }

    #[test]
    fn date_rule_accepts_slash_dates_only() {
        assert!(is_slash_date("2026/01/02"));
        assert!(!is_slash_date("2026-01-02"));
        assert!(!is_slash_date("26/01/02"));
        assert!(!is_slash_date("2026/1/2"));
        assert!(!is_slash_date("2026/01/02 "));
    }

    #[test]
    fn rules_are_selected_by_type_and_choice_marker() {
        // value_type 1: integer.
        assert!(value_matches_rule("3", Some(1), None));
        assert!(!value_matches_rule("three", Some(1), None));
        // value_type 3: slash date.
        assert!(value_matches_rule("2026/01/02", Some(3), None));
        assert!(!value_matches_rule("soon", Some(3), None));
        // value_type 4 is only ruled when the field is single-choice.
        assert!(!value_matches_rule("maybe", Some(4), Some(SINGLE_CHOICE)));
        assert!(value_matches_rule("2", Some(4), Some(SINGLE_CHOICE)));
        assert!(value_matches_rule("maybe", Some(4), Some("multi")));
        assert!(value_matches_rule("maybe", Some(4), None));
        // No catalog entry, or a type without a rule: always valid.
        assert!(value_matches_rule("anything", None, None));
        assert!(value_matches_rule("anything", Some(2), None));
    }
}
