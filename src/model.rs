//! Core data model.
//!
//! A backlog item is one document row needing enrichment: its natural key
//! plus the narrative text sent to the workflow service. Results come back
//! either as a stage classification or as a list of indicator tuples.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Backlog
// ---------------------------------------------------------------------------

/// Natural key of an outpatient document row. Updates and deletes are
/// targeted by this triple, never by a surrogate row id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, sqlx::FromRow)]
pub struct DocumentKey {
    pub encounter_id: String,
    pub person_id: String,
    pub patient_id: String,
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "encounter={} person={} patient={}",
            self.encounter_id, self.person_id, self.patient_id
        )
    }
}

/// One row of the enrichment backlog. Immutable once enqueued; consumed by
/// exactly one pool worker.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BacklogItem {
    #[sqlx(flatten)]
    pub key: DocumentKey,
    /// Concatenated document narrative handed to the workflow as the query.
    pub content: String,
}

// ---------------------------------------------------------------------------
// Enrichment results
// ---------------------------------------------------------------------------

/// Stage classification for one document, as returned by the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub visit_number: i32,
    pub gestational_weeks: i32,
}

/// An indicator tuple. Candidate lists carry `value: None`; the workflow
/// fills values in its response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Indicator {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub value_explain: Option<String>,
}

// ---------------------------------------------------------------------------
// Attribute audit
// ---------------------------------------------------------------------------

/// One attribute row joined with its catalog rule, as read by the
/// validation sweep. A row whose field has no catalog entry carries no
/// rule fields.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttributeRow {
    pub p_id: String,
    pub field_id: String,
    pub value: Option<String>,
    pub value_type: Option<i32>,
    pub is_multi_choice: Option<String>,
}

// ---------------------------------------------------------------------------
// Run accounting
// ---------------------------------------------------------------------------

/// Counters for one engine run. `attempted` counts items pulled from the
/// channel; an item is either succeeded or failed, never both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl RunStats {
    pub fn merge(&mut self, other: RunStats) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }
}

/// Result of one attribute validation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateStats {
    /// Attribute rows examined.
    pub checked: usize,
    /// Rows marked deleted for failing their format rule.
    pub flagged: u64,
}

/// Result of one dedupe sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Duplicate groups visited.
    pub groups: usize,
    /// Physical rows deleted across all groups.
    pub deleted: u64,
}
