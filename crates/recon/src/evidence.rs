//! Per-row outcomes, diagnostics, and the run summary.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warning,
}

/// A message about one row, returned to the caller instead of logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub row: usize,
    pub severity: Severity,
    pub message: String,
}

/// What reconciliation did to a row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowOutcome {
    /// `note` was "skip".
    Skipped,
    /// Nothing to change.
    Unchanged,
    /// Known row overwritten from the authoritative catalog.
    SyncedFromCatalog { fields: Vec<Field> },
    /// Supplied external ID; fields filled from the knowledge base.
    FilledFromAuthority { external_id: String, fields: Vec<Field> },
    /// External ID discovered by search.
    Matched { external_id: String, weight: u32, fields: Vec<Field> },
    /// Space coordinate confirmed by the geocoder; no external ID.
    ConfirmedByAddress,
    /// Nothing found in the knowledge base.
    Unmatched,
}

impl RowOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Unchanged => "unchanged",
            Self::SyncedFromCatalog { .. } => "synced_from_catalog",
            Self::FilledFromAuthority { .. } => "filled_from_authority",
            Self::Matched { .. } => "matched",
            Self::ConfirmedByAddress => "confirmed_by_address",
            Self::Unmatched => "unmatched",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowReport {
    pub row: usize,
    #[serde(flatten)]
    pub outcome: RowOutcome,
    /// Local ID assigned during this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocated_id: Option<String>,
    /// Whether the provenance stamp was written.
    pub stamped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total_rows: usize,
    pub skipped: usize,
    pub unchanged: usize,
    pub modified: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub allocated: usize,
    pub outcome_counts: BTreeMap<String, usize>,
}

/// Compute summary statistics from row reports.
pub fn compute_summary(reports: &[RowReport]) -> RunSummary {
    let mut outcome_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut skipped = 0;
    let mut unchanged = 0;
    let mut modified = 0;
    let mut matched = 0;
    let mut unmatched = 0;
    let mut allocated = 0;

    for r in reports {
        *outcome_counts.entry(r.outcome.label().to_string()).or_insert(0) += 1;

        if r.allocated_id.is_some() {
            allocated += 1;
        }
        if r.stamped {
            modified += 1;
        }

        match r.outcome {
            RowOutcome::Skipped => skipped += 1,
            RowOutcome::Unchanged => unchanged += 1,
            RowOutcome::Matched { .. } | RowOutcome::ConfirmedByAddress => matched += 1,
            RowOutcome::Unmatched => unmatched += 1,
            RowOutcome::SyncedFromCatalog { .. } | RowOutcome::FilledFromAuthority { .. } => {}
        }
    }

    RunSummary {
        total_rows: reports.len(),
        skipped,
        unchanged,
        modified,
        matched,
        unmatched,
        allocated,
        outcome_counts,
    }
}
