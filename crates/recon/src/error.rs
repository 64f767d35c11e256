use thiserror::Error;

use crate::index::AllocationError;
use crate::lookup::LookupError;

/// Fatal reconciliation errors. Any of these aborts the whole run; the
/// caller must not persist rows processed before the failure.
#[derive(Debug, Error)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// Config validation error (empty editor, bad tolerance, etc.).
    #[error("config validation error: {0}")]
    ConfigValidation(String),

    /// CSV read/write error.
    #[error("CSV error: {0}")]
    Csv(String),

    /// A new row would bind an external ID already bound to another local ID.
    #[error(
        "row {row}: external ID '{external_id}' is already bound to '{bound_to}' \
         (row local ID: '{local_id}')"
    )]
    ExternalIdConflict {
        row: usize,
        external_id: String,
        bound_to: String,
        local_id: String,
    },

    /// A catalogued row carries an external ID that disagrees with the catalog.
    #[error(
        "row {row}: local ID '{local_id}' has external ID '{local}' but the catalog has '{catalog}'"
    )]
    KnownRecordConflict {
        row: usize,
        local_id: String,
        local: String,
        catalog: String,
    },

    /// No local ID can be allocated for this row.
    #[error("row {row}: cannot allocate a local ID: {source}")]
    MissingPrerequisite {
        row: usize,
        #[source]
        source: AllocationError,
    },

    /// The knowledge base could not be queried for this row.
    #[error("row {row}: lookup failed: {source}")]
    Lookup {
        row: usize,
        #[source]
        source: LookupError,
    },
}

impl ReconError {
    /// 0-based index of the row that aborted the run, if any.
    pub fn row(&self) -> Option<usize> {
        match self {
            Self::ExternalIdConflict { row, .. }
            | Self::KnownRecordConflict { row, .. }
            | Self::MissingPrerequisite { row, .. }
            | Self::Lookup { row, .. } => Some(*row),
            Self::ConfigParse(_) | Self::ConfigValidation(_) | Self::Csv(_) => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ExternalIdConflict { .. } | Self::KnownRecordConflict { .. }
        )
    }
}
