//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3       | Universal        | File read/write error                    |
//! | 60-69   | recon            | Reconciliation aborts and checks         |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use catalink_recon::ReconError;

// =============================================================================
// Universal (0-3)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

/// Input could not be read or output could not be written.
pub const EXIT_IO: u8 = 3;

// =============================================================================
// Recon (60-69)
// =============================================================================

/// An external ID would be bound to two local IDs, or a catalogued row
/// disagrees with the catalog. Output is not written.
pub const EXIT_RECON_CONFLICT: u8 = 60;

/// A row needs a new local ID and none can be allocated (empty catalog,
/// non-numeric or exhausted ID suffix).
pub const EXIT_RECON_PREREQUISITE: u8 = 61;

/// Config file missing required values or failing validation.
pub const EXIT_RECON_CONFIG: u8 = 62;

/// Knowledge base or geocoder unreachable after retries.
pub const EXIT_RECON_LOOKUP: u8 = 63;

/// `check` found uniqueness violations.
pub const EXIT_RECON_INVARIANT: u8 = 64;

// =============================================================================
// Recon Error Types
// =============================================================================

/// Map a ReconError to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ExternalIdConflict { .. } | ReconError::KnownRecordConflict { .. } => {
            EXIT_RECON_CONFLICT
        }
        ReconError::MissingPrerequisite { .. } => EXIT_RECON_PREREQUISITE,
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_RECON_CONFIG,
        ReconError::Lookup { .. } => EXIT_RECON_LOOKUP,
        ReconError::Csv(_) => EXIT_IO,
    }
}

/// Structured error output for an aborted run.
#[derive(Debug, serde::Serialize)]
pub struct ReconErrorOutput {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    pub exit_code: u8,
}

impl ReconErrorOutput {
    pub fn from_recon_error(err: &ReconError) -> Self {
        let error = match err {
            ReconError::ExternalIdConflict { .. } => "external_id_conflict",
            ReconError::KnownRecordConflict { .. } => "known_record_conflict",
            ReconError::MissingPrerequisite { .. } => "missing_prerequisite",
            ReconError::Lookup { .. } => "lookup_failed",
            ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => "invalid_config",
            ReconError::Csv(_) => "csv",
        };

        Self {
            error,
            message: err.to_string(),
            row: err.row(),
            exit_code: recon_exit_code(err),
        }
    }

    /// Print error to stderr (human-readable by default).
    pub fn print(&self, json: bool) {
        if json {
            if let Ok(output) = serde_json::to_string(self) {
                eprintln!("{}", output);
            }
        } else {
            eprintln!("error: {}", self.message);
        }
    }
}
