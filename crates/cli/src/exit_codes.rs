//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scheduled runs rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success (including runs with 0 updates)  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing path) |
//! | 3-9     | sync             | Departure-time sync codes                |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use salidas_recon::ReconError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options or paths.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Sync (3-9)
// =============================================================================

/// Sync config (TOML) failed to parse or validate.
pub const EXIT_SYNC_INVALID_CONFIG: u8 = 3;

/// A workbook could not be opened or read, or the destination sheet has no
/// usable header.
pub const EXIT_SYNC_UNREADABLE: u8 = 4;

/// The run finished but at least one requested day failed
/// (missing sheet, header, column or invalid date). Results of the other
/// days were still persisted.
pub const EXIT_SYNC_DAY_FAILED: u8 = 5;

/// Persisting the result (copy or in-place patch) failed.
pub const EXIT_SYNC_WRITE: u8 = 6;

/// Map a run-aborting engine error to its exit code.
pub fn recon_exit_code(err: &ReconError) -> u8 {
    match err {
        ReconError::ConfigParse(_) | ReconError::ConfigValidation(_) => EXIT_SYNC_INVALID_CONFIG,
        ReconError::UnreadableFile { .. } => EXIT_SYNC_UNREADABLE,
        // Outside a per-day context these mean the destination itself is unusable
        ReconError::HeaderNotFound { .. } | ReconError::MissingColumn { .. } => EXIT_SYNC_UNREADABLE,
        ReconError::InvalidDate(_) | ReconError::SheetNotFound { .. } => EXIT_SYNC_DAY_FAILED,
    }
}
