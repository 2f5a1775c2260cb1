// Persisting a reconciled destination workbook
//
// copy        → <stem>_updated.xlsx next to the destination (always written)
// timestamped → <stem>_updated_YYYYMMDD_HHMMSS.xlsx
// in-place    → patch the updated cells inside the original (only if any)
// both        → in-place + copy

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDateTime;
use salidas_recon::{CellUpdate, RawGrid};
use serde::{Deserialize, Serialize};

use crate::patch::patch_cells;
use crate::xlsx::write_grid;

/// Where reconciled values end up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Values-only copy next to the destination
    #[default]
    Copy,
    /// Copy with a timestamp in the name; earlier runs are never overwritten
    Timestamped,
    /// Patch the original workbook, keeping its formatting
    InPlace,
    Both,
}

impl OutputMode {
    pub fn writes_copy(self) -> bool {
        matches!(self, OutputMode::Copy | OutputMode::Timestamped | OutputMode::Both)
    }

    pub fn patches_original(self) -> bool {
        matches!(self, OutputMode::InPlace | OutputMode::Both)
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputMode::Copy => "copy",
            OutputMode::Timestamped => "timestamped",
            OutputMode::InPlace => "in-place",
            OutputMode::Both => "both",
        };
        f.write_str(s)
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "copy" => Ok(OutputMode::Copy),
            "timestamped" => Ok(OutputMode::Timestamped),
            "in-place" | "inplace" | "in_place" => Ok(OutputMode::InPlace),
            "both" => Ok(OutputMode::Both),
            other => Err(format!(
                "unknown output mode '{}' (expected copy, timestamped, in-place or both)",
                other
            )),
        }
    }
}

/// `<dir>/<stem>_updated.xlsx`
pub fn copy_path(destination: &Path) -> PathBuf {
    sibling(destination, "_updated")
}

/// `<dir>/<stem>_updated_YYYYMMDD_HHMMSS.xlsx`
pub fn timestamped_path(destination: &Path, now: NaiveDateTime) -> PathBuf {
    sibling(destination, &format!("_updated_{}", now.format("%Y%m%d_%H%M%S")))
}

fn sibling(destination: &Path, suffix: &str) -> PathBuf {
    let stem = destination
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "destination".to_string());
    destination.with_file_name(format!("{}{}.xlsx", stem, suffix))
}

/// What a persist call wrote.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PersistReport {
    /// Files written or patched, in the order they were touched
    pub paths: Vec<PathBuf>,
    /// True when in-place was requested but skipped for lack of updates
    pub in_place_skipped: bool,
}

/// Write the reconciled destination according to `mode`.
///
/// `grid` is the destination sheet after reconciliation; `updates` are the
/// cells that changed, addressed in the same grid coordinates.
pub fn persist(
    mode: OutputMode,
    destination: &Path,
    sheet: &str,
    grid: &RawGrid,
    updates: &[CellUpdate],
    now: NaiveDateTime,
) -> Result<PersistReport, String> {
    let mut report = PersistReport::default();

    if mode.patches_original() {
        if updates.is_empty() {
            log::info!("no updates; {} left untouched", destination.display());
            report.in_place_skipped = true;
        } else {
            patch_cells(destination, sheet, updates)?;
            log::info!("patched {} cell(s) in {}", updates.len(), destination.display());
            report.paths.push(destination.to_path_buf());
        }
    }

    if mode.writes_copy() {
        let path = match mode {
            OutputMode::Timestamped => timestamped_path(destination, now),
            _ => copy_path(destination),
        };
        let exported = write_grid(&path, sheet, grid)?;
        log::info!("wrote {} ({} cells)", path.display(), exported.cells_exported);
        report.paths.push(path);
    }

    Ok(report)
}
