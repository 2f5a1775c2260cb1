use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Cells + grids
// ---------------------------------------------------------------------------

/// A single cell value as loaded from a sheet, before any interpretation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
    Error(String),
}

static EMPTY_CELL: Cell = Cell::Empty;

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Empty cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Trimmed display string, used for header labels and identifiers.
    pub fn label(&self) -> String {
        self.to_string().trim().to_string()
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Text(s) => write!(f, "{s}"),
            Self::Number(n) => {
                // Integers without decimals
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            Self::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Self::DateTime(dt) => {
                if dt.time() == NaiveTime::MIN {
                    write!(f, "{}", dt.format("%Y-%m-%d"))
                } else {
                    write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S"))
                }
            }
            Self::Time(t) => {
                if t.second() == 0 {
                    write!(f, "{}", t.format("%H:%M"))
                } else {
                    write!(f, "{}", t.format("%H:%M:%S"))
                }
            }
            Self::Error(e) => write!(f, "{e}"),
        }
    }
}

/// Rows × columns of cells exactly as they sit in the sheet (row 0 = sheet row 1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGrid {
    rows: Vec<Vec<Cell>>,
}

impl RawGrid {
    pub fn new(rows: Vec<Vec<Cell>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    /// Set a cell, growing the grid as needed.
    pub fn set(&mut self, row: usize, col: usize, value: Cell) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize_with(col + 1, Cell::default);
        }
        cells[col] = value;
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// A grid read with a chosen header row. Records are the rows below the header.
///
/// The full grid is kept (including any title rows above the header) so the
/// table can be written back verbatim and record positions map to sheet rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    header_row: usize,
    columns: Vec<String>,
    grid: RawGrid,
}

impl Table {
    pub fn from_grid(name: impl Into<String>, grid: RawGrid, header_row: usize) -> Self {
        let width = grid.width();
        let columns = (0..width)
            .map(|c| grid.cell(header_row, c).label())
            .collect();
        Self {
            name: name.into(),
            header_row,
            columns,
            grid,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header_row(&self) -> usize {
        self.header_row
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn record_count(&self) -> usize {
        self.grid.height().saturating_sub(self.header_row + 1)
    }

    /// Sheet row (0-based) holding the given record.
    pub fn grid_row(&self, record: usize) -> usize {
        self.header_row + 1 + record
    }

    pub fn get(&self, record: usize, col: usize) -> &Cell {
        self.grid.cell(self.grid_row(record), col)
    }

    pub fn set(&mut self, record: usize, col: usize, value: Cell) {
        let row = self.grid_row(record);
        self.grid.set(row, col, value);
    }

    pub fn grid(&self) -> &RawGrid {
        &self.grid
    }

    pub fn into_grid(self) -> RawGrid {
        self.grid
    }
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// Logical fields the pipeline cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Container,
    Plate,
    Time,
    Date,
}

impl Field {
    pub const ALL: [Field; 4] = [Field::Container, Field::Plate, Field::Time, Field::Date];
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Plate => write!(f, "plate"),
            Self::Time => write!(f, "time"),
            Self::Date => write!(f, "date"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedColumn {
    pub index: usize,
    pub label: String,
}

/// Logical field → resolved column for one table. Immutable once built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldMap {
    columns: BTreeMap<Field, ResolvedColumn>,
}

impl FieldMap {
    pub(crate) fn insert(&mut self, field: Field, column: ResolvedColumn) {
        self.columns.insert(field, column);
    }

    pub fn get(&self, field: Field) -> Option<&ResolvedColumn> {
        self.columns.get(&field)
    }

    pub fn index(&self, field: Field) -> Option<usize> {
        self.columns.get(&field).map(|c| c.index)
    }
}

// ---------------------------------------------------------------------------
// Keys + updates
// ---------------------------------------------------------------------------

/// Normalized (container, plate) pair. Both sides are uppercase ASCII alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedKey {
    pub container: String,
    pub plate: String,
}

impl NormalizedKey {
    pub fn new(container: impl Into<String>, plate: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            plate: plate.into(),
        }
    }
}

/// One written cell, addressed by 0-based sheet row/column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellUpdate {
    pub row: usize,
    pub col: usize,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LookupStats {
    pub records: usize,
    pub inserted: usize,
    pub overwritten: usize,
    pub missing_container: usize,
    pub missing_plate: usize,
    pub missing_time: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub updated: usize,
    pub unmatched: usize,
    pub ambiguous: usize,
    pub skipped_populated: usize,
    pub skipped_no_plate: usize,
    pub skipped_no_date: usize,
    pub skipped_other_date: usize,
    #[serde(skip)]
    pub updates: Vec<CellUpdate>,
}

impl ReconcileReport {
    pub fn absorb(&mut self, other: ReconcileReport) {
        self.updated += other.updated;
        self.unmatched += other.unmatched;
        self.ambiguous += other.ambiguous;
        self.skipped_populated += other.skipped_populated;
        self.skipped_no_plate += other.skipped_no_plate;
        self.skipped_no_date += other.skipped_no_date;
        self.skipped_other_date += other.skipped_other_date;
        self.updates.extend(other.updates);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DayStatus {
    Completed,
    Failed { error: String },
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayReport {
    pub day: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    #[serde(flatten)]
    pub status: DayStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lookup: Option<LookupStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconcile: Option<ReconcileReport>,
}

impl DayReport {
    pub fn updated(&self) -> usize {
        self.reconcile.as_ref().map_or(0, |r| r.updated)
    }
}

/// How many destination records carry a parseable date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DateCoverage {
    pub records: usize,
    pub parsed: usize,
    pub unparsed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncMeta {
    pub destination_sheet: String,
    pub export_file: String,
    pub overwrite: String,
    pub engine_version: String,
    pub run_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub meta: SyncMeta,
    pub coverage: DateCoverage,
    pub days: Vec<DayReport>,
    pub total_updated: usize,
    pub failed_days: usize,
    #[serde(skip)]
    pub updates: Vec<CellUpdate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_display_drops_integral_decimals() {
        assert_eq!(Cell::Number(5466947.0).to_string(), "5466947");
        assert_eq!(Cell::Number(0.25).to_string(), "0.25");
    }

    #[test]
    fn grid_set_grows() {
        let mut grid = RawGrid::default();
        grid.set(2, 3, Cell::text("x"));
        assert_eq!(grid.height(), 3);
        assert_eq!(grid.width(), 4);
        assert_eq!(grid.cell(2, 3), &Cell::text("x"));
        assert_eq!(grid.cell(10, 10), &Cell::Empty);
    }

    #[test]
    fn table_records_start_below_header() {
        let grid = RawGrid::new(vec![
            vec![Cell::text("Report title")],
            vec![Cell::text(" Contenedor "), Cell::text("Placa 2")],
            vec![Cell::text("MRKU5466947"), Cell::text("T12345")],
        ]);
        let mut table = Table::from_grid("BBDD", grid, 1);
        assert_eq!(table.columns(), &["Contenedor".to_string(), "Placa 2".to_string()]);
        assert_eq!(table.header_row(), 1);
        assert_eq!(table.record_count(), 1);
        assert_eq!(table.grid_row(0), 2);
        assert_eq!(table.get(0, 1), &Cell::text("T12345"));

        table.set(0, 2, Cell::text("14:05"));
        assert_eq!(table.grid().cell(2, 2), &Cell::text("14:05"));
        // Title row survives untouched
        assert_eq!(table.grid().cell(0, 0), &Cell::text("Report title"));
    }
}
