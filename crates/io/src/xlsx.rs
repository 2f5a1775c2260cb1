// Workbook reading (xlsx, xls, xlsb, ods) into raw grids, and copy export (xlsx only)
//
// Import: sheets are loaded verbatim, no header assumed. Row 0 of a grid is the
//         sheet's first row even when the used range starts further down.
// Export: values only. Formatting of the source workbook is not carried over;
//         use the in-place patcher (patch.rs) when it matters.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook, Worksheet};
use salidas_recon::normalize::excel_serial_to_datetime;
use salidas_recon::{Cell, GridSource, RawGrid, ReconError};

/// An open workbook that hands out raw grids.
pub struct XlsxSource {
    name: String,
    workbook: Sheets<BufReader<File>>,
    sheet_names: Vec<String>,
}

impl XlsxSource {
    pub fn open(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Err(format!("File not found: {}", path.display()));
        }
        let workbook: Sheets<_> = open_workbook_auto(path)
            .map_err(|e| format!("Failed to open Excel file: {}", e))?;
        let sheet_names = workbook.sheet_names().to_vec();
        if sheet_names.is_empty() {
            return Err("Excel file contains no sheets".to_string());
        }

        Ok(Self {
            name: path.display().to_string(),
            workbook,
            sheet_names,
        })
    }
}

impl GridSource for XlsxSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheet_names.clone()
    }

    fn read_grid(&mut self, sheet: &str) -> Result<RawGrid, ReconError> {
        let range = self
            .workbook
            .worksheet_range(sheet)
            .map_err(|e| ReconError::UnreadableFile {
                path: self.name.clone(),
                message: format!("Failed to read sheet '{}': {}", sheet, e),
            })?;
        let grid = range_to_grid(&range);
        log::debug!(
            "{}: sheet '{}' loaded ({} rows x {} cols)",
            self.name,
            sheet,
            grid.height(),
            grid.width()
        );
        Ok(grid)
    }
}

/// Open `path` and read one sheet.
pub fn read_grid(path: &Path, sheet: &str) -> Result<RawGrid, String> {
    let mut source = XlsxSource::open(path)?;
    source.read_grid(sheet).map_err(|e| e.to_string())
}

fn range_to_grid(range: &Range<Data>) -> RawGrid {
    let (height, width) = range.get_size();
    if height == 0 || width == 0 {
        return RawGrid::default();
    }

    // Range start offset (data may not begin at A1)
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let (start_row, start_col) = (start_row as usize, start_col as usize);

    let mut rows: Vec<Vec<Cell>> = vec![Vec::new(); start_row];
    for row in range.rows() {
        let mut cells = vec![Cell::Empty; start_col];
        cells.extend(row.iter().map(data_to_cell));
        // Trailing blanks carry no information
        while cells.last().is_some_and(|c| *c == Cell::Empty) {
            cells.pop();
        }
        rows.push(cells);
    }
    while rows.last().is_some_and(|r| r.is_empty()) {
        rows.pop();
    }
    RawGrid::new(rows)
}

fn data_to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) if s.is_empty() => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(n) => Cell::Number(*n),
        Data::Int(n) => Cell::Number(*n as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::Error(e) => Cell::Error(e.to_string()),
        Data::DateTime(dt) => {
            // Assumes the 1900 date system (most common)
            let serial = dt.as_f64();
            if (0.0..1.0).contains(&serial) {
                match excel_serial_to_datetime(serial) {
                    Some(dt) => Cell::Time(dt.time()),
                    None => Cell::Number(serial),
                }
            } else {
                match excel_serial_to_datetime(serial) {
                    Some(dt) => Cell::DateTime(dt),
                    None => Cell::Number(serial),
                }
            }
        }
        // ISO strings stay text; the normalizers parse them
        Data::DateTimeIso(s) => Cell::Text(s.clone()),
        Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Statistics for a copy export.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExportResult {
    pub cells_exported: usize,
    pub dates_exported: usize,
}

/// Write `grid` as the only sheet of a new workbook at `path`.
///
/// Cell types are kept: text as strings, numbers as numbers, date-times and
/// times as serials with a date/time number format.
pub fn write_grid(path: &Path, sheet_name: &str, grid: &RawGrid) -> Result<ExportResult, String> {
    let mut result = ExportResult::default();
    let mut xlsx_workbook = XlsxWorkbook::new();

    let worksheet = xlsx_workbook
        .add_worksheet()
        .set_name(sheet_name)
        .map_err(|e| format!("Failed to create sheet '{}': {}", sheet_name, e))?;

    let formats = DateFormats::new();
    for (row, cells) in grid.rows().iter().enumerate() {
        for (col, cell) in cells.iter().enumerate() {
            if write_cell(worksheet, row, col, cell, &formats)? {
                result.cells_exported += 1;
                if matches!(cell, Cell::DateTime(_) | Cell::Time(_)) {
                    result.dates_exported += 1;
                }
            }
        }
    }

    xlsx_workbook
        .save(path)
        .map_err(|e| format!("Failed to save XLSX file: {}", e))?;

    log::debug!("wrote {} cells to {}", result.cells_exported, path.display());
    Ok(result)
}

struct DateFormats {
    date: Format,
    datetime: Format,
    time: Format,
    time_seconds: Format,
}

impl DateFormats {
    fn new() -> Self {
        Self {
            date: Format::new().set_num_format("yyyy-mm-dd"),
            datetime: Format::new().set_num_format("yyyy-mm-dd hh:mm:ss"),
            time: Format::new().set_num_format("hh:mm"),
            time_seconds: Format::new().set_num_format("hh:mm:ss"),
        }
    }
}

/// Returns false for empty cells (nothing written).
fn write_cell(
    worksheet: &mut Worksheet,
    row: usize,
    col: usize,
    cell: &Cell,
    formats: &DateFormats,
) -> Result<bool, String> {
    let row32 = row as u32;
    let col16 = col as u16;
    let written = match cell {
        Cell::Empty => return Ok(false),
        Cell::Text(s) => worksheet.write_string(row32, col16, s).map(|_| ()),
        Cell::Error(e) => worksheet.write_string(row32, col16, e).map(|_| ()),
        Cell::Number(n) => worksheet.write_number(row32, col16, *n).map(|_| ()),
        Cell::Bool(b) => worksheet.write_boolean(row32, col16, *b).map(|_| ()),
        Cell::DateTime(dt) => {
            let format = if dt.time() == NaiveTime::MIN {
                &formats.date
            } else {
                &formats.datetime
            };
            worksheet
                .write_number_with_format(row32, col16, datetime_to_serial(*dt), format)
                .map(|_| ())
        }
        Cell::Time(t) => {
            let format = if t.second() == 0 {
                &formats.time
            } else {
                &formats.time_seconds
            };
            worksheet
                .write_number_with_format(row32, col16, time_to_serial(*t), format)
                .map(|_| ())
        }
    };
    written.map_err(|e| format!("Failed to write cell ({}, {}): {}", row, col, e))?;
    Ok(true)
}

fn excel_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .unwrap_or_default()
        .and_time(NaiveTime::MIN)
}

fn datetime_to_serial(dt: NaiveDateTime) -> f64 {
    (dt - excel_epoch()).num_seconds() as f64 / 86_400.0
}

fn time_to_serial(t: NaiveTime) -> f64 {
    t.num_seconds_from_midnight() as f64 / 86_400.0
}
