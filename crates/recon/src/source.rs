use crate::error::ReconError;
use crate::model::RawGrid;

/// A workbook the engine can read sheets from.
///
/// The io crate implements this over xlsx files; tests use [`MemorySource`].
pub trait GridSource {
    /// Path or display name. Export logs carry their `YYYY_MM` token here.
    fn name(&self) -> &str;

    /// Sheet names in workbook order.
    fn sheet_names(&self) -> Vec<String>;

    /// Load one sheet verbatim, row 0 being the sheet's first row.
    fn read_grid(&mut self, sheet: &str) -> Result<RawGrid, ReconError>;
}

/// In-memory workbook.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    name: String,
    sheets: Vec<(String, RawGrid)>,
    reads: usize,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>, grid: RawGrid) -> Self {
        self.sheets.push((sheet.into(), grid));
        self
    }

    /// Number of successful `read_grid` calls so far.
    pub fn reads(&self) -> usize {
        self.reads
    }
}

impl GridSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(n, _)| n.clone()).collect()
    }

    fn read_grid(&mut self, sheet: &str) -> Result<RawGrid, ReconError> {
        let grid = self
            .sheets
            .iter()
            .find(|(n, _)| n == sheet)
            .map(|(_, g)| g.clone())
            .ok_or_else(|| ReconError::UnreadableFile {
                path: self.name.clone(),
                message: format!("no sheet named '{sheet}'"),
            })?;
        self.reads += 1;
        Ok(grid)
    }
}
