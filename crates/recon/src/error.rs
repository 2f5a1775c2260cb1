use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (empty token set, field without synonyms, etc.).
    ConfigValidation(String),
    /// No row within the search bound carried the required header tokens.
    HeaderNotFound { sheet: String, missing: Vec<String>, searched_rows: usize },
    /// A required logical field has no resolvable column.
    MissingColumn { table: String, field: String, synonyms: Vec<String> },
    /// Year/month token missing or the (y, m, d) triple is not a calendar date.
    InvalidDate(String),
    /// No sheet in the export log matches the requested day.
    SheetNotFound { day: String, available: Vec<String> },
    /// File missing, unopenable, or a sheet that cannot be read at all.
    UnreadableFile { path: String, message: String },
}

impl ReconError {
    /// Whether this error only invalidates a single day of a multi-day run.
    pub fn is_per_day(&self) -> bool {
        matches!(
            self,
            Self::HeaderNotFound { .. }
                | Self::MissingColumn { .. }
                | Self::InvalidDate(_)
                | Self::SheetNotFound { .. }
        )
    }
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::HeaderNotFound { sheet, missing, searched_rows } => {
                write!(
                    f,
                    "sheet '{sheet}': header row not found in the first {searched_rows} rows (missing: {})",
                    missing.join(", ")
                )
            }
            Self::MissingColumn { table, field, synonyms } => {
                write!(
                    f,
                    "{table}: no column for '{field}' (looked for: {})",
                    synonyms.join(", ")
                )
            }
            Self::InvalidDate(msg) => write!(f, "invalid date: {msg}"),
            Self::SheetNotFound { day, available } => {
                write!(
                    f,
                    "no sheet for day '{day}' (available: {})",
                    available.join(", ")
                )
            }
            Self::UnreadableFile { path, message } => {
                write!(f, "cannot read {path}: {message}")
            }
        }
    }
}

impl std::error::Error for ReconError {}
