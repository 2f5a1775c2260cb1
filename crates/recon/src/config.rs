use serde::{Deserialize, Serialize};

use crate::error::ReconError;
use crate::model::Field;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Declarative description of both tables and the update policy.
///
/// Every section is optional in TOML; missing sections fall back to the
/// built-in tables (see [`SyncConfig::default`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub header: HeaderSearch,
    pub policy: PolicyConfig,
    pub destination: TableSpec,
    pub export: TableSpec,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            header: HeaderSearch::default(),
            policy: PolicyConfig::default(),
            destination: TableSpec {
                sheet: Some("BBDD".into()),
                header_row: None,
                header_tokens: strings(&["Contenedor", "Placa 2", "Hr salida QP", "Fecha"]),
                fields: FieldTable {
                    container: Some(FieldSpec::required(&["Contenedor"])),
                    plate: Some(FieldSpec::required(&["Placa 2"])),
                    time: Some(FieldSpec::required(&["Hr salida QP"])),
                    date: Some(FieldSpec::required(&["Fecha"])),
                },
            },
            export: TableSpec {
                sheet: None,
                header_row: None,
                header_tokens: strings(&["NUMERO CONTENEDOR", "PLACA DE CARRETA", "HORA DE SALIDA"]),
                fields: FieldTable {
                    container: Some(FieldSpec::required(&[
                        "NUMERO CONTENEDOR",
                        "CONTENEDOR",
                        "CONTAINER",
                        "NUMERO CONTENEDO",
                    ])),
                    plate: Some(FieldSpec::required(&[
                        "PLACA DE CARRETA",
                        "PLACA+CARRETA",
                        "PLACA DE CARRET",
                    ])),
                    time: Some(FieldSpec::required(&["HORA DE SALIDA", "HORA+SALIDA"])),
                    date: None,
                },
            },
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Header search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPolicy {
    /// Every token must be present verbatim as a full cell value.
    #[default]
    Strict,
    /// Enough tokens must appear as substrings of some cell in the row.
    Fuzzy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderSearch {
    pub policy: HeaderPolicy,
    /// Number of leading rows scanned for the header.
    pub max_rows: usize,
    /// Minimum share of tokens a row must hit under the fuzzy policy.
    pub min_ratio: f64,
}

impl Default for HeaderSearch {
    fn default() -> Self {
        Self {
            policy: HeaderPolicy::Strict,
            max_rows: 20,
            min_ratio: 0.6,
        }
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Only fill time cells that are blank (or NAN/NONE/NULL).
    #[default]
    BlankOnly,
    /// Also replace a populated time when the export log disagrees.
    IfDifferent,
}

impl std::fmt::Display for OverwritePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankOnly => write!(f, "blank_only"),
            Self::IfDifferent => write!(f, "if_different"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub overwrite: OverwritePolicy,
    /// Match destination records without a container on plate alone.
    pub container_fallback: bool,
    /// Abort the remaining days after the first failing day.
    pub fail_fast: bool,
    /// How text dates like `05/06/2025` in the destination are read.
    pub date_order: DateOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    #[default]
    DayFirst,
    MonthFirst,
}

// ---------------------------------------------------------------------------
// Tables + fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Sheet to read. Export logs pick their sheet from the day selector instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    /// Pinned 1-based header row; skips header discovery when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_row: Option<usize>,
    #[serde(default)]
    pub header_tokens: Vec<String>,
    pub fields: FieldTable,
}

impl TableSpec {
    /// 0-based pinned header row.
    pub fn pinned_header_row(&self) -> Option<usize> {
        self.header_row.map(|r| r.saturating_sub(1))
    }
}

/// Synonym lists per logical field. Absent fields are never resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<FieldSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<FieldSpec>,
}

impl FieldTable {
    pub fn get(&self, field: Field) -> Option<&FieldSpec> {
        match field {
            Field::Container => self.container.as_ref(),
            Field::Plate => self.plate.as_ref(),
            Field::Time => self.time.as_ref(),
            Field::Date => self.date.as_ref(),
        }
    }
}

/// Ordered label synonyms for one field. `A+B` means "contains A and B".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub synonyms: Vec<String>,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl FieldSpec {
    pub fn required(synonyms: &[&str]) -> Self {
        Self {
            synonyms: strings(synonyms),
            required: true,
        }
    }

    pub fn optional(synonyms: &[&str]) -> Self {
        Self {
            synonyms: strings(synonyms),
            required: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl SyncConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: SyncConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ReconError> {
        toml::to_string_pretty(self).map_err(|e| ReconError::ConfigParse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        if self.header.max_rows == 0 {
            return Err(ReconError::ConfigValidation(
                "header.max_rows must be at least 1".into(),
            ));
        }
        if !(self.header.min_ratio > 0.0 && self.header.min_ratio <= 1.0) {
            return Err(ReconError::ConfigValidation(format!(
                "header.min_ratio must be in (0, 1], got {}",
                self.header.min_ratio
            )));
        }

        validate_table("destination", &self.destination)?;
        validate_table("export", &self.export)?;

        // Plate, time and date drive every destination update
        for field in [Field::Plate, Field::Time, Field::Date] {
            require_field("destination", &self.destination, field)?;
        }
        if self.destination.fields.container.is_none() {
            return Err(ReconError::ConfigValidation(
                "destination: field 'container' must be configured (mark it required = false to make it optional)".into(),
            ));
        }
        for field in [Field::Container, Field::Plate, Field::Time] {
            require_field("export", &self.export, field)?;
        }

        Ok(())
    }
}

fn validate_table(table: &str, spec: &TableSpec) -> Result<(), ReconError> {
    if spec.header_row.is_none() && spec.header_tokens.is_empty() {
        return Err(ReconError::ConfigValidation(format!(
            "{table}: header_tokens cannot be empty unless header_row is set"
        )));
    }
    if spec.header_row == Some(0) {
        return Err(ReconError::ConfigValidation(format!(
            "{table}: header_row is 1-based"
        )));
    }
    if spec.header_tokens.iter().any(|t| t.trim().is_empty()) {
        return Err(ReconError::ConfigValidation(format!(
            "{table}: header_tokens cannot contain blank entries"
        )));
    }
    for field in Field::ALL {
        if let Some(fs) = spec.fields.get(field) {
            if fs.synonyms.is_empty() || fs.synonyms.iter().any(|s| s.trim().is_empty()) {
                return Err(ReconError::ConfigValidation(format!(
                    "{table}: field '{field}' needs at least one non-blank synonym"
                )));
            }
        }
    }
    Ok(())
}

fn require_field(table: &str, spec: &TableSpec, field: Field) -> Result<(), ReconError> {
    match spec.fields.get(field) {
        Some(fs) if fs.required => Ok(()),
        Some(_) => Err(ReconError::ConfigValidation(format!(
            "{table}: field '{field}' cannot be optional"
        ))),
        None => Err(ReconError::ConfigValidation(format!(
            "{table}: field '{field}' must be configured"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
