// User settings
// Loaded from ~/.config/salidas/settings.json

use chrono::{Datelike, NaiveDate};
use salidas_io::OutputMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Export logs are named after the month they cover.
pub const DEFAULT_SOURCE_TEMPLATE: &str = "SALIDA_{year}_{month}.xlsx";

/// Defaults for runs that don't pass explicit paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Master workbook that receives departure times
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,

    /// Directory holding the monthly export logs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_dir: Option<PathBuf>,

    /// Export log file name; `{year}` and `{month}` are substituted
    pub source_template: String,

    pub output_mode: OutputMode,

    /// Sync config (TOML); built-in tables when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            destination: None,
            source_dir: None,
            source_template: DEFAULT_SOURCE_TEMPLATE.to_string(),
            output_mode: OutputMode::Copy,
            config: None,
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("salidas");
        config_dir.join("settings.json")
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("{}; using default settings", e);
                Self::default()
            }
        }
    }

    /// Load settings from a specific file.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {}", path.display(), e))?;

        // Strip comments (lines starting with //)
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        serde_json::from_str(&cleaned)
            .map_err(|e| format!("Error parsing {}: {}", path.display(), e))
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Export log file name for the month of `date`.
    pub fn source_file_name(&self, date: NaiveDate) -> String {
        render_template(&self.source_template, date)
    }

    /// Full export log path for `date`, when a source directory is set.
    pub fn resolve_source_path(&self, date: NaiveDate) -> Option<PathBuf> {
        self.source_dir
            .as_ref()
            .map(|dir| dir.join(self.source_file_name(date)))
    }

    /// Get the config file path for display
    pub fn config_path_display() -> String {
        Self::config_path().to_string_lossy().to_string()
    }
}

/// Substitute `{year}` (4 digits) and `{month}` (2 digits).
pub fn render_template(template: &str, date: NaiveDate) -> String {
    template
        .replace("{year}", &format!("{:04}", date.year()))
        .replace("{month}", &format!("{:02}", date.month()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn may_14() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 14).unwrap()
    }

    #[test]
    fn template_substitution() {
        assert_eq!(render_template(DEFAULT_SOURCE_TEMPLATE, may_14()), "SALIDA_2025_05.xlsx");
        assert_eq!(render_template("log-{month}.xlsx", may_14()), "log-05.xlsx");
    }

    #[test]
    fn source_path_needs_a_directory() {
        let mut settings = Settings::default();
        assert_eq!(settings.resolve_source_path(may_14()), None);

        settings.source_dir = Some(PathBuf::from("/data/salidas"));
        assert_eq!(
            settings.resolve_source_path(may_14()),
            Some(PathBuf::from("/data/salidas/SALIDA_2025_05.xlsx"))
        );
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{
    // scheduled task writes straight into the master
    "destination": "/data/Control.xlsx",
    "output_mode": "in-place"
}"#,
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.destination, Some(PathBuf::from("/data/Control.xlsx")));
        assert_eq!(settings.output_mode, OutputMode::InPlace);
        assert_eq!(settings.source_template, DEFAULT_SOURCE_TEMPLATE);
        assert_eq!(settings.config, None);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            source_dir: Some(PathBuf::from("/data")),
            output_mode: OutputMode::Timestamped,
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path).unwrap(), settings);
    }

    #[test]
    fn bad_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ \"output_mode\": \"sideways\" }").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }
}
