use crate::cache::{TableCache, TableKey};
use crate::columns::resolve_columns;
use crate::config::{DateOrder, SyncConfig, TableSpec};
use crate::date::{extract_processing_date, resolve_day_sheet};
use crate::error::ReconError;
use crate::header::locate_header;
use crate::lookup::build_lookup;
use crate::model::{
    DateCoverage, DayReport, DayStatus, FieldMap, RawGrid, SyncMeta, SyncResult, Table,
};
use crate::reconcile::{date_coverage, reconcile};
use crate::source::GridSource;

/// The destination sheet, loaded once per run and mutated across all days.
#[derive(Debug, Clone)]
pub struct DestinationTable {
    table: Table,
    fields: FieldMap,
}

impl DestinationTable {
    /// Interpret a destination grid: locate (or use the pinned) header row and
    /// resolve the destination fields. A missing required column is fatal.
    pub fn from_grid(sheet: &str, grid: RawGrid, config: &SyncConfig) -> Result<Self, ReconError> {
        let table = build_table(sheet, grid, &config.destination, config)?;
        let fields = resolve_columns("destination", table.columns(), &config.destination.fields)?;
        Ok(Self { table, fields })
    }

    /// Read the configured destination sheet (or the first sheet) from a workbook.
    pub fn load(source: &mut dyn GridSource, config: &SyncConfig) -> Result<Self, ReconError> {
        let sheets = source.sheet_names();
        let sheet = match &config.destination.sheet {
            Some(name) if sheets.iter().any(|s| s == name) => name.clone(),
            Some(name) => {
                return Err(ReconError::UnreadableFile {
                    path: source.name().to_string(),
                    message: format!("no sheet named '{name}' (available: {})", sheets.join(", ")),
                })
            }
            None => sheets.first().cloned().ok_or_else(|| ReconError::UnreadableFile {
                path: source.name().to_string(),
                message: "workbook has no sheets".into(),
            })?,
        };
        let grid = source.read_grid(&sheet)?;
        Self::from_grid(&sheet, grid, config)
    }

    pub fn sheet(&self) -> &str {
        self.table.name()
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn coverage(&self, order: DateOrder) -> DateCoverage {
        date_coverage(&self.table, &self.fields, order)
    }

    pub fn into_table(self) -> Table {
        self.table
    }
}

fn build_table(
    sheet: &str,
    grid: RawGrid,
    spec: &TableSpec,
    config: &SyncConfig,
) -> Result<Table, ReconError> {
    let header_row = match spec.pinned_header_row() {
        Some(row) => row,
        None => locate_header(&grid, sheet, &spec.header_tokens, &config.header)?,
    };
    Ok(Table::from_grid(sheet, grid, header_row))
}

/// Load one export day-sheet through the cache and resolve its fields.
pub fn load_export_table(
    source: &mut dyn GridSource,
    sheet: &str,
    config: &SyncConfig,
    cache: &mut TableCache,
) -> Result<(Table, FieldMap), ReconError> {
    let key = TableKey::new(source.name(), sheet, config.export.pinned_header_row());
    let table = cache.get_or_load(key, || {
        let grid = source.read_grid(sheet)?;
        build_table(sheet, grid, &config.export, config)
    })?;
    let fields = resolve_columns(
        &format!("export sheet '{sheet}'"),
        table.columns(),
        &config.export.fields,
    )?;
    Ok((table, fields))
}

/// Reconcile `destination` against each requested day of the export log.
///
/// Per-day failures (bad date, missing sheet, header or column) are recorded
/// and the run moves on, unless `policy.fail_fast` is set, in which case the
/// remaining days are skipped. Unreadable files abort the whole run.
pub fn run(
    config: &SyncConfig,
    destination: &mut DestinationTable,
    source: &mut dyn GridSource,
    cache: &mut TableCache,
    days: &[String],
) -> Result<SyncResult, ReconError> {
    let coverage = destination.coverage(config.policy.date_order);
    if coverage.records > 0 && coverage.parsed == 0 {
        log::warn!(
            "none of the {} destination records has a readable date; nothing can match",
            coverage.records
        );
    } else if coverage.unparsed > 0 {
        log::warn!(
            "{} of {} destination records have no readable date and will be skipped",
            coverage.unparsed,
            coverage.records
        );
    }

    let mut result = SyncResult {
        meta: SyncMeta {
            destination_sheet: destination.sheet().to_string(),
            export_file: source.name().to_string(),
            overwrite: config.policy.overwrite.to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            run_at: chrono::Utc::now().to_rfc3339(),
        },
        coverage,
        days: Vec::with_capacity(days.len()),
        total_updated: 0,
        failed_days: 0,
        updates: Vec::new(),
    };

    let mut aborted = false;
    for day in days {
        let mut report = DayReport {
            day: day.clone(),
            date: None,
            sheet: None,
            status: DayStatus::Skipped,
            lookup: None,
            reconcile: None,
        };
        if aborted {
            result.days.push(report);
            continue;
        }

        match process_day(config, destination, source, cache, day, &mut report) {
            Ok(()) => {
                report.status = DayStatus::Completed;
                if let Some(rec) = report.reconcile.as_mut() {
                    result.total_updated += rec.updated;
                    result.updates.append(&mut rec.updates);
                }
            }
            Err(err) if err.is_per_day() => {
                log::warn!("day {day}: {err}");
                report.status = DayStatus::Failed {
                    error: err.to_string(),
                };
                result.failed_days += 1;
                if config.policy.fail_fast {
                    log::warn!("stopping after day {day} (fail_fast)");
                    aborted = true;
                }
            }
            Err(err) => return Err(err),
        }
        result.days.push(report);
    }

    Ok(result)
}

fn process_day(
    config: &SyncConfig,
    destination: &mut DestinationTable,
    source: &mut dyn GridSource,
    cache: &mut TableCache,
    day: &str,
    report: &mut DayReport,
) -> Result<(), ReconError> {
    // Date first: a bad file name or day fails before any sheet is read
    let date = extract_processing_date(source.name(), day)?;
    report.date = Some(date);

    let sheet = resolve_day_sheet(&source.sheet_names(), day)?;
    report.sheet = Some(sheet.clone());

    let (table, fields) = load_export_table(source, &sheet, config, cache)?;
    let lookup = build_lookup(&table, &fields);

    let DestinationTable {
        table: dest,
        fields: dest_fields,
    } = destination;
    let rec = reconcile(dest, dest_fields, &lookup, date, &config.policy);

    log::info!(
        "{date} (sheet '{sheet}'): {} lookup keys, {} updated, {} unmatched",
        lookup.len(),
        rec.updated,
        rec.unmatched
    );

    report.lookup = Some(lookup.stats().clone());
    report.reconcile = Some(rec);
    Ok(())
}
