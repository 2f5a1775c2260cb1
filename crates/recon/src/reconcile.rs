use chrono::NaiveDate;

use crate::config::{DateOrder, OverwritePolicy, PolicyConfig};
use crate::lookup::{Lookup, PlateMatch};
use crate::model::{Cell, CellUpdate, DateCoverage, Field, FieldMap, NormalizedKey, ReconcileReport, Table};
use crate::normalize::{identifier_from_cell, is_blank_time, normalize_date_with, normalize_time};

/// Fill departure times in `table` for records dated `target` that match `lookup`.
///
/// Records are judged independently. Running the same pass twice writes
/// nothing the second time: filled cells either fail the blank check or
/// already hold the candidate value.
pub fn reconcile(
    table: &mut Table,
    fields: &FieldMap,
    lookup: &Lookup,
    target: NaiveDate,
    policy: &PolicyConfig,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    let (Some(time_col), Some(plate_col), Some(date_col)) = (
        fields.index(Field::Time),
        fields.index(Field::Plate),
        fields.index(Field::Date),
    ) else {
        log::warn!("{}: time, plate and date columns are needed to reconcile", table.name());
        return report;
    };
    let container_col = fields.index(Field::Container);

    for record in 0..table.record_count() {
        let current = table.get(record, time_col);
        let blank = is_blank_time(current);
        if !blank && policy.overwrite == OverwritePolicy::BlankOnly {
            report.skipped_populated += 1;
            continue;
        }

        let plate = identifier_from_cell(table.get(record, plate_col));
        if plate.is_empty() {
            report.skipped_no_plate += 1;
            continue;
        }
        let container = container_col
            .map(|c| identifier_from_cell(table.get(record, c)))
            .unwrap_or_default();

        match normalize_date_with(table.get(record, date_col), policy.date_order) {
            None => {
                report.skipped_no_date += 1;
                continue;
            }
            Some(date) if date != target => {
                report.skipped_other_date += 1;
                continue;
            }
            Some(_) => {}
        }

        let candidate = if !container.is_empty() {
            lookup.get(&NormalizedKey::new(container, plate))
        } else if policy.container_fallback {
            match lookup.get_by_plate(&plate) {
                PlateMatch::Found(time) => Some(time),
                PlateMatch::Ambiguous => {
                    report.ambiguous += 1;
                    continue;
                }
                PlateMatch::Missing => None,
            }
        } else {
            None
        };

        let Some(candidate) = candidate else {
            report.unmatched += 1;
            continue;
        };

        if !blank && normalize_time(current) == candidate {
            report.skipped_populated += 1;
            continue;
        }

        let value = candidate.to_string();
        table.set(record, time_col, Cell::Text(value.clone()));
        report.updates.push(CellUpdate {
            row: table.grid_row(record),
            col: time_col,
            value,
        });
        report.updated += 1;
    }

    log::debug!(
        "{} @ {target}: updated {}, unmatched {}, ambiguous {}, populated {}, no plate {}, no date {}, other date {}",
        table.name(),
        report.updated,
        report.unmatched,
        report.ambiguous,
        report.skipped_populated,
        report.skipped_no_plate,
        report.skipped_no_date,
        report.skipped_other_date,
    );

    report
}

/// Count how many non-empty records carry a date the date gate can read.
pub fn date_coverage(table: &Table, fields: &FieldMap, order: DateOrder) -> DateCoverage {
    let mut coverage = DateCoverage::default();
    let Some(date_col) = fields.index(Field::Date) else {
        return coverage;
    };

    let width = table.columns().len();
    for record in 0..table.record_count() {
        if (0..width).all(|c| table.get(record, c).is_blank()) {
            continue;
        }
        coverage.records += 1;
        if normalize_date_with(table.get(record, date_col), order).is_some() {
            coverage.parsed += 1;
        } else {
            coverage.unparsed += 1;
        }
    }
    coverage
}
