use std::collections::HashMap;

use crate::model::{Cell, Field, FieldMap, LookupStats, NormalizedKey, Table};
use crate::normalize::{identifier_from_cell, normalize_time};

/// Result of a plate-only probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateMatch<'a> {
    Found(&'a str),
    /// The plate left with more than one distinct time.
    Ambiguous,
    Missing,
}

/// (container, plate) → departure time for one export day-sheet.
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    by_key: HashMap<NormalizedKey, String>,
    // plate → container → time, mirrors `by_key`
    by_plate: HashMap<String, HashMap<String, String>>,
    stats: LookupStats,
}

impl Lookup {
    /// Insert a normalized entry. Later inserts for the same key win.
    /// Returns true when an earlier entry was replaced.
    pub fn insert(&mut self, key: NormalizedKey, time: String) -> bool {
        self.by_plate
            .entry(key.plate.clone())
            .or_default()
            .insert(key.container.clone(), time.clone());
        self.by_key.insert(key, time).is_some()
    }

    pub fn get(&self, key: &NormalizedKey) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }

    /// Probe by plate alone; only unambiguous plates match.
    pub fn get_by_plate(&self, plate: &str) -> PlateMatch<'_> {
        let Some(containers) = self.by_plate.get(plate) else {
            return PlateMatch::Missing;
        };
        let mut times = containers.values();
        let Some(first) = times.next() else {
            return PlateMatch::Missing;
        };
        if times.all(|t| t == first) {
            PlateMatch::Found(first)
        } else {
            PlateMatch::Ambiguous
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn stats(&self) -> &LookupStats {
        &self.stats
    }
}

/// Build the lookup from an export table. Records missing any of container,
/// plate or time are skipped and counted.
pub fn build_lookup(table: &Table, fields: &FieldMap) -> Lookup {
    let container_col = fields.index(Field::Container);
    let plate_col = fields.index(Field::Plate);
    let time_col = fields.index(Field::Time);

    let cell = |record: usize, col: Option<usize>| -> &Cell {
        match col {
            Some(c) => table.get(record, c),
            None => &Cell::Empty,
        }
    };

    let mut lookup = Lookup::default();
    let mut stats = LookupStats::default();

    for record in 0..table.record_count() {
        let container = identifier_from_cell(cell(record, container_col));
        let plate = identifier_from_cell(cell(record, plate_col));
        let time_cell = cell(record, time_col);

        // Fully blank rows (trailing formatting, separators) are not records
        if container.is_empty() && plate.is_empty() && time_cell.is_blank() {
            continue;
        }
        stats.records += 1;

        let time = normalize_time(time_cell);
        if container.is_empty() {
            stats.missing_container += 1;
            continue;
        }
        if plate.is_empty() {
            stats.missing_plate += 1;
            continue;
        }
        if time.is_empty() {
            stats.missing_time += 1;
            continue;
        }

        if lookup.insert(NormalizedKey::new(container, plate), time) {
            stats.overwritten += 1;
        } else {
            stats.inserted += 1;
        }
    }

    log::debug!(
        "{}: lookup built with {} keys from {} records (missing container {}, plate {}, time {})",
        table.name(),
        lookup.len(),
        stats.records,
        stats.missing_container,
        stats.missing_plate,
        stats.missing_time,
    );

    lookup.stats = stats;
    lookup
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::resolve_columns;
    use crate::config::SyncConfig;
    use crate::model::RawGrid;

    fn export_table(rows: &[[Cell; 3]]) -> (Table, FieldMap) {
        let mut grid = vec![vec![
            Cell::text("NUMERO CONTENEDOR"),
            Cell::text("PLACA DE CARRETA"),
            Cell::text("HORA DE SALIDA"),
        ]];
        grid.extend(rows.iter().map(|r| r.to_vec()));
        let table = Table::from_grid("14", RawGrid::new(grid), 0);
        let fields = resolve_columns("export", table.columns(), &SyncConfig::default().export.fields).unwrap();
        (table, fields)
    }

    fn t(s: &str) -> Cell {
        Cell::text(s)
    }

    #[test]
    fn normalizes_keys_and_times() {
        let (table, fields) = export_table(&[[t("MRKU 546694-7"), t("t-123 45"), t("14:05")]]);
        let lookup = build_lookup(&table, &fields);
        assert_eq!(lookup.len(), 1);
        assert_eq!(lookup.get(&NormalizedKey::new("MRKU5466947", "T12345")), Some("14:05"));
    }

    #[test]
    fn incomplete_records_are_skipped_and_counted() {
        let (table, fields) = export_table(&[
            [t("MRKU5466947"), t("T12345"), t("14:05")],
            [Cell::Empty, t("T999"), t("10:00")],
            [t("TGHU1234567"), t("  "), t("10:00")],
            [t("TGHU7654321"), t("B1"), t("pendiente")],
            [Cell::Empty, Cell::Empty, Cell::Empty],
        ]);
        let lookup = build_lookup(&table, &fields);
        assert_eq!(lookup.len(), 1);
        let stats = lookup.stats();
        assert_eq!(stats.records, 4);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.missing_container, 1);
        assert_eq!(stats.missing_plate, 1);
        assert_eq!(stats.missing_time, 1);
    }

    #[test]
    fn duplicates_last_write_wins() {
        let (table, fields) = export_table(&[
            [t("MRKU5466947"), t("T12345"), t("09:00")],
            [t("MRKU-5466947"), t("T-12345"), t("14:05")],
        ]);
        let lookup = build_lookup(&table, &fields);
        assert_eq!(lookup.len(), 1);
        assert_eq!(lookup.get(&NormalizedKey::new("MRKU5466947", "T12345")), Some("14:05"));
        assert_eq!(lookup.stats().overwritten, 1);
    }

    #[test]
    fn numeric_fraction_time() {
        let (table, fields) = export_table(&[[t("MRKU5466947"), t("T12345"), Cell::Number(0.5868)]]);
        let lookup = build_lookup(&table, &fields);
        assert_eq!(lookup.get(&NormalizedKey::new("MRKU5466947", "T12345")), Some("14:05"));
    }

    #[test]
    fn plate_probe() {
        let mut lookup = Lookup::default();
        lookup.insert(NormalizedKey::new("AAAU1", "P1"), "08:00".into());
        lookup.insert(NormalizedKey::new("BBBU2", "P2"), "09:00".into());
        lookup.insert(NormalizedKey::new("CCCU3", "P2"), "10:00".into());
        lookup.insert(NormalizedKey::new("DDDU4", "P3"), "11:00".into());
        lookup.insert(NormalizedKey::new("EEEU5", "P3"), "11:00".into());

        assert_eq!(lookup.get_by_plate("P1"), PlateMatch::Found("08:00"));
        assert_eq!(lookup.get_by_plate("P2"), PlateMatch::Ambiguous);
        assert_eq!(lookup.get_by_plate("P3"), PlateMatch::Found("11:00"));
        assert_eq!(lookup.get_by_plate("P4"), PlateMatch::Missing);
    }

    #[test]
    fn overwrite_keeps_plate_index_in_sync() {
        let mut lookup = Lookup::default();
        lookup.insert(NormalizedKey::new("AAAU1", "P1"), "08:00".into());
        lookup.insert(NormalizedKey::new("BBBU2", "P1"), "09:00".into());
        assert_eq!(lookup.get_by_plate("P1"), PlateMatch::Ambiguous);
        assert!(lookup.insert(NormalizedKey::new("BBBU2", "P1"), "08:00".into()));
        assert_eq!(lookup.get_by_plate("P1"), PlateMatch::Found("08:00"));
    }
}
