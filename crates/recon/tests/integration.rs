use std::path::PathBuf;

use chrono::NaiveDate;
use salidas_recon::config::OverwritePolicy;
use salidas_recon::date::extract_processing_date;
use salidas_recon::model::{DayStatus, Field};
use salidas_recon::{run, Cell, DestinationTable, MemorySource, RawGrid, ReconError, SyncConfig, TableCache};

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn t(s: &str) -> Cell {
    Cell::text(s)
}

fn days(d: &[&str]) -> Vec<String> {
    d.iter().map(|s| s.to_string()).collect()
}

/// Destination sheet with a title row above the header, rows are
/// [container, plate, time, date].
fn destination(rows: Vec<[Cell; 4]>) -> RawGrid {
    let mut grid = vec![
        vec![t("CONTROL DE CONTENEDORES 2025")],
        vec![],
        vec![t("Contenedor"), t("Placa 2"), t("Hr salida QP"), t("Fecha")],
    ];
    grid.extend(rows.into_iter().map(|r| r.to_vec()));
    RawGrid::new(grid)
}

/// Export day-sheet, rows are [container, plate, time].
fn export_sheet(rows: Vec<[Cell; 3]>) -> RawGrid {
    let mut grid = vec![
        vec![t("REPORTE DIARIO DE SALIDAS")],
        vec![t("ITEM"), t("NUMERO CONTENEDOR"), t("PLACA DE CARRETA"), t("HORA DE SALIDA")],
    ];
    grid.extend(
        rows.into_iter()
            .enumerate()
            .map(|(i, [c, p, h])| vec![Cell::Number((i + 1) as f64), c, p, h]),
    );
    RawGrid::new(grid)
}

fn date_cell(y: i32, m: u32, d: u32) -> Cell {
    Cell::DateTime(NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap())
}

fn time_of(dest: &DestinationTable, record: usize) -> &Cell {
    let col = dest.fields().index(Field::Time).unwrap();
    dest.table().get(record, col)
}

// -------------------------------------------------------------------------
// End-to-end scenarios
// -------------------------------------------------------------------------

#[test]
fn single_match_fills_departure_time() {
    let config = SyncConfig::default();
    let mut dest = DestinationTable::from_grid(
        "BBDD",
        destination(vec![[t("MRKU-546694 7"), t("T 123-45"), Cell::Empty, date_cell(2025, 5, 14)]]),
        &config,
    )
    .unwrap();
    let mut source = MemorySource::new("SALIDA_2025_05.xlsx")
        .with_sheet("14", export_sheet(vec![[t("MRKU5466947"), t("T12345"), t("14:05")]]));

    let result = run(&config, &mut dest, &mut source, &mut TableCache::new(), &days(&["14"])).unwrap();

    assert_eq!(result.total_updated, 1);
    assert_eq!(result.failed_days, 0);
    assert_eq!(time_of(&dest, 0), &t("14:05"));

    // Header sits on sheet row 3, so the record is sheet row 4 (0-based 3)
    assert_eq!(result.updates.len(), 1);
    assert_eq!(result.updates[0].row, 3);
    assert_eq!(result.updates[0].col, 2);
    assert_eq!(result.updates[0].value, "14:05");

    let day = &result.days[0];
    assert_eq!(day.status, DayStatus::Completed);
    assert_eq!(day.date, NaiveDate::from_ymd_opt(2025, 5, 14));
    assert_eq!(day.sheet.as_deref(), Some("14"));
    assert_eq!(day.lookup.as_ref().unwrap().inserted, 1);
}

#[test]
fn different_date_is_left_alone() {
    let config = SyncConfig::default();
    let mut dest = DestinationTable::from_grid(
        "BBDD",
        destination(vec![[t("MRKU-546694 7"), t("T 123-45"), Cell::Empty, date_cell(2025, 5, 15)]]),
        &config,
    )
    .unwrap();
    let mut source = MemorySource::new("SALIDA_2025_05.xlsx")
        .with_sheet("14", export_sheet(vec![[t("MRKU5466947"), t("T12345"), t("14:05")]]));

    let result = run(&config, &mut dest, &mut source, &mut TableCache::new(), &days(&["14"])).unwrap();

    assert_eq!(result.total_updated, 0);
    assert!(result.updates.is_empty());
    assert_eq!(time_of(&dest, 0), &Cell::Empty);
    assert_eq!(result.days[0].reconcile.as_ref().unwrap().skipped_other_date, 1);
}

#[test]
fn invalid_month_fails_before_reading_sheets() {
    assert!(matches!(
        extract_processing_date("SALIDA_2025_13.xlsx", "05"),
        Err(ReconError::InvalidDate(_))
    ));

    let config = SyncConfig::default();
    let mut dest = DestinationTable::from_grid(
        "BBDD",
        destination(vec![[t("MRKU5466947"), t("T12345"), Cell::Empty, date_cell(2025, 5, 5)]]),
        &config,
    )
    .unwrap();
    let mut source = MemorySource::new("SALIDA_2025_13.xlsx")
        .with_sheet("05", export_sheet(vec![[t("MRKU5466947"), t("T12345"), t("14:05")]]));

    let result = run(&config, &mut dest, &mut source, &mut TableCache::new(), &days(&["05"])).unwrap();

    assert_eq!(result.failed_days, 1);
    assert_eq!(source.reads(), 0);
    assert!(result.days[0].lookup.is_none());
    match &result.days[0].status {
        DayStatus::Failed { error } => assert!(error.contains("invalid date")),
        other => panic!("unexpected status: {other:?}"),
    }
}

#[test]
fn rerun_updates_nothing() {
    let config = SyncConfig::default();
    let mut dest = DestinationTable::from_grid(
        "BBDD",
        destination(vec![
            [t("MRKU5466947"), t("T12345"), Cell::Empty, date_cell(2025, 5, 14)],
            [t("TGHU1234567"), t("B-77"), t("NULL"), t("14/05/2025")],
        ]),
        &config,
    )
    .unwrap();
    let mut source = MemorySource::new("SALIDA_2025_05.xlsx").with_sheet(
        "14",
        export_sheet(vec![
            [t("MRKU5466947"), t("T12345"), Cell::Number(0.5868055555555556)],
            [t("TGHU 123456-7"), t("B77"), t("9.30")],
        ]),
    );
    let mut cache = TableCache::new();

    let first = run(&config, &mut dest, &mut source, &mut cache, &days(&["14"])).unwrap();
    assert_eq!(first.total_updated, 2);
    assert_eq!(time_of(&dest, 0), &t("14:05"));
    assert_eq!(time_of(&dest, 1), &t("09:30"));

    let second = run(&config, &mut dest, &mut source, &mut cache, &days(&["14"])).unwrap();
    assert_eq!(second.total_updated, 0);
}

// -------------------------------------------------------------------------
// Multi-day runs
// -------------------------------------------------------------------------

#[test]
fn multi_day_accumulates_and_isolates_failures() {
    let config = SyncConfig::default();
    let mut dest = DestinationTable::from_grid(
        "BBDD",
        destination(vec![
            [t("MRKU5466947"), t("T12345"), Cell::Empty, date_cell(2025, 5, 5)],
            [t("MRKU5466947"), t("T12345"), Cell::Empty, date_cell(2025, 5, 6)],
            [t("CAIU7000001"), t("X1"), Cell::Empty, date_cell(2025, 5, 9)],
        ]),
        &config,
    )
    .unwrap();
    let broken = RawGrid::new(vec![vec![t("sin cabecera")], vec![t("MRKU5466947")]]);
    let mut source = MemorySource::new("SALIDA_2025_05.xlsx")
        .with_sheet("05", export_sheet(vec![[t("MRKU5466947"), t("T12345"), t("07:10")]]))
        .with_sheet("6", export_sheet(vec![[t("MRKU5466947"), t("T12345"), t("18:45:30")]]))
        .with_sheet("07", broken);

    let result = run(
        &config,
        &mut dest,
        &mut source,
        &mut TableCache::new(),
        &days(&["05", "06", "07", "08"]),
    )
    .unwrap();

    assert_eq!(result.total_updated, 2);
    assert_eq!(result.failed_days, 2);
    assert_eq!(time_of(&dest, 0), &t("07:10"));
    assert_eq!(time_of(&dest, 1), &t("18:45:30"));
    assert_eq!(time_of(&dest, 2), &Cell::Empty);

    assert_eq!(result.days[1].sheet.as_deref(), Some("6"));
    assert!(matches!(&result.days[2].status, DayStatus::Failed { error } if error.contains("header row not found")));
    assert!(matches!(&result.days[3].status, DayStatus::Failed { error } if error.contains("no sheet for day '08'")));
}

#[test]
fn export_missing_column_fails_only_that_day() {
    let mut config = SyncConfig::default();
    config.export.header_row = Some(1);
    let mut dest = DestinationTable::from_grid(
        "BBDD",
        destination(vec![[t("MRKU5466947"), t("T12345"), Cell::Empty, date_cell(2025, 5, 2)]]),
        &config,
    )
    .unwrap();
    let no_time = RawGrid::new(vec![
        vec![t("NUMERO CONTENEDOR"), t("PLACA DE CARRETA")],
        vec![t("MRKU5466947"), t("T12345")],
    ]);
    let good = RawGrid::new(vec![
        vec![t("NUMERO CONTENEDOR"), t("PLACA DE CARRETA"), t("HORA DE SALIDA")],
        vec![t("MRKU5466947"), t("T12345"), t("11:00")],
    ]);
    let mut source = MemorySource::new("SALIDA_2025_05.xlsx")
        .with_sheet("01", no_time)
        .with_sheet("02", good);

    let result = run(&config, &mut dest, &mut source, &mut TableCache::new(), &days(&["01", "02"])).unwrap();

    assert_eq!(result.failed_days, 1);
    assert_eq!(result.total_updated, 1);
    assert!(matches!(&result.days[0].status, DayStatus::Failed { error } if error.contains("'time'")));
}

// -------------------------------------------------------------------------
// Config-driven runs
// -------------------------------------------------------------------------

#[test]
fn fuzzy_config_from_fixture() {
    let text = std::fs::read_to_string(fixtures_dir().join("fuzzy-export.sync.toml")).unwrap();
    let config = SyncConfig::from_toml(&text).unwrap();
    assert_eq!(config.policy.overwrite, OverwritePolicy::IfDifferent);

    let mut dest = DestinationTable::from_grid(
        "BBDD",
        destination(vec![
            [t("MRKU5466947"), t("T12345"), t("13:00"), date_cell(2025, 5, 14)],
            [t("TGHU1234567"), t("B77"), t("09:30"), date_cell(2025, 5, 14)],
        ]),
        &config,
    )
    .unwrap();
    let export = RawGrid::new(vec![
        vec![t("SALIDAS - MAYO")],
        vec![t("Nº CONTENEDOR"), t("PLACA CARRETA"), t("HORA SALIDA"), t("OBS")],
        vec![t("MRKU5466947"), t("T12345"), t("14:05"), Cell::Empty],
        vec![t("TGHU1234567"), t("B77"), t("09:30"), Cell::Empty],
    ]);
    let mut source = MemorySource::new("SALIDA_2025_05.xlsx").with_sheet("14", export);

    let result = run(&config, &mut dest, &mut source, &mut TableCache::new(), &days(&["14"])).unwrap();

    assert_eq!(result.meta.overwrite, "if_different");
    assert_eq!(result.total_updated, 1);
    assert_eq!(time_of(&dest, 0), &t("14:05"));
    assert_eq!(result.days[0].reconcile.as_ref().unwrap().skipped_populated, 1);
}

#[test]
fn result_serializes_for_json_output() {
    let config = SyncConfig::default();
    let mut dest = DestinationTable::from_grid(
        "BBDD",
        destination(vec![[t("MRKU5466947"), t("T12345"), Cell::Empty, date_cell(2025, 5, 14)]]),
        &config,
    )
    .unwrap();
    let mut source = MemorySource::new("SALIDA_2025_05.xlsx")
        .with_sheet("14", export_sheet(vec![[t("MRKU5466947"), t("T12345"), t("14:05")]]));

    let result = run(&config, &mut dest, &mut source, &mut TableCache::new(), &days(&["14", "40"])).unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["total_updated"], 1);
    assert_eq!(json["days"][0]["status"], "completed");
    assert_eq!(json["days"][0]["date"], "2025-05-14");
    assert_eq!(json["days"][0]["reconcile"]["updated"], 1);
    assert_eq!(json["days"][1]["status"], "failed");
    assert!(json["days"][1]["error"].is_string());
    assert!(json.get("updates").is_none());
}
