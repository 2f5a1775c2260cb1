//! `salidas run` / `salidas auto` / `salidas config`: fill departure times in
//! the master workbook from a monthly export log.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use clap::{Args, Subcommand, ValueEnum};
use salidas_config::Settings;
use salidas_io::{persist, OutputMode, XlsxSource};
use salidas_recon::date::{day_selector, default_day, parse_day_selection};
use salidas_recon::model::{DayReport, DayStatus};
use salidas_recon::{DestinationTable, OverwritePolicy, ReconError, SyncConfig, SyncResult, TableCache};

use crate::exit_codes::{
    recon_exit_code, EXIT_SYNC_DAY_FAILED, EXIT_SYNC_INVALID_CONFIG, EXIT_SYNC_UNREADABLE,
    EXIT_SYNC_WRITE, EXIT_USAGE,
};
use crate::CliError;

/// Flags shared by `run` and `auto`.
#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Master workbook to fill (default: `destination` from settings)
    #[arg(long, short = 'd')]
    pub destination: Option<PathBuf>,

    /// Sync config TOML (default: `config` from settings, else built-in tables)
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Where results go: copy, timestamped, in-place, both
    #[arg(long, short = 'o', value_parser = parse_output_mode)]
    pub output: Option<OutputMode>,

    /// Override the config's overwrite policy
    #[arg(long, value_enum)]
    pub overwrite: Option<OverwriteArg>,

    /// Match records without a container on plate alone
    #[arg(long)]
    pub container_fallback: bool,

    /// Skip the remaining days after the first failing one
    #[arg(long)]
    pub fail_fast: bool,

    /// Reconcile and report, but write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Print the full result as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OverwriteArg {
    BlankOnly,
    IfDifferent,
}

impl From<OverwriteArg> for OverwritePolicy {
    fn from(arg: OverwriteArg) -> Self {
        match arg {
            OverwriteArg::BlankOnly => OverwritePolicy::BlankOnly,
            OverwriteArg::IfDifferent => OverwritePolicy::IfDifferent,
        }
    }
}

fn parse_output_mode(s: &str) -> Result<OutputMode, String> {
    s.parse()
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Check a sync config without running
    #[command(after_help = "\
Examples:
  salidas config validate sync.toml")]
    Validate {
        /// Path to the sync config TOML
        file: PathBuf,
    },

    /// Print the built-in sync config as TOML
    #[command(after_help = "\
Examples:
  salidas config default > sync.toml")]
    Default,

    /// Show the settings file location and its current values
    Settings,
}

/// Everything a sync needs, after flags and settings are merged.
#[derive(Debug)]
struct SyncPlan {
    destination: PathBuf,
    source: PathBuf,
    days: Vec<String>,
    config: SyncConfig,
    output: OutputMode,
    dry_run: bool,
    json: bool,
}

fn sync_err(code: u8, msg: impl Into<String>) -> CliError {
    CliError { code, message: msg.into(), hint: None }
}

fn recon_err(err: ReconError) -> CliError {
    let hint = match &err {
        ReconError::HeaderNotFound { .. } | ReconError::MissingColumn { .. } => Some(
            "check the header names, or set header_tokens / field synonyms in a sync config".to_string(),
        ),
        _ => None,
    };
    CliError { code: recon_exit_code(&err), message: err.to_string(), hint }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// `salidas run`: explicit export log and day selection.
pub fn cmd_run(
    source: PathBuf,
    day: Option<String>,
    days: Option<String>,
    args: SyncArgs,
) -> Result<(), CliError> {
    let settings = Settings::load();

    let days = match (day, days) {
        (Some(_), Some(_)) => {
            return Err(CliError::args("use either --day or --days, not both"));
        }
        (Some(d), None) | (None, Some(d)) => parse_day_selection(&d).map_err(|e| CliError {
            code: EXIT_USAGE,
            message: e.to_string(),
            hint: Some("days are 01-31, e.g. --day 14, --days 05,06 or --days 05-08".to_string()),
        })?,
        (None, None) => {
            let day = day_selector(default_day(Local::now().date_naive()));
            log::info!("no day given; using yesterday ({day})");
            vec![day]
        }
    };

    let plan = build_plan(&settings, source, days, &args, OutputMode::Copy)?;
    execute(plan)
}

/// `salidas auto`: yesterday (or `--date`) against the month's export log.
pub fn cmd_auto(
    date: Option<NaiveDate>,
    source_dir: Option<PathBuf>,
    args: SyncArgs,
) -> Result<(), CliError> {
    let mut settings = Settings::load();
    if let Some(dir) = source_dir {
        settings.source_dir = Some(dir);
    }

    let date = date.unwrap_or_else(|| default_day(Local::now().date_naive()));
    let source = settings.resolve_source_path(date).ok_or_else(|| CliError {
        code: EXIT_USAGE,
        message: "no export log directory configured".to_string(),
        hint: Some(format!(
            "pass --source-dir or set \"source_dir\" in {}",
            Settings::config_path_display()
        )),
    })?;
    log::info!("auto: {} for {}", source.display(), date);

    // Scheduled runs patch the master unless told otherwise
    let plan = build_plan(&settings, source, vec![day_selector(date)], &args, OutputMode::InPlace)?;
    execute(plan)
}

pub fn cmd_config(cmd: ConfigCommands) -> Result<(), CliError> {
    match cmd {
        ConfigCommands::Validate { file } => {
            let config = load_config(&file)?;
            eprintln!(
                "valid: destination sheet '{}', overwrite {}, header policy {:?} (first {} rows)",
                config.destination.sheet.as_deref().unwrap_or("<first sheet>"),
                config.policy.overwrite,
                config.header.policy,
                config.header.max_rows,
            );
            Ok(())
        }
        ConfigCommands::Default => {
            let toml = SyncConfig::default()
                .to_toml()
                .map_err(|e| sync_err(EXIT_SYNC_INVALID_CONFIG, e.to_string()))?;
            print!("{toml}");
            Ok(())
        }
        ConfigCommands::Settings => {
            let settings = Settings::load();
            let json = serde_json::to_string_pretty(&settings)
                .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
            eprintln!("{}", Settings::config_path_display());
            println!("{json}");
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Plan + execute
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<SyncConfig, CliError> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError {
        code: EXIT_USAGE,
        message: format!("cannot read config {}: {e}", path.display()),
        hint: None,
    })?;
    SyncConfig::from_toml(&text).map_err(|e| sync_err(EXIT_SYNC_INVALID_CONFIG, e.to_string()))
}

fn build_plan(
    settings: &Settings,
    source: PathBuf,
    days: Vec<String>,
    args: &SyncArgs,
    default_output: OutputMode,
) -> Result<SyncPlan, CliError> {
    let destination = args
        .destination
        .clone()
        .or_else(|| settings.destination.clone())
        .ok_or_else(|| CliError {
            code: EXIT_USAGE,
            message: "no destination workbook given".to_string(),
            hint: Some(format!(
                "pass --destination or set \"destination\" in {}",
                Settings::config_path_display()
            )),
        })?;

    let mut config = match args.config.as_ref().or(settings.config.as_ref()) {
        Some(path) => load_config(path)?,
        None => SyncConfig::default(),
    };
    if let Some(overwrite) = args.overwrite {
        config.policy.overwrite = overwrite.into();
    }
    config.policy.container_fallback |= args.container_fallback;
    config.policy.fail_fast |= args.fail_fast;

    // An explicit --output wins; settings only replace the copy default
    let output = match args.output {
        Some(mode) => mode,
        None if default_output == OutputMode::Copy => settings.output_mode,
        None => default_output,
    };

    for (what, path) in [("destination workbook", &destination), ("export log", &source)] {
        if !path.exists() {
            return Err(CliError {
                code: EXIT_USAGE,
                message: format!("{what} not found: {}", path.display()),
                hint: None,
            });
        }
    }

    Ok(SyncPlan {
        destination,
        source,
        days,
        config,
        output,
        dry_run: args.dry_run,
        json: args.json,
    })
}

fn execute(plan: SyncPlan) -> Result<(), CliError> {
    let mut destination = {
        let mut workbook = XlsxSource::open(&plan.destination)
            .map_err(|e| sync_err(EXIT_SYNC_UNREADABLE, format!("{}: {e}", plan.destination.display())))?;
        DestinationTable::load(&mut workbook, &plan.config).map_err(recon_err)?
        // Workbook handle is released here, before any in-place patch
    };
    log::info!(
        "destination: sheet '{}', header on row {}, {} records",
        destination.sheet(),
        destination.table().header_row() + 1,
        destination.table().record_count()
    );

    let mut source = XlsxSource::open(&plan.source)
        .map_err(|e| sync_err(EXIT_SYNC_UNREADABLE, format!("{}: {e}", plan.source.display())))?;
    let mut cache = TableCache::new();

    let result = salidas_recon::run(&plan.config, &mut destination, &mut source, &mut cache, &plan.days)
        .map_err(recon_err)?;

    print_summary(&result);

    let mut written: Vec<PathBuf> = Vec::new();
    if plan.dry_run {
        eprintln!("dry run: nothing written ({} update(s) pending)", result.total_updated);
    } else {
        let sheet = destination.sheet().to_string();
        let grid = destination.into_table().into_grid();
        let report = persist(
            plan.output,
            &plan.destination,
            &sheet,
            &grid,
            &result.updates,
            Local::now().naive_local(),
        )
        .map_err(|e| sync_err(EXIT_SYNC_WRITE, e))?;

        if report.in_place_skipped {
            eprintln!("{} left untouched (no updates)", plan.destination.display());
        }
        for path in &report.paths {
            eprintln!("wrote {}", path.display());
        }
        written = report.paths;
    }

    if plan.json {
        let json = serde_json::json!({
            "result": &result,
            "output": {
                "mode": plan.output.to_string(),
                "dry_run": plan.dry_run,
                "paths": written,
            },
        });
        let json_str = serde_json::to_string_pretty(&json)
            .map_err(|e| CliError::io(format!("JSON serialization error: {e}")))?;
        println!("{json_str}");
    }

    if result.failed_days > 0 {
        return Err(sync_err(
            EXIT_SYNC_DAY_FAILED,
            format!("{} of {} day(s) failed", result.failed_days, result.days.len()),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Human summary (stderr)
// ---------------------------------------------------------------------------

fn print_summary(result: &SyncResult) {
    for day in &result.days {
        eprintln!("{}", day_line(day));
    }

    if result.total_updated == 0 {
        eprintln!(
            "0 departure times updated: no exact container + plate match for the target date, \
             or values already up to date"
        );
    } else {
        eprintln!(
            "{} departure time(s) updated in sheet '{}'",
            result.total_updated, result.meta.destination_sheet
        );
    }
}

fn day_line(day: &DayReport) -> String {
    let date = day
        .date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "----------".to_string());
    match &day.status {
        DayStatus::Completed => {
            let lookup = day.lookup.as_ref().map_or(0, |l| l.inserted);
            match &day.reconcile {
                Some(r) => format!(
                    "day {} ({}, sheet '{}'): {} keys, {} updated, {} unmatched, {} skipped",
                    day.day,
                    date,
                    day.sheet.as_deref().unwrap_or("?"),
                    lookup,
                    r.updated,
                    r.unmatched,
                    r.skipped_populated + r.skipped_no_plate + r.skipped_no_date + r.skipped_other_date,
                ),
                None => format!("day {} ({}): {} keys", day.day, date, lookup),
            }
        }
        DayStatus::Failed { error } => format!("day {} ({}): failed: {}", day.day, date, error),
        DayStatus::Skipped => format!("day {}: skipped", day.day),
    }
}
