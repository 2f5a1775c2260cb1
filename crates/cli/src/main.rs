// salidas - fill container departure times in the master workbook
// from the daily sheets of the port's export log

mod exit_codes;
mod sync;

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{ArgAction, Parser, Subcommand};

use exit_codes::{EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};
use sync::{ConfigCommands, SyncArgs};

#[derive(Parser)]
#[command(name = "salidas")]
#[command(about = "Reconcile container departure times between an export log and a master workbook")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile one or more day-sheets of an export log
    #[command(after_help = "\
Examples:
  salidas run -s SALIDA_2025_05.xlsx -d 'Control salidas.xlsx' --day 14
  salidas run -s SALIDA_2025_05.xlsx -d master.xlsx --days 05-08,12 --output both
  salidas run -s SALIDA_2025_05.xlsx -d master.xlsx --day 14 --dry-run --json")]
    Run {
        /// Export log workbook (name must carry YYYY_MM)
        #[arg(long, short = 's')]
        source: PathBuf,

        /// Single day-of-month sheet (default: yesterday)
        #[arg(long)]
        day: Option<String>,

        /// Several days: comma list and/or inclusive ranges (05,06,09 or 05-08)
        #[arg(long, conflicts_with = "day")]
        days: Option<String>,

        #[command(flatten)]
        sync: SyncArgs,
    },

    /// Scheduled mode: yesterday's sheet from the month's export log, written in place
    #[command(after_help = "\
Examples:
  salidas auto
  salidas auto --date 2025-05-14
  salidas auto --source-dir /data/salidas --output copy")]
    Auto {
        /// Process this date instead of yesterday (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Directory with the monthly export logs (default: `source_dir` from settings)
        #[arg(long)]
        source_dir: Option<PathBuf>,

        #[command(flatten)]
        sync: SyncArgs,
    },

    /// Sync config helpers
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        "\nengine:  salidas-recon ",
        env!("CARGO_PKG_VERSION"),
        "\nformats: xlsx, xlsm, xls, xlsb, ods (read); xlsx (write)",
    )
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => log::LevelFilter::Error,
        (false, 0) => log::LevelFilter::Warn,
        (false, 1) => log::LevelFilter::Info,
        (false, _) => log::LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Run { source, day, days, sync } => sync::cmd_run(source, day, days, sync),
        Commands::Auto { date, source_dir, sync } => sync::cmd_auto(date, source_dir, sync),
        Commands::Config(cmd) => sync::cmd_config(cmd),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }
}
