//! Best-effort canonicalization of identifiers, times and dates.
//!
//! Nothing here fails: unusable input becomes an empty string (or `None` for
//! dates) and callers treat that as "no usable value".

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use regex::{Captures, Regex};

use crate::config::DateOrder;
use crate::model::Cell;

/// Placeholders that mean "no time recorded".
const BLANK_MARKERS: [&str; 3] = ["NAN", "NONE", "NULL"];

/// Largest Excel serial we accept (9999-12-31).
const MAX_EXCEL_SERIAL: f64 = 2_958_466.0;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Uppercase, ASCII-alphanumeric-only form of a container number or plate.
pub fn normalize_identifier(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

pub fn identifier_from_cell(cell: &Cell) -> String {
    match cell {
        Cell::Empty | Cell::Error(_) => String::new(),
        other => normalize_identifier(&other.label()),
    }
}

// ---------------------------------------------------------------------------
// Times
// ---------------------------------------------------------------------------

/// Canonical `HH:MM` / `HH:MM:SS` departure time, or empty when unusable.
pub fn normalize_time(cell: &Cell) -> String {
    match cell {
        Cell::Time(t) => format_time(*t),
        Cell::DateTime(dt) => format_time(dt.time()),
        Cell::Number(n) => time_from_fraction(*n).map(format_time).unwrap_or_default(),
        Cell::Text(s) => time_from_str(s),
        Cell::Empty | Cell::Bool(_) | Cell::Error(_) => String::new(),
    }
}

/// Seconds are printed only when present.
fn format_time(t: NaiveTime) -> String {
    if t.second() == 0 {
        t.format("%H:%M").to_string()
    } else {
        t.format("%H:%M:%S").to_string()
    }
}

/// Excel time-of-day: a fraction of a day in [0, 1).
fn time_from_fraction(value: f64) -> Option<NaiveTime> {
    if !(0.0..1.0).contains(&value) {
        return None;
    }
    let total = (value * 86_400.0).round() as u32;
    if total >= 86_400 {
        return None;
    }
    NaiveTime::from_hms_opt(total / 3600, (total % 3600) / 60, total % 60)
}

fn colon_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[^0-9])(\d{1,2}):(\d{2})(?::(\d{2}))?(?:\s*([ap])\.?\s*m(?:\.|\b))?(?:[^0-9:]|$)")
            .expect("valid time regex")
    })
}

fn dot_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:^|[^0-9.])(\d{1,2})\.(\d{2})(?:\.(\d{2}))?(?:\s*([ap])\.?\s*m(?:\.|\b))?(?:[^0-9.]|$)")
            .expect("valid time regex")
    })
}

/// `HH:MM:SS`, `HH:MM`, `HH.MM.SS`, `HH.MM`, then a whole-string date-time parse.
fn time_from_str(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }

    for re in [colon_pattern(), dot_pattern()] {
        for caps in re.captures_iter(s) {
            if let Some(t) = time_from_captures(&caps) {
                return t;
            }
        }
    }

    parse_datetime_str(s).map(format_time).unwrap_or_default()
}

fn time_from_captures(caps: &Captures<'_>) -> Option<String> {
    let mut hours: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: u32 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: Option<u32> = match caps.get(3) {
        Some(m) => Some(m.as_str().parse().ok()?),
        None => None,
    };

    // A marker on a 24-hour value ("13:00 pm") is ignored
    if let Some(meridiem) = caps.get(4).filter(|_| (1..=12).contains(&hours)) {
        let pm = meridiem.as_str().eq_ignore_ascii_case("p");
        hours = match (pm, hours) {
            (false, 12) => 0,
            (true, 12) => 12,
            (true, h) => h + 12,
            (false, h) => h,
        };
    }

    if hours > 23 || minutes > 59 || seconds.is_some_and(|s| s > 59) {
        return None;
    }

    Some(match seconds {
        Some(sec) => format!("{hours:02}:{minutes:02}:{sec:02}"),
        None => format!("{hours:02}:{minutes:02}"),
    })
}

/// Generic fallback for strings the patterns above did not catch.
fn parse_datetime_str(s: &str) -> Option<NaiveTime> {
    const DATETIME_FORMATS: [&str; 5] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S%.f",
        "%d/%m/%Y %H:%M",
        "%Y-%m-%d %I:%M %p",
    ];
    const TIME_FORMATS: [&str; 3] = ["%H:%M:%S%.f", "%I:%M %p", "%I:%M:%S %p"];

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.time());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .map(|dt| dt.time())
        .or_else(|| TIME_FORMATS.iter().find_map(|f| NaiveTime::parse_from_str(s, f).ok()))
        .map(|t| t.with_nanosecond(0).unwrap_or(t))
}

/// Blank, whitespace, or one of the NAN/NONE/NULL placeholders.
pub fn is_blank_time(cell: &Cell) -> bool {
    match cell {
        Cell::Empty => true,
        Cell::Text(s) => {
            let s = s.trim();
            s.is_empty() || BLANK_MARKERS.iter().any(|m| s.eq_ignore_ascii_case(m))
        }
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Calendar date of a destination record; `None` when blank or unparseable.
///
/// Slashed, dashed and dotted dates are read day-first.
pub fn normalize_date(cell: &Cell) -> Option<NaiveDate> {
    normalize_date_with(cell, DateOrder::DayFirst)
}

/// As [`normalize_date`], with an explicit order for `NN/NN/YYYY` dates.
pub fn normalize_date_with(cell: &Cell, order: DateOrder) -> Option<NaiveDate> {
    match cell {
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Number(n) if *n >= 1.0 => excel_serial_to_datetime(*n).map(|dt| dt.date()),
        Cell::Text(s) => date_from_str(s, order),
        _ => None,
    }
}

fn date_from_str(raw: &str, order: DateOrder) -> Option<NaiveDate> {
    const DAY_FIRST: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
    const MONTH_FIRST: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y", "%m.%d.%Y"];
    let formats = match order {
        DateOrder::DayFirst => &DAY_FIRST,
        DateOrder::MonthFirst => &MONTH_FIRST,
    };

    let s = raw.trim();
    let head = s
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()
        .unwrap_or("");
    if head.is_empty() {
        return None;
    }
    formats
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(head, f).ok())
}

/// Convert an Excel serial (1900 date system) to a date-time.
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.trunc() as i64;
    let secs = (serial.fract() * 86_400.0).round() as i64;
    epoch
        .checked_add_signed(TimeDelta::try_days(days)?)?
        .checked_add_signed(TimeDelta::try_seconds(secs)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
