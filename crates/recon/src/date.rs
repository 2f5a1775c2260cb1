//! Processing dates and day-sheet selection.
//!
//! An export log holds one sheet per day of a single month; the year and month
//! come from the file name (`SALIDA_2025_05.xlsx`) and the day from the sheet
//! selector (`"14"`).

use std::path::Path;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::error::ReconError;

fn year_month_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})_(\d{2})").expect("valid year-month regex"))
}

/// Build the calendar date a day-sheet covers.
///
/// Fails with `InvalidDate` when the file name has no `YYYY_MM` token, the
/// selector is not a number, or the triple is not a real date.
pub fn extract_processing_date(file_name: &str, day: &str) -> Result<NaiveDate, ReconError> {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name);

    let caps = year_month_re().captures(base).ok_or_else(|| {
        ReconError::InvalidDate(format!("no YYYY_MM token in file name '{base}'"))
    })?;
    // Both groups are pure digits of bounded width
    let year: i32 = caps[1].parse().map_err(|_| bad_token(base))?;
    let month: u32 = caps[2].parse().map_err(|_| bad_token(base))?;

    let day_num: u32 = day
        .trim()
        .parse()
        .map_err(|_| ReconError::InvalidDate(format!("day selector '{day}' is not a number")))?;

    NaiveDate::from_ymd_opt(year, month, day_num).ok_or_else(|| {
        ReconError::InvalidDate(format!(
            "{year:04}-{month:02}-{day_num:02} is not a calendar date (from '{base}', day '{day}')"
        ))
    })
}

fn bad_token(base: &str) -> ReconError {
    ReconError::InvalidDate(format!("unreadable YYYY_MM token in '{base}'"))
}

/// Zero-padded day selector for a date ("05").
pub fn day_selector(date: NaiveDate) -> String {
    format!("{:02}", date.day())
}

/// The day runs default to: the one before `today`.
pub fn default_day(today: NaiveDate) -> NaiveDate {
    today.pred_opt().unwrap_or(today)
}

/// Pick the sheet for a day selector.
///
/// Exact name first, then the first name containing the selector, then a name
/// that reads as the same day number ("5" for "05").
pub fn resolve_day_sheet(sheet_names: &[String], day: &str) -> Result<String, ReconError> {
    let day = day.trim();

    if let Some(name) = sheet_names.iter().find(|n| n.as_str() == day) {
        return Ok(name.clone());
    }
    if let Some(name) = sheet_names.iter().find(|n| n.contains(day)) {
        log::debug!("day '{day}': using sheet '{name}' (name contains selector)");
        return Ok(name.clone());
    }
    if let Ok(wanted) = day.parse::<u32>() {
        if let Some(name) = sheet_names
            .iter()
            .find(|n| n.trim().parse::<u32>().ok() == Some(wanted))
        {
            log::debug!("day '{day}': using sheet '{name}' (same day number)");
            return Ok(name.clone());
        }
    }

    Err(ReconError::SheetNotFound {
        day: day.to_string(),
        available: sheet_names.to_vec(),
    })
}

/// Parse a day list such as `"05,06,09"`, `"05-08"` or `"1, 3-4"`.
///
/// Selectors come back zero-padded, deduplicated, in first-seen order.
pub fn parse_day_selection(input: &str) -> Result<Vec<String>, ReconError> {
    let mut days: Vec<u32> = Vec::new();

    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => (parse_day(a, part)?, parse_day(b, part)?),
            None => {
                let d = parse_day(part, part)?;
                (d, d)
            }
        };
        if start > end {
            return Err(ReconError::InvalidDate(format!("day range '{part}' runs backwards")));
        }
        for d in start..=end {
            if !days.contains(&d) {
                days.push(d);
            }
        }
    }

    if days.is_empty() {
        return Err(ReconError::InvalidDate(format!("no days in selection '{input}'")));
    }
    Ok(days.into_iter().map(|d| format!("{d:02}")).collect())
}

fn parse_day(raw: &str, part: &str) -> Result<u32, ReconError> {
    match raw.trim().parse::<u32>() {
        Ok(d) if (1..=31).contains(&d) => Ok(d),
        _ => Err(ReconError::InvalidDate(format!("'{part}' is not a day of month (01-31)"))),
    }
}
