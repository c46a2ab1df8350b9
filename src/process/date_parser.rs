use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use super::numeric::coverage;

/// At least one value must look like a date before a column is even tried.
static DATE_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}[/\-]\d{1,2}[/\-]\d{2,4}|\d{4}-\d{2}-\d{2}").unwrap());

/// Day-first before ISO, so `03/04/2020` is the 3rd of April.
const DATE_FORMATS: &[&str] = &[
    "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%y", "%d-%m-%y",
];
/// `%Y` takes one to four digits; anything below this is a two-digit year
/// that belongs to the `%y` formats.
const MIN_FULL_YEAR: i32 = 1000;
const TIME_SUFFIXES: &[&str] = &[" %H:%M:%S", " %H:%M", "T%H:%M:%S", "T%H:%M:%S%.f", " %H:%M:%S%.f"];

/// Parse one cell, day-first and format-flexible.
pub fn parse_day_first(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            if d.year() >= MIN_FULL_YEAR {
                return d.and_hms_opt(0, 0, 0);
            }
        }
        for suffix in TIME_SUFFIXES {
            let full = format!("{}{}", fmt, suffix);
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, &full) {
                if dt.year() >= MIN_FULL_YEAR {
                    return Some(dt);
                }
            }
        }
    }
    None
}

/// Epoch millis, the storage form of a date column.
pub fn to_millis(dt: &NaiveDateTime) -> i64 {
    dt.and_utc().timestamp_millis()
}

pub fn from_millis(ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

/// Try a whole column as dates. Accepted only when the column has a
/// date-shaped value and at least `min_coverage` of the non-null cells parse.
pub fn parse_date_column(cells: &[Option<String>], min_coverage: f64) -> Option<Vec<Option<i64>>> {
    if !cells.iter().flatten().any(|c| DATE_SHAPE.is_match(c)) {
        return None;
    }
    let mut total = 0usize;
    let mut parsed = 0usize;
    let out: Vec<Option<i64>> = cells
        .iter()
        .map(|cell| {
            let cell = cell.as_deref()?;
            total += 1;
            let ms = parse_day_first(cell).map(|dt| to_millis(&dt));
            if ms.is_some() {
                parsed += 1;
            }
            ms
        })
        .collect();
    (coverage(parsed, total) >= min_coverage).then_some(out)
}
