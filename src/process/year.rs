// src/process/year.rs
use super::scalar::Scalar;

pub const MIN_YEAR: i64 = 1800;
pub const MAX_YEAR: i64 = 2100;

fn in_range(year: i64) -> Option<i64> {
    (MIN_YEAR..=MAX_YEAR).contains(&year).then_some(year)
}

/// Shared year extraction used by the time dimension and every fact builder.
///
/// 1) a number in [1800, 2100] is the year itself
/// 2) otherwise split the text form on `/` and `-` and take the first
///    4-digit token in range
/// 3) otherwise take the first four of all digit characters, if in range
pub fn extract_year(value: &Scalar) -> Option<i64> {
    match value {
        Scalar::Null => None,
        Scalar::Int(v) => in_range(*v).or_else(|| extract_year_str(&v.to_string())),
        Scalar::Float(v) => {
            if !v.is_finite() {
                return None;
            }
            in_range(v.trunc() as i64).or_else(|| extract_year_str(&format!("{}", v)))
        }
        Scalar::Text(s) => extract_year_str(s),
        Scalar::Timestamp(_) => value.as_text().and_then(|s| extract_year_str(&s)),
    }
}

/// Text half of [`extract_year`].
pub fn extract_year_str(text: &str) -> Option<i64> {
    let dashed = text.replace('/', "-");
    for token in dashed.split('-') {
        let token = token.trim();
        if token.len() == 4 && token.chars().all(|c| c.is_ascii_digit()) {
            if let Some(year) = token.parse().ok().and_then(in_range) {
                return Some(year);
            }
        }
    }

    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.len() >= 4 {
        return digits[..4].parse().ok().and_then(in_range);
    }
    None
}
