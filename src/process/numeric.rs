// src/process/numeric.rs
use once_cell::sync::Lazy;
use regex::Regex;

/// Dot-only values that look like Italian thousands grouping, e.g. `12.345`.
static DOT_GROUPING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-+]?[1-9]\d{0,2}(\.\d{3})+$").unwrap());

/// How a lone `.` (no `,` in the same cell) is read, decided once per column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DotRule {
    Decimal,
    Thousands,
}

fn strip_spaces(raw: &str) -> String {
    raw.chars().filter(|c| *c != ' ' && *c != '\u{a0}').collect()
}

fn looks_numeric(v: &str) -> bool {
    v.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
}

/// Thousands only if every numeric dot-only cell of the column is grouped in threes.
pub fn dot_rule_for<'a, I>(values: I) -> DotRule
where
    I: IntoIterator<Item = &'a str>,
{
    let mut saw_dotted = false;
    for raw in values {
        let v = strip_spaces(raw);
        if v.contains(',') || !v.contains('.') || !looks_numeric(&v) {
            continue;
        }
        if !DOT_GROUPING.is_match(&v) {
            return DotRule::Decimal;
        }
        saw_dotted = true;
    }
    if saw_dotted {
        DotRule::Thousands
    } else {
        DotRule::Decimal
    }
}

/// European-locale number parse:
/// - spaces are dropped
/// - `.` and `,` together: `.` groups thousands, `,` is the decimal mark
/// - `,` alone is the decimal mark
/// - `.` alone follows `rule`
///
/// Returns `None` for anything that is not a finite number.
pub fn coerce_european(raw: &str, rule: DotRule) -> Option<f64> {
    let v = strip_spaces(raw);
    if v.is_empty() {
        return None;
    }
    let has_dot = v.contains('.');
    let has_comma = v.contains(',');
    let normalized = match (has_dot, has_comma) {
        (true, true) => v.replace('.', "").replace(',', "."),
        (false, true) => v.replace(',', "."),
        (true, false) if rule == DotRule::Thousands => v.replace('.', ""),
        _ => v,
    };
    normalized.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Coerce a whole column; returns the values plus the share of non-null
/// inputs that parsed.
pub fn coerce_column(cells: &[Option<String>]) -> (Vec<Option<f64>>, f64) {
    let rule = dot_rule_for(cells.iter().flatten().map(String::as_str));
    let mut total = 0usize;
    let mut parsed = 0usize;
    let out = cells
        .iter()
        .map(|cell| {
            let cell = cell.as_deref()?;
            total += 1;
            let v = coerce_european(cell, rule);
            if v.is_some() {
                parsed += 1;
            }
            v
        })
        .collect();
    (out, coverage(parsed, total))
}

pub(crate) fn coverage(parsed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        parsed as f64 / total as f64
    }
}
