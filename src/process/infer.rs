// src/process/infer.rs
use tracing::debug;

use super::date_parser::parse_date_column;
use super::numeric::coerce_column;
use super::raw_table::RawColumn;

pub const IDENTIFIER_HINTS: &[&str] = &["id", "cod", "codice", "istat", "cap", "civico"];
pub const DATE_HINTS: &[&str] = &["data", "date"];
pub const YEAR_HINTS: &[&str] = &["anno", "year"];

const DATE_COVERAGE: f64 = 0.8;
const NUMERIC_COVERAGE: f64 = 0.9;

/// The type a column is given once, at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Code-like text that must never be coerced (leading zeros, mixed formats).
    Identifier,
    Date,
    Year,
    /// `integral` only for native JSON integer columns.
    Numeric { integral: bool },
    Text,
}

/// Values of a column after coercion, one variant per storage type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValues {
    Text(Vec<Option<String>>),
    Float(Vec<Option<f64>>),
    Int(Vec<Option<i64>>),
    /// Epoch milliseconds.
    Timestamp(Vec<Option<i64>>),
}

impl TypedValues {
    pub fn is_all_null(&self) -> bool {
        match self {
            TypedValues::Text(v) => v.iter().all(Option::is_none),
            TypedValues::Float(v) => v.iter().all(Option::is_none),
            TypedValues::Int(v) | TypedValues::Timestamp(v) => v.iter().all(Option::is_none),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferredColumn {
    pub name: String,
    pub kind: ColumnKind,
    pub values: TypedValues,
}

fn has_hint(name: &str, hints: &[&str]) -> bool {
    let lower = name.to_lowercase();
    hints.iter().any(|h| lower.contains(h))
}

/// Decide and apply the type of one column. Never fails: cells that do not
/// convert become null.
pub fn infer_column(col: RawColumn) -> InferredColumn {
    let RawColumn {
        name,
        cells,
        native_numeric,
    } = col;

    // 1) already numeric, or nothing to look at
    if native_numeric {
        return native_numeric_column(name, &cells);
    }
    if cells.iter().all(Option::is_none) {
        return text_column(name, ColumnKind::Text, cells);
    }

    // 2) date hint
    if has_hint(&name, DATE_HINTS) {
        if let Some(ms) = parse_date_column(&cells, DATE_COVERAGE) {
            debug!(column = %name, "date by hint");
            return InferredColumn {
                name,
                kind: ColumnKind::Date,
                values: TypedValues::Timestamp(ms),
            };
        }
    }

    // 3) year hint
    if has_hint(&name, YEAR_HINTS) {
        let (nums, cov) = coerce_column(&cells);
        if cov >= NUMERIC_COVERAGE {
            let years = nums
                .into_iter()
                .map(|v| v.map(|f| f.round_ties_even() as i64))
                .collect();
            return InferredColumn {
                name,
                kind: ColumnKind::Year,
                values: TypedValues::Int(years),
            };
        }
    }

    // 4) identifiers stay text
    if has_hint(&name, IDENTIFIER_HINTS) {
        return text_column(name, ColumnKind::Identifier, cells);
    }

    // 5) generic numeric, then date, then text
    let (nums, cov) = coerce_column(&cells);
    if cov >= NUMERIC_COVERAGE {
        return InferredColumn {
            name,
            kind: ColumnKind::Numeric { integral: false },
            values: TypedValues::Float(nums),
        };
    }
    if let Some(ms) = parse_date_column(&cells, DATE_COVERAGE) {
        return InferredColumn {
            name,
            kind: ColumnKind::Date,
            values: TypedValues::Timestamp(ms),
        };
    }
    text_column(name, ColumnKind::Text, cells)
}

/// Geometry and other passthrough columns.
pub fn text_column(name: String, kind: ColumnKind, cells: Vec<Option<String>>) -> InferredColumn {
    InferredColumn {
        name,
        kind,
        values: TypedValues::Text(cells),
    }
}

fn native_numeric_column(name: String, cells: &[Option<String>]) -> InferredColumn {
    let ints: Option<Vec<Option<i64>>> = cells
        .iter()
        .map(|c| match c {
            None => Some(None),
            Some(s) => s.parse::<i64>().ok().map(Some),
        })
        .collect();
    if let Some(ints) = ints {
        return InferredColumn {
            name,
            kind: ColumnKind::Numeric { integral: true },
            values: TypedValues::Int(ints),
        };
    }
    let floats = cells
        .iter()
        .map(|c| c.as_deref().and_then(|s| s.parse::<f64>().ok()))
        .collect();
    InferredColumn {
        name,
        kind: ColumnKind::Numeric { integral: false },
        values: TypedValues::Float(floats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, v: &[Option<&str>]) -> RawColumn {
        RawColumn::text(name, v.iter().map(|c| c.map(str::to_string)).collect())
    }

    #[test]
    fn cap_stays_text() {
        let out = infer_column(col("cap", &[Some("20100"), Some("20121")]));
        assert_eq!(out.kind, ColumnKind::Identifier);
        assert_eq!(
            out.values,
            TypedValues::Text(vec![Some("20100".into()), Some("20121".into())])
        );
    }

    #[test]
    fn european_numbers() {
        let out = infer_column(col("importo", &[Some("1.234,56"), Some("987,00")]));
        assert_eq!(out.kind, ColumnKind::Numeric { integral: false });
        assert_eq!(out.values, TypedValues::Float(vec![Some(1234.56), Some(987.0)]));
    }

    #[test]
    fn year_hint_rounds() {
        let out = infer_column(col("anno", &[Some("2020"), Some("2021,0"), None]));
        assert_eq!(out.kind, ColumnKind::Year);
        assert_eq!(out.values, TypedValues::Int(vec![Some(2020), Some(2021), None]));
    }

    #[test]
    fn year_hint_falls_through_on_low_coverage() {
        // school years like "2020/2021" do not coerce, and "anno" is no id hint
        let out = infer_column(col("annoscolastico", &[Some("2020/2021"), Some("2021/2022")]));
        assert_eq!(out.kind, ColumnKind::Text);
    }

    #[test]
    fn date_hint_before_numeric() {
        let out = infer_column(col("data_rilevazione", &[Some("01/02/2020"), Some("15/03/2021")]));
        assert_eq!(out.kind, ColumnKind::Date);
    }

    #[test]
    fn unhinted_dates_after_numeric() {
        let out = infer_column(col("inaugurazione", &[Some("01/02/2020"), Some("15/03/2021")]));
        assert_eq!(out.kind, ColumnKind::Date);
    }

    #[test]
    fn mostly_text_stays_text_with_nulls_kept() {
        let out = infer_column(col("nome", &[Some("Brera"), Some("12"), None]));
        assert_eq!(out.kind, ColumnKind::Text);
        assert_eq!(
            out.values,
            TypedValues::Text(vec![Some("Brera".into()), Some("12".into()), None])
        );
    }

    #[test]
    fn coercion_misses_become_null() {
        let mut cells: Vec<Option<&str>> = vec![Some("1"); 9];
        cells.push(Some("n.d."));
        let out = infer_column(col("valore", &cells));
        match out.values {
            TypedValues::Float(v) => {
                assert_eq!(v.len(), 10);
                assert_eq!(v[9], None);
            }
            other => panic!("expected floats, got {:?}", other),
        }
    }

    #[test]
    fn native_json_numbers_skip_inference() {
        let mut c = col("cap", &[Some("20100"), None]);
        c.native_numeric = true;
        let out = infer_column(c);
        assert_eq!(out.kind, ColumnKind::Numeric { integral: true });
        assert_eq!(out.values, TypedValues::Int(vec![Some(20100), None]));
    }
}
