// src/validate.rs
//! Data-quality checks over staged and star tables.
//!
//! Every table gets the generic checks (emptiness, duplicate rows, all-null
//! columns, numeric range). Tables that look NIL-keyed also get the name,
//! geometry and year checks. Nothing here fails a run: findings land in the
//! run report as per-table issues plus a 0..100 quality score.

use anyhow::Result;
use arrow::{
    array::Array,
    datatypes::DataType,
    record_batch::RecordBatch,
    row::{RowConverter, SortField},
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::{debug, info, warn};

use crate::process::names::normalize_name;
use crate::star::{
    frame::Frame, DIM_PLACE_TABLE, DIM_TIME_TABLE, FACT_DEMOGRAPHICS_TABLE, FACT_HOUSING_TABLE,
    FACT_SERVICES_TABLE,
};
use crate::store::TableStore;

/// Star tables that must exist after a build.
pub const STAR_TABLES: [&str; 5] = [
    DIM_PLACE_TABLE,
    DIM_TIME_TABLE,
    FACT_DEMOGRAPHICS_TABLE,
    FACT_HOUSING_TABLE,
    FACT_SERVICES_TABLE,
];

const FEW_ROWS: usize = 5;
const DUPLICATE_ERROR_PCT: f64 = 50.0;
const DUPLICATE_WARNING_PCT: f64 = 10.0;
const MAX_NUMERIC_SPAN: f64 = 1e15;
const MIN_PLAUSIBLE_YEAR: i64 = 1900;
const MAX_PLAUSIBLE_YEAR: i64 = 2030;
/// Unknown names are only reported once a table has more distinct names than this.
const MIN_NAMES_FOR_UNKNOWN_CHECK: usize = 5;
const UNKNOWN_SAMPLE: usize = 5;

const NIL_HINTS: [&str; 3] = ["nil", "quartiere", "zona"];
const NAME_CANDIDATES: [&str; 4] = ["nil", "quartiere", "nil_norm", "nome_nil"];
const GEOMETRY_COLUMNS: [&str; 2] = ["geometry", "_geometry"];
const COORDINATE_COLUMNS: [&str; 4] = ["lat", "lng", "latitude", "longitude"];
const PLACEHOLDER_NAMES: [&str; 4] = ["N/A", "ND", "-", "NA"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    pub message: String,
}

/// Checks and stats for one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableValidation {
    pub table: String,
    pub rows: usize,
    pub columns: usize,
    pub null_percentage: f64,
    pub duplicate_rows: usize,
    /// Distinct normalized names, when a name column was found.
    pub unique_nils: Option<usize>,
    pub has_geometry: bool,
    /// Min and max per year-like column.
    pub year_ranges: BTreeMap<String, (i64, i64)>,
    pub issues: Vec<ValidationIssue>,
    pub is_valid: bool,
}

impl TableValidation {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            rows: 0,
            columns: 0,
            null_percentage: 0.0,
            duplicate_rows: 0,
            unique_nils: None,
            has_geometry: false,
            year_ranges: BTreeMap::new(),
            issues: Vec::new(),
            is_valid: true,
        }
    }

    fn error(&mut self, column: Option<&str>, message: String) {
        self.issues.push(ValidationIssue {
            severity: Severity::Error,
            column: column.map(str::to_string),
            message,
        });
    }

    fn warning(&mut self, column: Option<&str>, message: String) {
        self.issues.push(ValidationIssue {
            severity: Severity::Warning,
            column: column.map(str::to_string),
            message,
        });
    }

    pub fn errors(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Error).count()
    }

    pub fn warnings(&self) -> usize {
        self.issues.iter().filter(|i| i.severity == Severity::Warning).count()
    }
}

/// Every table's checks plus the run-level summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub tables: Vec<TableValidation>,
    pub validation_passed: usize,
    pub validation_failed: usize,
    pub total_errors: usize,
    pub total_warnings: usize,
    pub quality_score: f64,
}

impl ValidationReport {
    pub fn from_tables(tables: Vec<TableValidation>) -> Self {
        let passed = tables.iter().filter(|t| t.is_valid).count();
        let total_errors = tables.iter().map(TableValidation::errors).sum();
        let total_warnings = tables.iter().map(TableValidation::warnings).sum();
        let quality_score = quality_score(&tables);
        Self {
            validation_failed: tables.len() - passed,
            validation_passed: passed,
            total_errors,
            total_warnings,
            quality_score,
            tables,
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableValidation> {
        self.tables.iter().find(|t| t.table == name)
    }
}

/// 100, minus 5 per table over 50% null (2 over 20%), 5 per invalid table,
/// 2 per error and 0.5 per warning; clamped to 0..=100.
pub fn quality_score(tables: &[TableValidation]) -> f64 {
    let mut score = 100.0;
    for t in tables {
        if t.null_percentage > 50.0 {
            score -= 5.0;
        } else if t.null_percentage > 20.0 {
            score -= 2.0;
        }
        if !t.is_valid {
            score -= 5.0;
        }
        score -= t.errors() as f64 * 2.0;
        score -= t.warnings() as f64 * 0.5;
    }
    f64::clamp(score, 0.0, 100.0)
}

/// Validate the star tables, then every staged table in `staged`.
///
/// 1) known names come from `dim_nil.nil_norm`, when the dimension exists
/// 2) a missing star table is an invalid entry; a missing staged table is skipped
/// 3) summarize into a [`ValidationReport`]
#[tracing::instrument(level = "info", skip_all, fields(staged = staged.len()))]
pub fn validate_store<S: TableStore>(store: &S, staged: &[String]) -> Result<ValidationReport> {
    // 1) known names
    let known: Option<BTreeSet<String>> = store.read_table(DIM_PLACE_TABLE)?.and_then(|dim| {
        Frame::new(&dim)
            .text("nil_norm")
            .map(|names| names.into_iter().flatten().collect())
    });

    // 2) tables
    let mut tables = Vec::with_capacity(STAR_TABLES.len() + staged.len());
    for name in STAR_TABLES {
        match store.read_table(name)? {
            Some(batch) => tables.push(validate_table(name, &batch, known.as_ref())),
            None => {
                let mut missing = TableValidation::new(name);
                missing.error(None, "table missing".into());
                missing.is_valid = false;
                tables.push(missing);
            }
        }
    }
    for name in staged {
        let Some(batch) = store.read_table(name)? else {
            debug!(table = %name, "staged table not in store, skipped");
            continue;
        };
        tables.push(validate_table(name, &batch, known.as_ref()));
    }

    // 3) summary
    let report = ValidationReport::from_tables(tables);
    info!(
        passed = report.validation_passed,
        failed = report.validation_failed,
        errors = report.total_errors,
        warnings = report.total_warnings,
        score = report.quality_score,
        "validation complete"
    );
    Ok(report)
}

/// Run every applicable check against one table.
pub fn validate_table(name: &str, batch: &RecordBatch, known: Option<&BTreeSet<String>>) -> TableValidation {
    let mut v = TableValidation::new(name);
    let frame = Frame::new(batch);
    let schema = batch.schema_ref();
    v.rows = batch.num_rows();
    v.columns = batch.num_columns();
    let cells = v.rows * v.columns;
    if cells > 0 {
        let nulls: usize = batch.columns().iter().map(|c| c.null_count()).sum();
        v.null_percentage = nulls as f64 / cells as f64 * 100.0;
    }

    // emptiness
    if v.rows == 0 {
        v.error(None, "table is empty".into());
    } else if v.rows < FEW_ROWS {
        v.warning(None, format!("only {} rows", v.rows));
    }

    // duplicates
    v.duplicate_rows = duplicate_rows(batch);
    if v.duplicate_rows > 0 {
        let pct = v.duplicate_rows as f64 / v.rows as f64 * 100.0;
        let message = format!("{} duplicate rows ({:.1}%)", v.duplicate_rows, pct);
        if pct > DUPLICATE_ERROR_PCT {
            v.error(None, message);
        } else if pct > DUPLICATE_WARNING_PCT {
            v.warning(None, message);
        }
    }

    // all-null columns
    if v.rows > 0 {
        let null_columns: Vec<String> = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .filter(|(_, c)| c.null_count() == c.len())
            .map(|(f, _)| f.name().clone())
            .collect();
        if !null_columns.is_empty() {
            v.warning(None, format!("all-null columns: {}", null_columns.join(", ")));
        }
    }

    // numeric span
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        if !column.data_type().is_numeric() {
            continue;
        }
        let Some((min, max)) = frame.numbers(field.name()).and_then(|n| min_max(n.into_iter().flatten())) else {
            continue;
        };
        if (max - min).abs() > MAX_NUMERIC_SPAN {
            v.warning(Some(field.name()), "very wide numeric range".into());
        }
    }

    if is_place_keyed(name, batch) {
        check_names(&mut v, &frame, batch, known);
        check_geometry(&mut v, batch);
        check_years(&mut v, &frame, batch);
    }

    v.is_valid = v.errors() == 0;
    if !v.is_valid {
        warn!(table = %name, errors = v.errors(), "table failed validation");
    }
    debug!(table = %name, warnings = v.warnings(), "table validated");
    v
}

/// Rows that repeat an earlier row across every column.
pub fn duplicate_rows(batch: &RecordBatch) -> usize {
    if batch.num_rows() == 0 || batch.num_columns() == 0 {
        return 0;
    }
    let fields = batch
        .schema_ref()
        .fields()
        .iter()
        .map(|f| SortField::new(f.data_type().clone()))
        .collect();
    let rows = match RowConverter::new(fields).and_then(|c| c.convert_columns(batch.columns())) {
        Ok(rows) => rows,
        Err(e) => {
            debug!(error = %e, "row conversion failed, duplicates not counted");
            return 0;
        }
    };
    let mut seen = HashSet::with_capacity(rows.num_rows());
    rows.iter().filter(|r| !seen.insert(*r)).count()
}

fn is_place_keyed(name: &str, batch: &RecordBatch) -> bool {
    let lower = name.to_lowercase();
    NIL_HINTS.iter().any(|h| lower.contains(h))
        || batch
            .schema_ref()
            .fields()
            .iter()
            .any(|f| NIL_HINTS.iter().any(|h| f.name().to_lowercase().contains(h)))
}

/// First text column that names a place: exact candidates, then any column
/// mentioning "nil" or "quartier".
fn name_column(batch: &RecordBatch) -> Option<String> {
    let text: Vec<&str> = batch
        .schema_ref()
        .fields()
        .iter()
        .filter(|f| matches!(f.data_type(), DataType::Utf8 | DataType::LargeUtf8))
        .map(|f| f.name().as_str())
        .collect();
    NAME_CANDIDATES
        .iter()
        .find(|c| text.contains(c))
        .map(|c| c.to_string())
        .or_else(|| {
            text.iter()
                .find(|n| {
                    let lower = n.to_lowercase();
                    lower.contains("nil") || lower.contains("quartier")
                })
                .map(|n| n.to_string())
        })
}

fn check_names(v: &mut TableValidation, frame: &Frame, batch: &RecordBatch, known: Option<&BTreeSet<String>>) {
    let Some(column) = name_column(batch) else {
        // fact tables carry the surrogate key instead of a name
        if !frame.has_column("id_nil") {
            v.warning(None, "no NIL name column found".into());
        }
        return;
    };
    let names: BTreeSet<String> = frame
        .text(&column)
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .map(|n| normalize_name(&n))
        .collect();
    v.unique_nils = Some(names.len());

    let Some(known) = known else { return };
    if names.len() <= MIN_NAMES_FOR_UNKNOWN_CHECK {
        return;
    }
    let unknown: Vec<&String> = names
        .iter()
        .filter(|n| !n.is_empty() && !PLACEHOLDER_NAMES.contains(&n.as_str()) && !known.contains(*n))
        .collect();
    // a mostly-unknown column is a different naming scheme, not a few typos
    if !unknown.is_empty() && (unknown.len() as f64) < names.len() as f64 * 0.5 {
        let sample: Vec<&str> = unknown.iter().take(UNKNOWN_SAMPLE).map(|n| n.as_str()).collect();
        v.warning(
            Some(&column),
            format!("{} names not in dim_nil: {}", unknown.len(), sample.join(", ")),
        );
    }
}

fn check_geometry(v: &mut TableValidation, batch: &RecordBatch) {
    v.has_geometry = GEOMETRY_COLUMNS
        .iter()
        .chain(COORDINATE_COLUMNS.iter())
        .any(|c| batch.column_by_name(c).is_some());
    let geometry = GEOMETRY_COLUMNS
        .iter()
        .find_map(|c| batch.column_by_name(c).map(|col| (*c, col)));
    if let Some((name, col)) = geometry {
        if col.null_count() > 0 {
            v.warning(Some(name), format!("{} missing geometries", col.null_count()));
        }
    }
}

fn check_years(v: &mut TableValidation, frame: &Frame, batch: &RecordBatch) {
    let columns: Vec<String> = batch
        .schema_ref()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .filter(|n| {
            let lower = n.to_lowercase();
            lower.contains("anno") || lower.contains("year")
        })
        .collect();
    for column in columns {
        let Some((min, max)) = frame
            .numbers(&column)
            .and_then(|n| min_max(n.into_iter().flatten()))
        else {
            continue;
        };
        let (min, max) = (min as i64, max as i64);
        v.year_ranges.insert(column.clone(), (min, max));
        if min < MIN_PLAUSIBLE_YEAR {
            v.warning(Some(&column), format!("suspicious minimum year {}", min));
        }
        if max > MAX_PLAUSIBLE_YEAR {
            v.warning(Some(&column), format!("suspicious maximum year {}", max));
        }
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, x| match acc {
        None => Some((x, x)),
        Some((lo, hi)) => Some((lo.min(x), hi.max(x))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
    use std::sync::Arc;

    fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
        RecordBatch::try_from_iter(columns).unwrap()
    }

    fn text(values: Vec<Option<&str>>) -> ArrayRef {
        Arc::new(StringArray::from(values))
    }

    fn ints(values: Vec<Option<i64>>) -> ArrayRef {
        Arc::new(Int64Array::from(values))
    }

    fn known(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn empty_and_small_tables() {
        let empty = batch(vec![("x", ints(vec![]))]);
        let v = validate_table("t", &empty, None);
        assert!(!v.is_valid);
        assert_eq!(v.errors(), 1);

        let small = batch(vec![("x", ints(vec![Some(1), Some(2)]))]);
        let v = validate_table("t", &small, None);
        assert!(v.is_valid);
        assert_eq!(v.warnings(), 1);
        assert_eq!(v.null_percentage, 0.0);
    }

    #[test]
    fn duplicate_thresholds() {
        let rows = |values: Vec<i64>| batch(vec![("x", ints(values.into_iter().map(Some).collect()))]);

        // 6 of 10 rows repeat an earlier one
        let v = validate_table("t", &rows(vec![1, 1, 1, 1, 2, 2, 2, 3, 3, 4]), None);
        assert_eq!(v.duplicate_rows, 6);
        assert!(!v.is_valid);

        // 2 of 10
        let v = validate_table("t", &rows(vec![1, 1, 2, 2, 3, 4, 5, 6, 7, 8]), None);
        assert_eq!(v.duplicate_rows, 2);
        assert!(v.is_valid);
        assert_eq!(v.warnings(), 1);

        // 1 of 10 stays quiet
        let v = validate_table("t", &rows(vec![1, 1, 2, 3, 4, 5, 6, 7, 8, 9]), None);
        assert_eq!(v.duplicate_rows, 1);
        assert!(v.issues.is_empty());
    }

    #[test]
    fn duplicates_compare_whole_rows() {
        let b = batch(vec![
            ("a", ints(vec![Some(1), Some(1), None, None])),
            ("b", text(vec![Some("x"), Some("y"), None, None])),
        ]);
        assert_eq!(duplicate_rows(&b), 1);
    }

    #[test]
    fn null_columns_and_percentage() {
        let b = batch(vec![
            ("a", ints(vec![Some(1), Some(2), Some(3), Some(4), Some(5)])),
            ("vuota", text(vec![None, None, None, None, None])),
        ]);
        let v = validate_table("t", &b, None);
        assert_eq!(v.null_percentage, 50.0);
        assert_eq!(v.issues.len(), 1);
        assert!(v.issues[0].message.contains("vuota"));
    }

    #[test]
    fn wide_numeric_span_is_flagged() {
        let values: ArrayRef = Arc::new(Float64Array::from(vec![0.0, 1.0, 2.0, 3.0, 2e15]));
        let v = validate_table("t", &batch(vec![("v", values)]), None);
        assert_eq!(v.issues.len(), 1);
        assert_eq!(v.issues[0].column.as_deref(), Some("v"));
    }

    #[test]
    fn place_checks_names_geometry_and_years() {
        let dim = known(&["BRERA", "DUOMO", "ISOLA", "SARPI", "TICINESE", "NAVIGLI", "GRECO"]);
        let b = batch(vec![
            (
                "quartiere",
                text(vec![
                    Some("Brera"),
                    Some("duomo"),
                    Some("Isola"),
                    Some("Sarpi"),
                    Some("Ticinese"),
                    Some("Navigli"),
                    Some("Atlantide"),
                    Some("N/A"),
                ]),
            ),
            (
                "anno",
                ints(vec![Some(1890), Some(2020), Some(2020), Some(2021), Some(2021), Some(2022), Some(2022), Some(2035)]),
            ),
            ("geometry", text(vec![Some("{}"), None, Some("{}"), Some("{}"), Some("{}"), Some("{}"), Some("{}"), Some("{}")])),
        ]);
        let v = validate_table("ds_01_demo", &b, Some(&dim));
        assert_eq!(v.unique_nils, Some(8));
        assert!(v.has_geometry);
        assert_eq!(v.year_ranges.get("anno"), Some(&(1890, 2035)));

        let messages: Vec<&str> = v.issues.iter().map(|i| i.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("ATLANTIDE") && !m.contains("N/A")));
        assert!(messages.iter().any(|m| m.contains("1 missing geometries")));
        assert!(messages.iter().any(|m| m.contains("minimum year 1890")));
        assert!(messages.iter().any(|m| m.contains("maximum year 2035")));
        assert!(v.is_valid);
    }

    #[test]
    fn mostly_unknown_names_are_not_reported() {
        let dim = known(&["BRERA"]);
        let names: Vec<Option<&str>> = vec![Some("A"), Some("B"), Some("C"), Some("D"), Some("E"), Some("Brera")];
        let v = validate_table("zone", &batch(vec![("nil", text(names))]), Some(&dim));
        assert_eq!(v.unique_nils, Some(6));
        assert!(v.issues.iter().all(|i| i.column.is_none()));
    }

    #[test]
    fn fact_tables_keyed_by_id_need_no_name_column() {
        let b = batch(vec![
            ("id_nil", ints(vec![Some(1), Some(2), Some(3), Some(4), Some(5)])),
            ("id_tempo", ints(vec![Some(2020); 5])),
        ]);
        let v = validate_table(FACT_HOUSING_TABLE, &b, None);
        assert_eq!(v.unique_nils, None);
        assert!(v.issues.is_empty());

        let ids = ints(vec![Some(1), Some(2), Some(3), Some(4), Some(5)]);
        let v = validate_table("ds_zona_x", &batch(vec![("x", ids)]), None);
        assert!(v.issues.iter().any(|i| i.message.contains("no NIL name column")));
    }

    #[test]
    fn score_penalties_and_clamp() {
        let mut clean = TableValidation::new("a");
        clean.rows = 10;
        assert_eq!(quality_score(&[clean.clone()]), 100.0);

        let mut bad = TableValidation::new("b");
        bad.null_percentage = 30.0;
        bad.error(None, "x".into());
        bad.warning(None, "y".into());
        bad.is_valid = false;
        // 100 - 2 (nulls) - 5 (invalid) - 2 (error) - 0.5 (warning)
        assert_eq!(quality_score(&[clean, bad.clone()]), 90.5);

        let many = vec![bad; 20];
        assert_eq!(quality_score(&many), 0.0);
    }

    #[test]
    fn store_validation_covers_star_and_staged_tables() -> Result<()> {
        let store = MemoryStore::new();
        let dim = batch(vec![
            ("id_nil", ints(vec![Some(1), Some(2)])),
            ("nil", text(vec![Some("Brera"), Some("Duomo")])),
            ("nil_norm", text(vec![Some("BRERA"), Some("DUOMO")])),
        ]);
        store.replace_table(DIM_PLACE_TABLE, &dim)?;
        store.replace_table("ds_raw", &batch(vec![("x", ints(vec![Some(1)]))]))?;

        let report = validate_store(&store, &["ds_raw".to_string(), "ds_gone".to_string()])?;
        assert_eq!(report.tables.len(), 6);
        assert_eq!(report.table(DIM_PLACE_TABLE).map(|t| t.unique_nils), Some(Some(2)));
        let missing = report.table(FACT_SERVICES_TABLE).unwrap();
        assert!(!missing.is_valid);
        assert_eq!(report.validation_failed, 4);
        assert_eq!(report.validation_passed, 2);
        assert!(report.table("ds_gone").is_none());
        assert!(report.quality_score < 100.0);
        Ok(())
    }
}
