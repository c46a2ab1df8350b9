// src/star/dim_time.rs
use anyhow::Result;
use arrow::{
    array::{ArrayRef, Int64Array, StringArray},
    datatypes::{DataType, Field, Schema},
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::debug;

use super::frame::Frame;
use crate::config::YearSource;
use crate::process::year::extract_year;
use crate::store::{TableRow, TableStore};

pub const DIM_TIME_TABLE: &str = "dim_tempo";

/// One calendar year; the year doubles as id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeRow {
    pub id_tempo: i64,
    pub anno: i64,
    /// `YYYY-01-01`
    pub data: String,
}

impl TimeRow {
    pub fn for_year(year: i64) -> Self {
        Self {
            id_tempo: year,
            anno: year,
            data: format!("{:04}-01-01", year),
        }
    }
}

impl TableRow for TimeRow {
    const TABLE: &'static str = DIM_TIME_TABLE;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id_tempo", DataType::Int64, false),
            Field::new("anno", DataType::Int64, false),
            Field::new("data", DataType::Utf8, false),
        ])
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.id_tempo))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.anno))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.data.as_str()))),
        ]
    }
}

/// Years found in the designated (table, column) pairs. Missing tables or
/// columns are skipped.
pub fn scan_year_sources<S: TableStore>(store: &S, sources: &[YearSource]) -> Result<BTreeSet<i64>> {
    let mut years = BTreeSet::new();
    for src in sources {
        let Some(batch) = store.read_table(&src.table)? else {
            debug!(table = %src.table, "year source table missing, skipped");
            continue;
        };
        let Some(values) = Frame::new(&batch).scalars(&src.column) else {
            debug!(table = %src.table, column = %src.column, "year source column missing, skipped");
            continue;
        };
        let before = years.len();
        years.extend(values.iter().filter_map(extract_year));
        debug!(table = %src.table, new_years = years.len() - before, "year source scanned");
    }
    Ok(years)
}

/// Sorted time rows for `years`; never empty.
pub fn build_time_rows(mut years: BTreeSet<i64>, fallback_year: i64) -> Vec<TimeRow> {
    if years.is_empty() {
        years.insert(fallback_year);
    }
    years.into_iter().map(TimeRow::for_year).collect()
}
