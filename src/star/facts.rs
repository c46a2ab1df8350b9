// src/star/facts.rs
use anyhow::Result;
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use super::dim_place::PlaceDimension;
use super::frame::Frame;
use crate::process::{names::normalize_opt, year::extract_year};
use crate::store::TableStore;

/// How many unmatched names a report lists.
const UNMATCHED_SAMPLE: usize = 20;

/// Group key: (normalized name, year).
pub type GroupKey = (String, i64);

/// How one metric is reduced within a (place, year) group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    /// Rows in the group.
    Count,
    /// Sum of non-null values; null if there are none.
    Sum,
    /// Mean of non-null values; null if there are none.
    Mean,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    rows: usize,
    sum: f64,
    seen: usize,
}

impl Accumulator {
    fn push(&mut self, value: Option<f64>) {
        self.rows += 1;
        if let Some(v) = value {
            self.sum += v;
            self.seen += 1;
        }
    }

    fn finish(&self, reducer: Reducer) -> Option<f64> {
        match reducer {
            Reducer::Count => Some(self.rows as f64),
            Reducer::Sum => (self.seen > 0).then_some(self.sum),
            Reducer::Mean => (self.seen > 0).then(|| self.sum / self.seen as f64),
        }
    }
}

/// One metric to aggregate: values are `None` when the source column is
/// missing (every group then gets a null, except for `Count`).
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: String,
    pub reducer: Reducer,
    pub values: Option<Vec<Option<f64>>>,
}

impl Metric {
    pub fn count(name: &str) -> Self {
        Self {
            name: name.into(),
            reducer: Reducer::Count,
            values: None,
        }
    }

    pub fn from_column(frame: &Frame<'_>, column: &str, name: &str, reducer: Reducer) -> Self {
        let values = frame.numbers(column);
        if values.is_none() {
            debug!(column, metric = name, "metric column missing, metric will be null");
        }
        Self {
            name: name.into(),
            reducer,
            values,
        }
    }
}

/// Where a source's year comes from.
#[derive(Debug, Clone, Copy)]
pub enum YearBinding<'a> {
    Column(&'a str),
    /// Snapshot sources: every row belongs to one year.
    Fixed(i64),
}

/// Aggregated metrics keyed by (normalized name, year).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grouped {
    pub metrics: Vec<String>,
    pub groups: BTreeMap<GroupKey, Vec<Option<f64>>>,
    pub source_rows: usize,
    /// Rows without a usable name or year.
    pub skipped_rows: usize,
}

/// Normalized names and resolved years of a source, or `None` if the name
/// or year column is missing.
pub fn keys_of(frame: &Frame<'_>, name_column: &str, year: YearBinding<'_>) -> Option<Vec<Option<GroupKey>>> {
    let names = frame.text(name_column)?;
    let years: Vec<Option<i64>> = match year {
        YearBinding::Column(col) => frame.scalars(col)?.iter().map(extract_year).collect(),
        YearBinding::Fixed(y) => vec![Some(y); frame.num_rows()],
    };
    Some(
        names
            .iter()
            .zip(years)
            .map(|(name, year)| {
                let norm = normalize_opt(name.as_deref());
                match (norm.is_empty(), year) {
                    (false, Some(y)) => Some((norm, y)),
                    _ => None,
                }
            })
            .collect(),
    )
}

/// Group rows by key and reduce every metric.
pub fn aggregate(keys: &[Option<GroupKey>], metrics: &[Metric]) -> Grouped {
    let mut accs: BTreeMap<GroupKey, Vec<Accumulator>> = BTreeMap::new();
    let mut skipped_rows = 0;
    for (row, key) in keys.iter().enumerate() {
        let Some(key) = key else {
            skipped_rows += 1;
            continue;
        };
        let slot = accs
            .entry(key.clone())
            .or_insert_with(|| vec![Accumulator::default(); metrics.len()]);
        for (acc, metric) in slot.iter_mut().zip(metrics) {
            let value = metric.values.as_ref().and_then(|v| v.get(row).copied().flatten());
            acc.push(value);
        }
    }

    let groups = accs
        .into_iter()
        .map(|(key, slot)| {
            let values = slot
                .iter()
                .zip(metrics)
                .map(|(acc, m)| match (m.reducer, &m.values) {
                    (Reducer::Count, _) | (_, Some(_)) => acc.finish(m.reducer),
                    (_, None) => None,
                })
                .collect();
            (key, values)
        })
        .collect();

    Grouped {
        metrics: metrics.iter().map(|m| m.name.clone()).collect(),
        groups,
        source_rows: keys.len(),
        skipped_rows,
    }
}

/// Full outer union on the group key: a key missing from one part gets
/// nulls for that part's metrics.
pub fn outer_union(parts: Vec<Grouped>) -> Grouped {
    let widths: Vec<usize> = parts.iter().map(|p| p.metrics.len()).collect();
    let total: usize = widths.iter().sum();
    let mut out = Grouped::default();
    let mut offset = 0;
    for (part, width) in parts.into_iter().zip(widths) {
        out.metrics.extend(part.metrics);
        out.source_rows += part.source_rows;
        out.skipped_rows += part.skipped_rows;
        for (key, values) in part.groups {
            let slot = out.groups.entry(key).or_insert_with(|| vec![None; total]);
            slot[offset..offset + width].copy_from_slice(&values);
        }
        offset += width;
    }
    out
}

/// A group that survived the dimension join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedGroup {
    pub id_nil: i64,
    pub id_tempo: i64,
    pub nil_norm: String,
    pub values: Vec<Option<f64>>,
}

/// Per-fact-table build statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FactReport {
    pub table: String,
    pub sources: Vec<String>,
    pub missing_sources: Vec<String>,
    pub source_rows: usize,
    pub skipped_rows: usize,
    pub groups: usize,
    /// Groups whose name matched no dimension row.
    pub join_misses: usize,
    pub unmatched_names: Vec<String>,
    /// Groups whose year is not in the time dimension.
    pub time_misses: usize,
    pub rows: usize,
}

impl FactReport {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }
}

/// Join groups to the dimensions. Unmatched names and years outside the
/// time dimension are dropped and counted; output is sorted by
/// (id_nil, id_tempo).
pub fn join_dimensions(
    grouped: Grouped,
    place: &PlaceDimension,
    years: &BTreeSet<i64>,
    report: &mut FactReport,
) -> Vec<JoinedGroup> {
    report.source_rows += grouped.source_rows;
    report.skipped_rows += grouped.skipped_rows;
    report.groups += grouped.groups.len();

    let mut unmatched = BTreeSet::new();
    let mut out = Vec::with_capacity(grouped.groups.len());
    for ((nil_norm, year), values) in grouped.groups {
        let Some(id_nil) = place.lookup(&nil_norm) else {
            report.join_misses += 1;
            unmatched.insert(nil_norm);
            continue;
        };
        if !years.contains(&year) {
            report.time_misses += 1;
            continue;
        }
        out.push(JoinedGroup {
            id_nil,
            id_tempo: year,
            nil_norm,
            values,
        });
    }
    out.sort_by_key(|g| (g.id_nil, g.id_tempo));

    if !unmatched.is_empty() {
        warn!(
            table = %report.table,
            groups = report.join_misses,
            names = unmatched.len(),
            "groups without a matching NIL dropped"
        );
    }
    if report.time_misses > 0 {
        warn!(table = %report.table, groups = report.time_misses, "groups outside dim_tempo dropped");
    }
    report.unmatched_names = unmatched.into_iter().take(UNMATCHED_SAMPLE).collect();
    report.rows = out.len();
    out
}

/// Read a fact source; a missing table is recorded and yields `None`.
pub fn read_source<S: TableStore>(store: &S, table: &str, report: &mut FactReport) -> Result<Option<RecordBatch>> {
    let batch = store.read_table(table)?;
    if batch.is_none() {
        warn!(fact = %report.table, source = %table, "source table missing");
        report.missing_sources.push(table.to_string());
    } else {
        report.sources.push(table.to_string());
    }
    Ok(batch)
}

/// Guarded ratio: null unless both sides are known and the denominator is
/// positive.
pub fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d > 0.0 => Some(n / d),
        _ => None,
    }
}

pub fn as_count(v: Option<f64>) -> Option<i64> {
    v.map(|f| f.round() as i64)
}
