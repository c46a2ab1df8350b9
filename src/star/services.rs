// src/star/services.rs
use anyhow::Result;
use arrow::{
    array::{ArrayRef, Float64Array, Int64Array},
    datatypes::{DataType, Field, Schema},
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::{info, warn};

use super::dim_place::PlaceDimension;
use super::facts::{
    aggregate, as_count, join_dimensions, keys_of, outer_union, read_source, FactReport, Grouped, Metric, Reducer,
    YearBinding,
};
use super::frame::Frame;
use crate::config::{ServiceSource, ServicesConfig};
use crate::store::{TableRow, TableStore};

pub const FACT_SERVICES_TABLE: &str = "fact_servizi";

#[derive(Debug, Clone, PartialEq)]
pub struct ServicesRow {
    pub id_nil: i64,
    pub id_tempo: i64,
    pub numero_scuole: Option<i64>,
    pub numero_mercati: Option<i64>,
    pub indice_verde_medio: Option<f64>,
}

impl TableRow for ServicesRow {
    const TABLE: &'static str = FACT_SERVICES_TABLE;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id_nil", DataType::Int64, false),
            Field::new("id_tempo", DataType::Int64, false),
            Field::new("numero_scuole", DataType::Int64, true),
            Field::new("numero_mercati", DataType::Int64, true),
            Field::new("indice_verde_medio", DataType::Float64, true),
        ])
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.id_nil))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.id_tempo))),
            Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.numero_scuole))),
            Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.numero_mercati))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.indice_verde_medio))),
        ]
    }
}

/// Aggregate one service source into a single metric column. A missing
/// table or key column contributes no groups.
fn service_part<S: TableStore>(
    store: &S,
    src: &ServiceSource,
    metric_name: &str,
    snapshot_year: i64,
    report: &mut FactReport,
) -> Result<Grouped> {
    let empty = Grouped {
        metrics: vec![metric_name.to_string()],
        ..Grouped::default()
    };
    let Some(batch) = read_source(store, &src.table, report)? else {
        return Ok(empty);
    };
    let frame = Frame::new(&batch);
    let year = match &src.year_column {
        Some(col) => YearBinding::Column(col),
        None => YearBinding::Fixed(snapshot_year),
    };
    let Some(keys) = keys_of(&frame, &src.name_column, year) else {
        warn!(source = %src.table, name = %src.name_column, "name or year column missing");
        report.missing_sources.push(src.table.clone());
        return Ok(empty);
    };
    let metric = match &src.value_column {
        Some(col) => Metric::from_column(&frame, col, metric_name, Reducer::Mean),
        None => Metric::count(metric_name),
    };
    Ok(aggregate(&keys, &[metric]))
}

/// `None` only when neither market count is known.
fn markets_total(covered: Option<f64>, weekly: Option<f64>) -> Option<i64> {
    match (covered, weekly) {
        (None, None) => None,
        (c, w) => as_count(Some(c.unwrap_or(0.0) + w.unwrap_or(0.0))),
    }
}

/// Services per (NIL, year): schools by school year, market counts and the
/// mean green index at the snapshot year. Per-source aggregates are
/// outer-unioned before the dimension join so a NIL missing one source still
/// appears.
#[tracing::instrument(level = "info", skip_all, fields(snapshot_year = cfg.snapshot_year))]
pub fn build_services<S: TableStore>(
    store: &S,
    cfg: &ServicesConfig,
    place: &PlaceDimension,
    years: &BTreeSet<i64>,
) -> Result<(Vec<ServicesRow>, FactReport)> {
    let mut report = FactReport::new(FACT_SERVICES_TABLE);
    let y = cfg.snapshot_year;
    let parts = vec![
        service_part(store, &cfg.schools, "numero_scuole", y, &mut report)?,
        service_part(store, &cfg.covered_markets, "numero_mercati_coperti", y, &mut report)?,
        service_part(store, &cfg.weekly_markets, "numero_mercati_settimanali", y, &mut report)?,
        service_part(store, &cfg.green, "indice_verde_medio", y, &mut report)?,
    ];
    let unioned = outer_union(parts);

    let rows: Vec<ServicesRow> = join_dimensions(unioned, place, years, &mut report)
        .into_iter()
        .map(|g| ServicesRow {
            id_nil: g.id_nil,
            id_tempo: g.id_tempo,
            numero_scuole: as_count(g.values[0]),
            numero_mercati: markets_total(g.values[1], g.values[2]),
            indice_verde_medio: g.values[3],
        })
        .collect();
    info!(rows = rows.len(), join_misses = report.join_misses, "fact_servizi built");
    Ok((rows, report))
}
