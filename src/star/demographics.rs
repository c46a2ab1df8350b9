// src/star/demographics.rs
use anyhow::Result;
use arrow::{
    array::{ArrayRef, Float64Array, Int64Array},
    datatypes::{DataType, Field, Schema},
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::{info, warn};

use super::dim_place::PlaceDimension;
use super::facts::{aggregate, join_dimensions, keys_of, ratio, read_source, FactReport, Metric, Reducer, YearBinding};
use super::frame::Frame;
use crate::config::DemographicsConfig;
use crate::store::{TableRow, TableStore};

pub const FACT_DEMOGRAPHICS_TABLE: &str = "fact_demografia";

#[derive(Debug, Clone, PartialEq)]
pub struct DemographicsRow {
    pub id_nil: i64,
    pub id_tempo: i64,
    pub popolazione_totale: Option<f64>,
    pub pct_stranieri: Option<f64>,
    pub densita_abitanti_km2: Option<f64>,
    pub famiglie_registrate_in_anagrafe: Option<f64>,
    pub famiglie_unipersonali_registrate_in_anagrafe: Option<f64>,
    pub nati_vivi: Option<f64>,
    pub morti: Option<f64>,
    pub immigrati: Option<f64>,
    pub emigrati: Option<f64>,
}

impl TableRow for DemographicsRow {
    const TABLE: &'static str = FACT_DEMOGRAPHICS_TABLE;

    fn schema() -> Schema {
        let metric = |name: &str| Field::new(name, DataType::Float64, true);
        Schema::new(vec![
            Field::new("id_nil", DataType::Int64, false),
            Field::new("id_tempo", DataType::Int64, false),
            metric("popolazione_totale"),
            metric("pct_stranieri"),
            metric("densita_abitanti_km2"),
            metric("famiglie_registrate_in_anagrafe"),
            metric("famiglie_unipersonali_registrate_in_anagrafe"),
            metric("nati_vivi"),
            metric("morti"),
            metric("immigrati"),
            metric("emigrati"),
        ])
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        fn metric(rows: &[DemographicsRow], f: fn(&DemographicsRow) -> Option<f64>) -> ArrayRef {
            Arc::new(Float64Array::from_iter(rows.iter().map(f)))
        }
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.id_nil))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.id_tempo))),
            metric(rows, |r| r.popolazione_totale),
            metric(rows, |r| r.pct_stranieri),
            metric(rows, |r| r.densita_abitanti_km2),
            metric(rows, |r| r.famiglie_registrate_in_anagrafe),
            metric(rows, |r| r.famiglie_unipersonali_registrate_in_anagrafe),
            metric(rows, |r| r.nati_vivi),
            metric(rows, |r| r.morti),
            metric(rows, |r| r.immigrati),
            metric(rows, |r| r.emigrati),
        ]
    }
}

/// Population structure per (NIL, year).
///
/// 1) sum every count column per (normalized district name, year)
/// 2) join to the dimensions
/// 3) derive the foreign-resident share and density
#[tracing::instrument(level = "info", skip_all, fields(source = %cfg.table))]
pub fn build_demographics<S: TableStore>(
    store: &S,
    cfg: &DemographicsConfig,
    place: &PlaceDimension,
    years: &BTreeSet<i64>,
) -> Result<(Vec<DemographicsRow>, FactReport)> {
    let mut report = FactReport::new(FACT_DEMOGRAPHICS_TABLE);
    let Some(batch) = read_source(store, &cfg.table, &mut report)? else {
        return Ok((Vec::new(), report));
    };
    let frame = Frame::new(&batch);
    let Some(keys) = keys_of(&frame, &cfg.name_column, YearBinding::Column(&cfg.year_column)) else {
        warn!(name = %cfg.name_column, year = %cfg.year_column, "name or year column missing");
        report.missing_sources.push(cfg.table.clone());
        return Ok((Vec::new(), report));
    };

    // 1) aggregate
    let metrics: Vec<Metric> = [
        &cfg.total_column,
        &cfg.foreign_column,
        &cfg.families_column,
        &cfg.single_families_column,
        &cfg.births_column,
        &cfg.deaths_column,
        &cfg.immigrants_column,
        &cfg.emigrants_column,
    ]
    .into_iter()
    .map(|column| Metric::from_column(&frame, column, column, Reducer::Sum))
    .collect();
    let grouped = aggregate(&keys, &metrics);

    // 2) join
    let joined = join_dimensions(grouped, place, years, &mut report);

    // 3) derive
    let rows: Vec<DemographicsRow> = joined
        .into_iter()
        .map(|g| {
            let v = &g.values;
            let total = v[0];
            DemographicsRow {
                id_nil: g.id_nil,
                id_tempo: g.id_tempo,
                popolazione_totale: total,
                pct_stranieri: ratio(v[1], total).map(|r| r * 100.0),
                densita_abitanti_km2: ratio(total, place.area_km2(&g.nil_norm)),
                famiglie_registrate_in_anagrafe: v[2],
                famiglie_unipersonali_registrate_in_anagrafe: v[3],
                nati_vivi: v[4],
                morti: v[5],
                immigrati: v[6],
                emigrati: v[7],
            }
        })
        .collect();
    info!(rows = rows.len(), join_misses = report.join_misses, "fact_demografia built");
    Ok((rows, report))
}
