// src/star/housing.rs
use anyhow::Result;
use arrow::{
    array::{ArrayRef, Float64Array, Int64Array},
    datatypes::{DataType, Field, Schema},
};
use std::{collections::BTreeSet, sync::Arc};
use tracing::{info, warn};

use super::dim_place::PlaceDimension;
use super::facts::{aggregate, as_count, join_dimensions, keys_of, read_source, FactReport, Metric, Reducer, YearBinding};
use super::frame::Frame;
use crate::config::HousingConfig;
use crate::store::{TableRow, TableStore};

pub const FACT_HOUSING_TABLE: &str = "fact_immobiliare";

#[derive(Debug, Clone, PartialEq)]
pub struct HousingRow {
    pub id_nil: i64,
    pub id_tempo: i64,
    pub nuovi_fabbricati_residenziali: Option<i64>,
    pub abitazioni_nuove: Option<f64>,
    pub superficie_utile_abitabile: Option<f64>,
    pub volume_totale: Option<f64>,
}

impl TableRow for HousingRow {
    const TABLE: &'static str = FACT_HOUSING_TABLE;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id_nil", DataType::Int64, false),
            Field::new("id_tempo", DataType::Int64, false),
            Field::new("nuovi_fabbricati_residenziali", DataType::Int64, true),
            Field::new("abitazioni_nuove", DataType::Float64, true),
            Field::new("superficie_utile_abitabile", DataType::Float64, true),
            Field::new("volume_totale", DataType::Float64, true),
        ])
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.id_nil))),
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.id_tempo))),
            Arc::new(Int64Array::from_iter(rows.iter().map(|r| r.nuovi_fabbricati_residenziali))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.abitazioni_nuove))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.superficie_utile_abitabile))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.volume_totale))),
        ]
    }
}

/// New residential buildings per (NIL, permit year): one source row is one
/// building, dwellings and sizes are summed.
#[tracing::instrument(level = "info", skip_all, fields(source = %cfg.table))]
pub fn build_housing<S: TableStore>(
    store: &S,
    cfg: &HousingConfig,
    place: &PlaceDimension,
    years: &BTreeSet<i64>,
) -> Result<(Vec<HousingRow>, FactReport)> {
    let mut report = FactReport::new(FACT_HOUSING_TABLE);
    let Some(batch) = read_source(store, &cfg.table, &mut report)? else {
        return Ok((Vec::new(), report));
    };
    let frame = Frame::new(&batch);
    let Some(keys) = keys_of(&frame, &cfg.name_column, YearBinding::Column(&cfg.year_column)) else {
        warn!(name = %cfg.name_column, year = %cfg.year_column, "name or year column missing");
        report.missing_sources.push(cfg.table.clone());
        return Ok((Vec::new(), report));
    };

    let metrics = [
        Metric::count("nuovi_fabbricati_residenziali"),
        Metric::from_column(&frame, &cfg.dwellings_column, "abitazioni_nuove", Reducer::Sum),
        Metric::from_column(&frame, &cfg.floor_area_column, "superficie_utile_abitabile", Reducer::Sum),
        Metric::from_column(&frame, &cfg.volume_column, "volume_totale", Reducer::Sum),
    ];
    let grouped = aggregate(&keys, &metrics);
    let rows: Vec<HousingRow> = join_dimensions(grouped, place, years, &mut report)
        .into_iter()
        .map(|g| HousingRow {
            id_nil: g.id_nil,
            id_tempo: g.id_tempo,
            nuovi_fabbricati_residenziali: as_count(g.values[0]),
            abitazioni_nuove: g.values[1],
            superficie_utile_abitabile: g.values[2],
            volume_totale: g.values[3],
        })
        .collect();
    info!(rows = rows.len(), join_misses = report.join_misses, "fact_immobiliare built");
    Ok((rows, report))
}
