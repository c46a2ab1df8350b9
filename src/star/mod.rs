// src/star/mod.rs
//! The NIL star schema: `dim_nil`, `dim_tempo` and three fact tables, all
//! rebuilt from staged tables on every run.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

pub mod demographics;
pub mod dim_place;
pub mod dim_time;
mod error;
pub mod facts;
pub mod frame;
pub mod housing;
pub mod services;

pub use demographics::{build_demographics, DemographicsRow, FACT_DEMOGRAPHICS_TABLE};
pub use dim_place::{build_place_dimension, NameCollision, PlaceDimension, PlaceRow, DIM_PLACE_TABLE};
pub use dim_time::{build_time_rows, scan_year_sources, TimeRow, DIM_TIME_TABLE};
pub use error::StarError;
pub use facts::FactReport;
pub use housing::{build_housing, HousingRow, FACT_HOUSING_TABLE};
pub use services::{build_services, ServicesRow, FACT_SERVICES_TABLE};

use crate::config::{ServicesConfig, StarConfig};
use crate::store::TableStore;

/// What a star-schema build produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StarSchemaReport {
    pub dim_nil_rows: usize,
    pub ids_synthesized: bool,
    pub dim_tempo_rows: usize,
    pub years: Vec<i64>,
    pub collisions: Vec<NameCollision>,
    pub facts: Vec<FactReport>,
}

/// Rebuild every star table from the staged tables in `store`.
///
/// 1) dim_nil from the boundaries table (missing table or name column is fatal)
/// 2) dim_tempo from the year sources, `as_of_years` and, when a staged
///    services source has no year column, the snapshot year; falling back
///    to `current_year` when none of these yields a year
/// 3) the three fact tables, each fully replaced
#[tracing::instrument(level = "info", skip_all)]
pub fn build_star_schema<S: TableStore>(
    cfg: &StarConfig,
    as_of_years: &[i64],
    store: &S,
    current_year: i64,
) -> Result<StarSchemaReport> {
    // 1) place dimension
    let boundaries = store
        .read_table(&cfg.boundaries.table)?
        .ok_or_else(|| StarError::MissingBoundaries(cfg.boundaries.table.clone()))?;
    let place = build_place_dimension(&boundaries, &cfg.boundaries)?;
    store
        .replace_rows(&place.rows)
        .context("replacing dim_nil")?;
    info!(rows = place.rows.len(), synthesized_ids = place.ids_synthesized, "dim_nil built");
    if !place.collisions.is_empty() {
        warn!(collisions = place.collisions.len(), "normalized NIL names are not unique");
    }

    // 2) time dimension
    let mut years = scan_year_sources(store, &cfg.year_sources)?;
    years.extend(as_of_years.iter().copied());
    if uses_snapshot_year(store, &cfg.services)? {
        years.insert(cfg.services.snapshot_year);
    }
    let time_rows = build_time_rows(years, current_year);
    store
        .replace_rows(&time_rows)
        .context("replacing dim_tempo")?;
    let years: BTreeSet<i64> = time_rows.iter().map(|r| r.anno).collect();
    info!(rows = time_rows.len(), "dim_tempo built");

    // 3) facts
    let (demo, demo_report) = build_demographics(store, &cfg.demographics, &place, &years)?;
    store
        .replace_rows(&demo)
        .context("replacing fact_demografia")?;
    let (housing, housing_report) = build_housing(store, &cfg.housing, &place, &years)?;
    store
        .replace_rows(&housing)
        .context("replacing fact_immobiliare")?;
    let (services, services_report) = build_services(store, &cfg.services, &place, &years)?;
    store
        .replace_rows(&services)
        .context("replacing fact_servizi")?;

    Ok(StarSchemaReport {
        dim_nil_rows: place.rows.len(),
        ids_synthesized: place.ids_synthesized,
        dim_tempo_rows: time_rows.len(),
        years: years.into_iter().collect(),
        collisions: place.collisions,
        facts: vec![demo_report, housing_report, services_report],
    })
}

/// True when some staged services source has no year column of its own.
fn uses_snapshot_year<S: TableStore>(store: &S, cfg: &ServicesConfig) -> Result<bool> {
    for src in [&cfg.schools, &cfg.covered_markets, &cfg.weekly_markets, &cfg.green] {
        if src.year_column.is_none() && store.has_table(&src.table)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use arrow::array::{ArrayRef, Float64Array, StringArray};
    use arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn boundaries() -> Result<RecordBatch> {
        let nil: ArrayRef = Arc::new(StringArray::from(vec!["Brera", "Duomo"]));
        let area: ArrayRef = Arc::new(Float64Array::from(vec![2_000_000.0, 1_000_000.0]));
        Ok(RecordBatch::try_from_iter(vec![("nil", nil), ("shape_area", area)])?)
    }

    #[test]
    fn time_dimension_falls_back_to_current_year() -> Result<()> {
        let store = MemoryStore::new();
        let cfg = StarConfig::default();
        store.replace_table(&cfg.boundaries.table, &boundaries()?)?;

        let report = build_star_schema(&cfg, &[], &store, 2026)?;
        assert_eq!(report.years, vec![2026]);
        assert_eq!(report.dim_tempo_rows, 1);
        Ok(())
    }

    #[test]
    fn staged_snapshot_source_adds_the_snapshot_year() -> Result<()> {
        let store = MemoryStore::new();
        let cfg = StarConfig::default();
        store.replace_table(&cfg.boundaries.table, &boundaries()?)?;
        let nil: ArrayRef = Arc::new(StringArray::from(vec!["Duomo"]));
        store.replace_table(
            &cfg.services.covered_markets.table,
            &RecordBatch::try_from_iter(vec![("nil", nil)])?,
        )?;

        let report = build_star_schema(&cfg, &[], &store, 2026)?;
        assert_eq!(report.years, vec![cfg.services.snapshot_year]);
        Ok(())
    }

    #[test]
    fn missing_boundaries_is_fatal() {
        let store = MemoryStore::new();
        let err = build_star_schema(&StarConfig::default(), &[], &store, 2024).unwrap_err();
        assert!(matches!(err.downcast_ref::<StarError>(), Some(StarError::MissingBoundaries(_))));
    }
}
