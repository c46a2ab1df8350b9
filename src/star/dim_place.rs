// src/star/dim_place.rs
use arrow::{
    array::{ArrayRef, Float64Array, Int64Array, StringArray},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};
use tracing::{debug, warn};

use super::error::StarError;
use super::frame::Frame;
use crate::config::BoundariesConfig;
use crate::process::{names::normalize_opt, scalar::Scalar};
use crate::store::TableRow;

pub const DIM_PLACE_TABLE: &str = "dim_nil";

/// One neighborhood (NIL).
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceRow {
    pub id_nil: i64,
    pub nil: Option<String>,
    pub nil_norm: String,
    pub shape_area: Option<f64>,
    pub shape_length: Option<f64>,
    pub area_km2: Option<f64>,
    pub geometry: Option<String>,
}

impl TableRow for PlaceRow {
    const TABLE: &'static str = DIM_PLACE_TABLE;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id_nil", DataType::Int64, false),
            Field::new("nil", DataType::Utf8, true),
            Field::new("nil_norm", DataType::Utf8, false),
            Field::new("shape_area", DataType::Float64, true),
            Field::new("shape_length", DataType::Float64, true),
            Field::new("area_km2", DataType::Float64, true),
            Field::new("geometry", DataType::Utf8, true),
        ])
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            Arc::new(Int64Array::from_iter_values(rows.iter().map(|r| r.id_nil))),
            Arc::new(StringArray::from_iter(rows.iter().map(|r| r.nil.as_deref()))),
            Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.nil_norm.as_str()))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.shape_area))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.shape_length))),
            Arc::new(Float64Array::from_iter(rows.iter().map(|r| r.area_km2))),
            Arc::new(StringArray::from_iter(rows.iter().map(|r| r.geometry.as_deref()))),
        ]
    }
}

/// Several dimension rows that normalize to the same join key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameCollision {
    pub nil_norm: String,
    pub names: Vec<String>,
    pub ids: Vec<i64>,
    /// The id fact rows are joined to.
    pub resolved_id: i64,
}

/// The built place dimension plus its join index.
#[derive(Debug, Clone, Default)]
pub struct PlaceDimension {
    pub rows: Vec<PlaceRow>,
    pub ids_synthesized: bool,
    pub collisions: Vec<NameCollision>,
    index: BTreeMap<String, usize>,
}

impl PlaceDimension {
    /// Surrogate id for a normalized name.
    pub fn lookup(&self, nil_norm: &str) -> Option<i64> {
        self.index.get(nil_norm).map(|&i| self.rows[i].id_nil)
    }

    /// Area of the row a normalized name resolves to.
    pub fn area_km2(&self, nil_norm: &str) -> Option<f64> {
        self.index.get(nil_norm).and_then(|&i| self.rows[i].area_km2)
    }
}

/// Square meters → square kilometers; non-positive areas are unknown.
pub fn to_km2(shape_area: Option<f64>) -> Option<f64> {
    shape_area.filter(|a| *a > 0.0).map(|a| a / 1_000_000.0)
}

/// Build the place dimension from the boundaries table.
///
/// 1) the display-name column is required
/// 2) keep the source id column only if complete, integral and unique,
///    otherwise number rows 1..N in source order
/// 3) normalize names, convert area
/// 4) index names; a shared key resolves to its lowest id and is reported
pub fn build_place_dimension(batch: &RecordBatch, cfg: &BoundariesConfig) -> Result<PlaceDimension, StarError> {
    let frame = Frame::new(batch);

    // 1) names
    let names = frame.text(&cfg.name_column).ok_or_else(|| StarError::MissingColumn {
        table: cfg.table.clone(),
        column: cfg.name_column.clone(),
    })?;

    // 2) ids
    let source_ids = frame.scalars(&cfg.id_column).and_then(|s| stable_ids(&s));
    let ids_synthesized = source_ids.is_none();
    let ids = source_ids.unwrap_or_else(|| (1..=frame.num_rows() as i64).collect());
    if ids_synthesized {
        debug!(column = %cfg.id_column, "no stable id column, ids synthesized");
    }

    // 3) attributes
    let n = frame.num_rows();
    let shape_area = frame.numbers(&cfg.shape_area_column).unwrap_or_else(|| vec![None; n]);
    let shape_length = frame.numbers(&cfg.shape_length_column).unwrap_or_else(|| vec![None; n]);
    let geometry = frame.text(&cfg.geometry_column).unwrap_or_else(|| vec![None; n]);

    let rows: Vec<PlaceRow> = (0..n)
        .map(|i| PlaceRow {
            id_nil: ids[i],
            nil: names[i].clone(),
            nil_norm: normalize_opt(names[i].as_deref()),
            shape_area: shape_area[i],
            shape_length: shape_length[i],
            area_km2: to_km2(shape_area[i]),
            geometry: geometry[i].clone(),
        })
        .collect();

    // 4) index
    let mut by_key: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        if !row.nil_norm.is_empty() {
            by_key.entry(row.nil_norm.as_str()).or_default().push(i);
        }
    }
    let mut index = BTreeMap::new();
    let mut collisions = Vec::new();
    for (key, members) in by_key {
        let Some(&winner) = members.iter().min_by_key(|&&i| rows[i].id_nil) else {
            continue;
        };
        if members.len() > 1 {
            let collision = NameCollision {
                nil_norm: key.to_string(),
                names: members
                    .iter()
                    .filter_map(|&i| rows[i].nil.clone())
                    .collect(),
                ids: members.iter().map(|&i| rows[i].id_nil).collect(),
                resolved_id: rows[winner].id_nil,
            };
            warn!(
                key = %collision.nil_norm,
                names = ?collision.names,
                resolved_id = collision.resolved_id,
                "several NIL rows share one normalized name"
            );
            collisions.push(collision);
        }
        index.insert(key.to_string(), winner);
    }

    Ok(PlaceDimension {
        rows,
        ids_synthesized,
        collisions,
        index,
    })
}

/// Source ids as integers, or `None` unless every row has a distinct
/// integral id.
fn stable_ids(values: &[Scalar]) -> Option<Vec<i64>> {
    let ids: Option<Vec<i64>> = values
        .iter()
        .map(|v| match v {
            Scalar::Int(i) => Some(*i),
            Scalar::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            Scalar::Text(t) => t.trim().parse().ok(),
            _ => None,
        })
        .collect();
    let ids = ids?;
    let unique: HashSet<i64> = ids.iter().copied().collect();
    (unique.len() == ids.len()).then_some(ids)
}
