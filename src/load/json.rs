// src/load/json.rs
use serde_json::Value;
use std::collections::HashMap;

use super::error::LoadError;
use super::GEOMETRY_COLUMN;
use crate::process::raw_table::{RawColumn, RawTable};

/// Keys under which portals usually wrap their record list.
const RECORD_KEYS: &[&str] = &["data", "records", "result", "items"];

pub fn is_feature_collection(payload: &Value) -> bool {
    payload.get("type").and_then(Value::as_str) == Some("FeatureCollection")
        && payload.get("features").is_some()
}

/// Parse a `.json` artifact. A FeatureCollection is read as GeoJSON.
pub fn parse_json(text: &str) -> Result<RawTable, LoadError> {
    let payload: Value = serde_json::from_str(text)?;
    if is_feature_collection(&payload) {
        return Ok(features_to_table(&payload));
    }

    let records: Vec<&Value> = match &payload {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => RECORD_KEYS
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_array))
            .map(|items| items.iter().collect())
            .unwrap_or_else(|| vec![&payload]),
        _ => Vec::new(),
    };

    let mut builder = TableBuilder::default();
    for record in records {
        let Value::Object(_) = record else {
            return Err(LoadError::UnsupportedFormat(
                "json records must be objects".into(),
            ));
        };
        let mut cells = Vec::new();
        flatten(None, record, &mut cells);
        builder.push_row(cells);
    }
    Ok(builder.finish())
}

/// Parse a `.geojson` artifact: one row per feature, properties as columns
/// plus the serialized geometry.
pub fn parse_geojson(text: &str) -> Result<RawTable, LoadError> {
    let payload: Value = serde_json::from_str(text)?;
    if !is_feature_collection(&payload) {
        return Err(LoadError::UnsupportedFormat(
            "geojson is not a FeatureCollection".into(),
        ));
    }
    Ok(features_to_table(&payload))
}

fn features_to_table(payload: &Value) -> RawTable {
    let mut builder = TableBuilder::default();
    let features = payload
        .get("features")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for feature in features {
        let mut cells = Vec::new();
        if let Some(props @ Value::Object(_)) = feature.get("properties") {
            flatten(None, props, &mut cells);
        }
        let geometry = feature
            .get("geometry")
            .filter(|g| !g.is_null())
            .map(|g| Cell::Text(g.to_string()));
        cells.push((GEOMETRY_COLUMN.to_string(), geometry));
        builder.push_row(cells);
    }
    builder.finish()
}

#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Text(String),
    Number(String),
}

/// Nested objects flatten to `parent.child` keys; arrays stay JSON text.
fn flatten(prefix: Option<&str>, value: &Value, out: &mut Vec<(String, Option<Cell>)>) {
    match value {
        Value::Object(map) if prefix.is_none() || !map.is_empty() => {
            for (k, v) in map {
                let key = match prefix {
                    Some(p) => format!("{}.{}", p, k),
                    None => k.clone(),
                };
                flatten(Some(&key), v, out);
            }
        }
        other => {
            let key = prefix.unwrap_or("value").to_string();
            let cell = match other {
                Value::Null => None,
                Value::Bool(b) => Some(Cell::Text(b.to_string())),
                Value::Number(n) => Some(Cell::Number(n.to_string())),
                Value::String(s) => Some(Cell::Text(s.clone())),
                Value::Array(_) | Value::Object(_) => Some(Cell::Text(other.to_string())),
            };
            out.push((key, cell));
        }
    }
}

/// Accumulates heterogeneous records into columns, in first-seen order.
#[derive(Default)]
struct TableBuilder {
    columns: Vec<RawColumn>,
    index: HashMap<String, usize>,
    numbers: Vec<usize>,
    non_null: Vec<usize>,
    num_rows: usize,
}

impl TableBuilder {
    fn push_row(&mut self, cells: Vec<(String, Option<Cell>)>) {
        for (key, cell) in cells {
            let idx = match self.index.get(&key) {
                Some(&i) => i,
                None => {
                    let i = self.columns.len();
                    self.columns
                        .push(RawColumn::text(key.clone(), vec![None; self.num_rows]));
                    self.numbers.push(0);
                    self.non_null.push(0);
                    self.index.insert(key, i);
                    i
                }
            };
            let text = match cell {
                None => None,
                Some(Cell::Number(n)) => {
                    self.numbers[idx] += 1;
                    self.non_null[idx] += 1;
                    Some(n)
                }
                Some(Cell::Text(s)) => {
                    self.non_null[idx] += 1;
                    Some(s)
                }
            };
            // a key repeated within one record keeps the last value
            let col = &mut self.columns[idx];
            if col.cells.len() > self.num_rows {
                col.cells.pop();
            }
            col.cells.push(text);
        }
        self.num_rows += 1;
        for col in self.columns.iter_mut() {
            if col.cells.len() < self.num_rows {
                col.cells.push(None);
            }
        }
    }

    fn finish(mut self) -> RawTable {
        for (i, col) in self.columns.iter_mut().enumerate() {
            col.native_numeric = self.non_null[i] > 0 && self.numbers[i] == self.non_null[i];
        }
        RawTable {
            columns: self.columns,
            num_rows: self.num_rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column<'a>(t: &'a RawTable, name: &str) -> &'a RawColumn {
        t.columns.iter().find(|c| c.name == name).unwrap()
    }

    #[test]
    fn geojson_properties_and_geometry() -> anyhow::Result<()> {
        let text = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"NIL":"Brera","ID_NIL":1},
             "geometry":{"type":"Polygon","coordinates":[[[9.18,45.47],[9.19,45.47],[9.18,45.48]]]}},
            {"type":"Feature","properties":{"NIL":"Duomo"},"geometry":null}
        ]}"#;
        let t = parse_geojson(text)?;
        assert_eq!(t.num_rows, 2);
        assert_eq!(column(&t, "NIL").cells[1].as_deref(), Some("Duomo"));
        let ids = column(&t, "ID_NIL");
        assert!(ids.native_numeric);
        assert_eq!(ids.cells, vec![Some("1".to_string()), None]);
        let geom = column(&t, GEOMETRY_COLUMN);
        assert!(geom.cells[0].as_deref().unwrap().starts_with("{\"coordinates\""));
        assert_eq!(geom.cells[1], None);
        Ok(())
    }

    #[test]
    fn wrapped_records_are_unwrapped_and_flattened() -> anyhow::Result<()> {
        let text = r#"{"success":true,"result":[
            {"nil":"Brera","stats":{"totale":10,"tags":["a","b"]}},
            {"nil":"Duomo","stats":{"totale":"n.d."},"extra":null}
        ]}"#;
        let t = parse_json(text)?;
        assert_eq!(t.num_rows, 2);
        let totale = column(&t, "stats.totale");
        assert!(!totale.native_numeric);
        assert_eq!(totale.cells[1].as_deref(), Some("n.d."));
        assert_eq!(column(&t, "stats.tags").cells[0].as_deref(), Some("[\"a\",\"b\"]"));
        assert_eq!(column(&t, "extra").cells, vec![None, None]);
        Ok(())
    }

    #[test]
    fn plain_object_is_one_record() -> anyhow::Result<()> {
        let t = parse_json(r#"{"nil":"Brera","totale":12}"#)?;
        assert_eq!(t.num_rows, 1);
        assert!(column(&t, "totale").native_numeric);
        Ok(())
    }

    #[test]
    fn feature_collection_inside_json_extension() -> anyhow::Result<()> {
        let t = parse_json(r#"{"type":"FeatureCollection","features":[{"properties":{"a":"x"}}]}"#)?;
        assert_eq!(t.headers(), vec!["a", GEOMETRY_COLUMN]);
        Ok(())
    }

    #[test]
    fn scalar_records_are_rejected() {
        assert!(matches!(parse_json("[1,2]"), Err(LoadError::UnsupportedFormat(_))));
        assert!(matches!(parse_json("{not json"), Err(LoadError::Json(_))));
    }
}
