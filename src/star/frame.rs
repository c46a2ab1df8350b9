// src/star/frame.rs
use arrow::{
    array::{
        Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array, LargeStringArray,
        StringArray, TimestampMillisecondArray,
    },
    datatypes::{DataType, TimeUnit},
    record_batch::RecordBatch,
    util::display::array_value_to_string,
};

use crate::process::{
    date_parser::from_millis,
    numeric::{coerce_european, dot_rule_for},
    scalar::Scalar,
};

/// Read-only column access over a staged table, by column name.
/// Missing columns read as `None` so callers decide whether that is fatal.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    batch: &'a RecordBatch,
}

impl<'a> Frame<'a> {
    pub fn new(batch: &'a RecordBatch) -> Self {
        Self { batch }
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.batch.column_by_name(name).is_some()
    }

    pub fn scalars(&self, name: &str) -> Option<Vec<Scalar>> {
        let col = self.batch.column_by_name(name)?;
        Some((0..col.len()).map(|i| scalar_at(col, i)).collect())
    }

    /// Text form of every cell.
    pub fn text(&self, name: &str) -> Option<Vec<Option<String>>> {
        Some(self.scalars(name)?.iter().map(Scalar::as_text).collect())
    }

    /// Numeric view: integer and float columns as-is, text columns through
    /// the European coercion. Unconvertible cells are null.
    pub fn numbers(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let scalars = self.scalars(name)?;
        let rule = dot_rule_for(scalars.iter().filter_map(|s| match s {
            Scalar::Text(t) => Some(t.as_str()),
            _ => None,
        }));
        Some(
            scalars
                .iter()
                .map(|s| match s {
                    Scalar::Int(v) => Some(*v as f64),
                    Scalar::Float(v) => Some(*v).filter(|f| f.is_finite()),
                    Scalar::Text(t) => coerce_european(t, rule),
                    Scalar::Null | Scalar::Timestamp(_) => None,
                })
                .collect(),
        )
    }
}

/// Lift one cell out of an Arrow column.
pub fn scalar_at(col: &ArrayRef, i: usize) -> Scalar {
    if col.is_null(i) {
        return Scalar::Null;
    }
    let any = col.as_any();
    match col.data_type() {
        DataType::Utf8 => downcast_value(any.downcast_ref::<StringArray>(), i, |a, i| Scalar::Text(a.value(i).into())),
        DataType::LargeUtf8 => {
            downcast_value(any.downcast_ref::<LargeStringArray>(), i, |a, i| Scalar::Text(a.value(i).into()))
        }
        DataType::Int64 => downcast_value(any.downcast_ref::<Int64Array>(), i, |a, i| Scalar::Int(a.value(i))),
        DataType::Int32 => downcast_value(any.downcast_ref::<Int32Array>(), i, |a, i| Scalar::Int(a.value(i).into())),
        DataType::Float64 => downcast_value(any.downcast_ref::<Float64Array>(), i, |a, i| Scalar::Float(a.value(i))),
        DataType::Float32 => {
            downcast_value(any.downcast_ref::<Float32Array>(), i, |a, i| Scalar::Float(a.value(i).into()))
        }
        DataType::Boolean => {
            downcast_value(any.downcast_ref::<BooleanArray>(), i, |a, i| Scalar::Text(a.value(i).to_string()))
        }
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            downcast_value(any.downcast_ref::<TimestampMillisecondArray>(), i, |a, i| {
                from_millis(a.value(i)).map(Scalar::Timestamp).unwrap_or(Scalar::Null)
            })
        }
        _ => array_value_to_string(col, i)
            .map(Scalar::Text)
            .unwrap_or(Scalar::Null),
    }
}

fn downcast_value<A, F>(arr: Option<&A>, i: usize, f: F) -> Scalar
where
    F: Fn(&A, usize) -> Scalar,
{
    arr.map(|a| f(a, i)).unwrap_or(Scalar::Null)
}
