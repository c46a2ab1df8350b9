use crate::process::infer::{InferredColumn, TypedValues};
use crate::process::schema::build_schema;
use anyhow::Result;
use arrow::{
    array::{ArrayRef, Float64Array, Int64Array, StringArray, TimestampMillisecondArray},
    record_batch::RecordBatch,
};
use std::sync::Arc;

/// Typed values → Arrow array.
pub fn to_array(values: &TypedValues) -> ArrayRef {
    match values {
        TypedValues::Text(v) => Arc::new(StringArray::from(v.clone())) as ArrayRef,
        TypedValues::Float(v) => Arc::new(Float64Array::from(v.clone())) as ArrayRef,
        TypedValues::Int(v) => Arc::new(Int64Array::from(v.clone())) as ArrayRef,
        TypedValues::Timestamp(v) => Arc::new(TimestampMillisecondArray::from(v.clone())) as ArrayRef,
    }
}

/// Assemble the inferred columns into one batch.
pub fn to_record_batch(columns: &[InferredColumn]) -> Result<RecordBatch> {
    let schema = Arc::new(build_schema(columns));
    let arrays = columns.iter().map(|c| to_array(&c.values)).collect();
    RecordBatch::try_new(schema, arrays).map_err(Into::into)
}
