use arrow::datatypes::{DataType, Field, Schema, TimeUnit};

use crate::process::infer::{ColumnKind, InferredColumn};

/// Map a decided column kind to its Arrow storage type.
///
/// - Identifier, Text        → Utf8
/// - Date                    → Timestamp(ms, naive)
/// - Year                    → Int64
/// - Numeric (integral JSON) → Int64
/// - Numeric                 → Float64
pub fn arrow_type(kind: ColumnKind) -> DataType {
    match kind {
        ColumnKind::Identifier | ColumnKind::Text => DataType::Utf8,
        ColumnKind::Date => DataType::Timestamp(TimeUnit::Millisecond, None),
        ColumnKind::Year | ColumnKind::Numeric { integral: true } => DataType::Int64,
        ColumnKind::Numeric { integral: false } => DataType::Float64,
    }
}

/// Every staged column is nullable.
pub fn build_schema(columns: &[InferredColumn]) -> Schema {
    Schema::new(
        columns
            .iter()
            .map(|c| Field::new(&c.name, arrow_type(c.kind), true))
            .collect::<Vec<_>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::convert::to_array;
    use crate::process::infer::TypedValues;
    use arrow::array::Array;

    #[test]
    fn kinds_match_array_types() {
        let pairs = [
            (ColumnKind::Text, TypedValues::Text(vec![])),
            (ColumnKind::Identifier, TypedValues::Text(vec![])),
            (ColumnKind::Date, TypedValues::Timestamp(vec![])),
            (ColumnKind::Year, TypedValues::Int(vec![])),
            (ColumnKind::Numeric { integral: true }, TypedValues::Int(vec![])),
            (ColumnKind::Numeric { integral: false }, TypedValues::Float(vec![])),
        ];
        for (kind, values) in pairs {
            assert_eq!(&arrow_type(kind), to_array(&values).data_type(), "{:?}", kind);
        }
    }
}
