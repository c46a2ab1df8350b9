/// One column as read from an artifact, before any typing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawColumn {
    pub name: String,
    /// Cell text; `None` for missing/JSON null.
    pub cells: Vec<Option<String>>,
    /// Every non-null cell came from a JSON number, so the column is
    /// already numeric and skips inference.
    pub native_numeric: bool,
}

impl RawColumn {
    pub fn text(name: impl Into<String>, cells: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            cells,
            native_numeric: false,
        }
    }

    pub fn is_all_null(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }
}

/// Column-major table produced by the loaders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub columns: Vec<RawColumn>,
    pub num_rows: usize,
}

impl RawTable {
    /// Build from a header plus row-major records; short rows are padded with nulls.
    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<Option<String>>>) -> Self {
        let num_rows = rows.len();
        let mut columns: Vec<RawColumn> = headers
            .into_iter()
            .map(|h| RawColumn::text(h, Vec::with_capacity(num_rows)))
            .collect();
        for row in rows {
            let mut cells = row.into_iter();
            for col in columns.iter_mut() {
                col.cells.push(cells.next().flatten());
            }
        }
        Self { columns, num_rows }
    }

    pub fn headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}
