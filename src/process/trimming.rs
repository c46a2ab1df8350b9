use crate::process::raw_table::RawTable;
use crate::process::utils::clean_cell;

/// Trim every text cell and null out blank-only ones, except in `skip`
/// (the serialized geometry column is kept byte-for-byte).
pub fn apply_trimming(table: &mut RawTable, skip: &[&str]) {
    for col in table.columns.iter_mut() {
        if skip.contains(&col.name.as_str()) {
            continue;
        }
        for cell in col.cells.iter_mut() {
            if let Some(raw) = cell.as_deref() {
                *cell = clean_cell(raw);
            }
        }
    }
}
