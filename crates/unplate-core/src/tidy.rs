//! Projection from a plate grid into long-format rows

use crate::error::Result;
use crate::plate::Plate;
use crate::table::{CellValue, Table};

/// Canonical tidy column set, one output row per (row, column) cell
pub const TIDY_HEADERS: [&str; 9] = [
    "filename",
    "plate_name",
    "measurement_type",
    "temperature",
    "time_stamp",
    "row",
    "row_number",
    "column",
    "value",
];

/// Flatten a plate's full grid into a tidy table.
///
/// Recomputed from scratch on every row append rather than patched
/// incrementally; grids top out at a few thousand cells.
pub fn project(plate: &Plate) -> Result<Table> {
    let mut table = Table::with_headers(TIDY_HEADERS);

    for row in plate.rows() {
        for (column_index, value) in row.values.iter().enumerate() {
            table.append_row(vec![
                CellValue::from(plate.source_filename.as_str()),
                CellValue::from(plate.name.as_str()),
                CellValue::from(plate.measurement_type.as_str()),
                CellValue::from(plate.temperature.as_str()),
                CellValue::Integer(plate.time_stamp),
                CellValue::from(row.label.as_str()),
                CellValue::Integer(row.number as i64),
                CellValue::Integer(column_index as i64 + 1),
                CellValue::Float(*value),
            ])?;
        }
    }

    Ok(table)
}
