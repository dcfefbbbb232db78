//! Plate grid model shared by the text and XML parsers

use crate::error::{Error, Result};
use crate::table::Table;
use crate::tidy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One physical microplate read: a rectangular grid of well values plus
/// the metadata captured from its block header.
///
/// Rows are appended one at a time as a parser advances; labels are
/// assigned A, B, C, ... in append order regardless of source content.
/// Every append rebuilds the plate's tidy table from the full grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plate {
    /// Plate name from the block header
    pub name: String,
    /// File the plate was parsed from
    pub source_filename: String,
    /// Instrument read mode (e.g. "Absorbance")
    pub measurement_type: String,
    /// Temperature as read from the instrument, not normalized
    pub temperature: String,
    /// Read time in seconds since epoch; 0 when the format carries no clock
    pub time_stamp: i64,
    rows: Vec<PlateRow>,
    data_table: Table,
}

/// One labelled row of well values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateRow {
    /// Row letter (A, B, ... Z, AA, ...)
    pub label: String,
    /// Alphabetic position, 1-based
    pub number: usize,
    /// Well values, one per column
    pub values: Vec<f64>,
}

impl Plate {
    pub fn new(
        name: impl Into<String>,
        source_filename: impl Into<String>,
        measurement_type: impl Into<String>,
        temperature: impl Into<String>,
        time_stamp: i64,
    ) -> Self {
        Self {
            name: name.into(),
            source_filename: source_filename.into(),
            measurement_type: measurement_type.into(),
            temperature: temperature.into(),
            time_stamp,
            rows: Vec::new(),
            data_table: Table::with_headers(tidy::TIDY_HEADERS),
        }
    }

    /// Append one row of well values; the label is assigned from the
    /// current row count. Fails if the row breaks the rectangular grid.
    pub fn push_row(&mut self, values: Vec<f64>) -> Result<()> {
        if let Some(first) = self.rows.first() {
            if values.len() != first.values.len() {
                return Err(Error::RowArity {
                    expected: first.values.len(),
                    found: values.len(),
                });
            }
        }
        let number = self.rows.len() + 1;
        self.rows.push(PlateRow {
            label: row_label(self.rows.len()),
            number,
            values,
        });
        self.data_table = tidy::project(self)?;
        Ok(())
    }

    /// Grid rows in append order
    pub fn rows(&self) -> &[PlateRow] {
        &self.rows
    }

    /// This plate's tidy (long-format) table, one row per well
    pub fn data_table(&self) -> &Table {
        &self.data_table
    }

    /// (row count, column count)
    pub fn dimensions(&self) -> (usize, usize) {
        let cols = self.rows.first().map_or(0, |r| r.values.len());
        (self.rows.len(), cols)
    }

    /// Total wells in the grid
    pub fn well_count(&self) -> usize {
        let (rows, cols) = self.dimensions();
        rows * cols
    }
}

/// All plates parsed from one source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedExport {
    /// Source file path
    pub path: PathBuf,
    /// Plates in the order they appear in the file
    pub plates: Vec<Plate>,
}

/// Spreadsheet-style row label for a 0-based index: A..Z, AA, AB, ...
pub fn row_label(index: usize) -> String {
    let mut n = index + 1;
    let mut label = String::new();
    while n > 0 {
        n -= 1;
        label.insert(0, (b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    label
}
