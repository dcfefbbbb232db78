//! Line scanner for delimited-text instrument exports
//!
//! Walks the export one record at a time and reconstructs plate blocks:
//! a `Plate:` line opens a block, `~End` closes it, and each temperature
//! sub-block inside produces its own [`Plate`].

use crate::error::{Error, Result};
use crate::plate::{ParsedExport, Plate};
use crate::table::sniff_delimiter;
use csv::StringRecord;
use std::fs;
use std::path::Path;

/// First field of a block-start line
pub const PLATE_START: &str = "Plate:";
/// First field of a block-end line
pub const PLATE_END: &str = "~End";

/// Parse a delimited-text export file, auto-detecting comma vs tab
pub fn parse_text<P: AsRef<Path>>(path: P) -> Result<ParsedExport> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let delimiter = sniff_delimiter(&content);
    parse_text_str(&content, delimiter, path)
}

/// Parse delimited text from a string (useful for testing)
pub fn parse_text_str<P: AsRef<Path>>(
    content: &str,
    delimiter: u8,
    source_name: P,
) -> Result<ParsedExport> {
    let path = source_name.as_ref();
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut scanner = BlockScanner::new(path);
    for (index, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
        scanner.step(&record, index + 1)?;
    }

    Ok(ParsedExport {
        path: path.to_path_buf(),
        plates: scanner.finish(),
    })
}

/// Explicit scanner state, one transition per input record.
///
/// `column_bound` and the pending plate are named fields rather than
/// values leaking across loop iterations, so a data row arriving before
/// any `Temperature` header is a parse error instead of a stale slice.
struct BlockScanner<'a> {
    path: &'a Path,
    in_block: bool,
    plate_name: String,
    measurement_type: String,
    column_bound: Option<usize>,
    current: Option<Plate>,
    plates: Vec<Plate>,
}

impl<'a> BlockScanner<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            in_block: false,
            plate_name: String::new(),
            measurement_type: String::new(),
            column_bound: None,
            current: None,
            plates: Vec::new(),
        }
    }

    fn step(&mut self, record: &StringRecord, line: usize) -> Result<()> {
        let first = record.get(0).unwrap_or("");

        if first == PLATE_START {
            self.in_block = true;
            self.plate_name = record.get(1).unwrap_or("").to_string();
            self.measurement_type = record.get(5).unwrap_or("").to_string();
            self.column_bound = None;
            return Ok(());
        }
        if first == PLATE_END {
            self.finalize_current();
            self.in_block = false;
            return Ok(());
        }
        if !self.in_block {
            return Ok(());
        }
        // Blank and separator lines have a single repeated field value
        if record.iter().all(|f| f == first) {
            return Ok(());
        }

        let second = record.get(1).unwrap_or("");
        if second.contains("Temperature") {
            return self.start_sub_block_header(record, line);
        }
        if second.starts_with(|c: char| c.is_ascii_digit()) {
            // Row-start marker: a new temperature sub-block, so a new Plate
            let values = self.slice_row(record, line)?;
            self.finalize_current();
            let mut plate = Plate::new(
                self.plate_name.clone(),
                self.path.to_string_lossy(),
                self.measurement_type.clone(),
                second,
                0,
            );
            plate.push_row(values)?;
            self.current = Some(plate);
            return Ok(());
        }

        // Continuation data row for the current sub-block
        let values = self.slice_row(record, line)?;
        match self.current.as_mut() {
            Some(plate) => plate.push_row(values),
            None => Err(Error::Parse {
                path: self.path.to_path_buf(),
                line,
                message: "data row outside any temperature sub-block".to_string(),
            }),
        }
    }

    /// A `Temperature` header declares the column count for the sub-blocks
    /// that follow: the largest digit-only token is the last column number.
    /// The bound is reused until the next header line; exports that change
    /// column count without one are not supported.
    fn start_sub_block_header(&mut self, record: &StringRecord, line: usize) -> Result<()> {
        let bound = record
            .iter()
            .filter(|f| !f.is_empty() && f.chars().all(|c| c.is_ascii_digit()))
            .filter_map(|f| f.parse::<usize>().ok())
            .max();
        match bound {
            Some(bound) => {
                self.column_bound = Some(bound);
                Ok(())
            }
            None => Err(Error::Parse {
                path: self.path.to_path_buf(),
                line,
                message: "temperature header declares no column numbers".to_string(),
            }),
        }
    }

    /// Well values live in fields 2 through `column_bound + 1`; a header
    /// declaring columns 1..N therefore yields N values per row.
    fn slice_row(&self, record: &StringRecord, line: usize) -> Result<Vec<f64>> {
        let bound = self.column_bound.ok_or_else(|| Error::Parse {
            path: self.path.to_path_buf(),
            line,
            message: "data row before any temperature header".to_string(),
        })?;

        let end = (2 + bound).min(record.len());
        (2..end)
            .map(|i| {
                let field = record.get(i).unwrap_or("");
                field.trim().parse::<f64>().map_err(|_| Error::DataFormat {
                    path: self.path.to_path_buf(),
                    line,
                    value: field.to_string(),
                })
            })
            .collect()
    }

    fn finalize_current(&mut self) {
        if let Some(plate) = self.current.take() {
            self.plates.push(plate);
        }
    }

    /// File end also finalizes an open block
    fn finish(mut self) -> Vec<Plate> {
        self.finalize_current();
        self.plates
    }
}
