//! unplate-core: Core library for converting plate-reader exports
//!
//! This library provides functionality to:
//! - Parse delimited-text instrument exports by scanning for plate blocks
//! - Parse XML instrument exports with per-well values
//! - Project plate grids into tidy (long-format) tables
//! - Union per-plate tables and join external metadata tables
//! - Round-trip tables through delimited text

pub mod error;
pub mod parser;
pub mod pipeline;
pub mod plate;
pub mod table;
pub mod tidy;
pub mod xml;

pub use error::{Error, Result};
pub use parser::{parse_text, parse_text_str, PLATE_END, PLATE_START};
pub use pipeline::{convert, parse_export, ConvertOptions, RunReport};
pub use plate::{row_label, ParsedExport, Plate, PlateRow};
pub use table::{sniff_delimiter, CellValue, Table};
pub use tidy::{project, TIDY_HEADERS};
pub use xml::{parse_xml, parse_xml_str};
