//! Error types for unplate-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in unplate-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// CSV parsing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// XML parsing error from the quick-xml crate
    #[error("XML error in '{path}': {source}")]
    Xml {
        path: PathBuf,
        #[source]
        source: quick_xml::Error,
    },

    /// Grammar violation in an instrument export
    #[error("parse error in '{path}' at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Non-numeric value where a number was expected
    #[error("bad numeric value '{value}' in '{path}' at line {line}")]
    DataFormat {
        path: PathBuf,
        line: usize,
        value: String,
    },

    /// Table headers are write-once
    #[error("table headers are immutable once set")]
    ImmutableHeaders,

    /// A row's value count does not match the header count
    #[error("row has {found} values, expected {expected}")]
    RowArity { expected: usize, found: usize },

    /// Columnar invariant violation: unequal column lengths
    #[error("column '{column}' has {found} values, expected {expected}")]
    RaggedColumns {
        column: String,
        expected: usize,
        found: usize,
    },

    /// Union source lacks columns this table requires
    #[error("data to append is missing columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// Natural join key is empty and cross joins were not requested
    #[error("tables share no columns; pass --allow-cross-join for a cross product")]
    NoSharedColumns,

    /// Input file extension maps to no known parser
    #[error("unsupported input format: '{0}'")]
    UnsupportedExtension(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
