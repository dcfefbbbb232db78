//! Columnar table engine: CSV round-trip, union and natural inner join

use crate::error::{Error, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Separator used when concatenating shared-column values into a join key.
/// Unit Separator is not expected in instrument data.
const KEY_SEP: char = '\u{1f}';

/// An in-memory table with named columns of equal length.
///
/// Headers are write-once; rows are appended positionally in declared
/// header order. Every mutating operation re-checks the rectangular
/// invariant before returning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    /// Column names in declared order
    headers: Vec<String>,
    /// Column name -> cell values
    columns: HashMap<String, Vec<CellValue>>,
}

impl Table {
    /// Create a new empty table with no headers
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table with its headers already set
    pub fn with_headers<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let mut table = Self::new();
        // set_headers only fails on a non-empty table
        let _ = table.set_headers(names);
        table
    }

    /// Establish the column set. Fails if headers were already set.
    pub fn set_headers<S: Into<String>>(
        &mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Result<()> {
        if !self.headers.is_empty() {
            return Err(Error::ImmutableHeaders);
        }
        for name in names {
            let name = name.into();
            self.columns.insert(name.clone(), Vec::new());
            self.headers.push(name);
        }
        Ok(())
    }

    /// Column names in declared order
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// (row count, column count)
    pub fn dimensions(&self) -> (usize, usize) {
        let rows = self
            .headers
            .first()
            .and_then(|h| self.columns.get(h))
            .map_or(0, Vec::len);
        (rows, self.headers.len())
    }

    /// True if the table holds no data rows
    pub fn is_empty(&self) -> bool {
        self.dimensions().0 == 0
    }

    /// Get a column's values by name
    pub fn column(&self, name: &str) -> Option<&[CellValue]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    /// Verify that every column has the same length
    pub fn check_rectangular(&self) -> Result<()> {
        let (rows, _) = self.dimensions();
        for header in &self.headers {
            let found = self.columns.get(header).map_or(0, Vec::len);
            if found != rows {
                return Err(Error::RaggedColumns {
                    column: header.clone(),
                    expected: rows,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Append one row, positionally aligned to the declared header order
    pub fn append_row(&mut self, values: Vec<CellValue>) -> Result<()> {
        if values.len() != self.headers.len() {
            return Err(Error::RowArity {
                expected: self.headers.len(),
                found: values.len(),
            });
        }
        for (header, value) in self.headers.iter().zip(values) {
            // set_headers guarantees an entry per header
            if let Some(column) = self.columns.get_mut(header) {
                column.push(value);
            }
        }
        self.check_rectangular()
    }

    /// Append all of `other`'s rows to this table.
    ///
    /// If this table has no headers yet it adopts `other`'s. Columns this
    /// table declares must all be present in `other` (missing ones are
    /// collected into a single error); columns only `other` has are
    /// dropped with a warning.
    pub fn union(&mut self, other: &Table) -> Result<()> {
        if self.headers.is_empty() {
            self.set_headers(other.headers.iter().cloned())?;
        }

        let missing: Vec<String> = self
            .headers
            .iter()
            .filter(|h| !other.columns.contains_key(h.as_str()))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(Error::MissingColumns(missing));
        }

        let extra: Vec<&str> = other
            .headers
            .iter()
            .filter(|h| !self.columns.contains_key(h.as_str()))
            .map(String::as_str)
            .collect();
        if !extra.is_empty() {
            warn!("ignoring extra columns in data to append: {}", extra.join(", "));
        }

        for header in &self.headers {
            if let (Some(dest), Some(src)) =
                (self.columns.get_mut(header), other.columns.get(header))
            {
                dest.extend(src.iter().cloned());
            }
        }
        self.check_rectangular()
    }

    /// Natural inner join on the intersection of column names.
    ///
    /// Both sides are bucketed by the concatenation of their shared-column
    /// values (shared names sorted, so the key is order-independent); every
    /// key present on both sides yields the cross product of its rows.
    /// Unmatched rows are dropped. An empty intersection is an error unless
    /// `allow_cross` turns it into an explicit full cross product.
    pub fn join(&mut self, other: &Table, allow_cross: bool) -> Result<()> {
        let mut shared: Vec<String> = self
            .headers
            .iter()
            .filter(|h| other.columns.contains_key(h.as_str()))
            .cloned()
            .collect();
        shared.sort();

        if shared.is_empty() {
            if !allow_cross {
                return Err(Error::NoSharedColumns);
            }
            info!("no shared columns; producing a full cross product");
        } else {
            info!("joining on shared columns: {}", shared.join(", "));
        }

        // Bucket right-hand rows by key, preserving row order per bucket
        let (right_rows, _) = other.dimensions();
        let mut right_index: HashMap<String, Vec<usize>> = HashMap::new();
        for i in 0..right_rows {
            right_index.entry(other.row_key(&shared, i)).or_default().push(i);
        }

        let right_only: Vec<String> = other
            .headers
            .iter()
            .filter(|h| !self.columns.contains_key(h.as_str()))
            .cloned()
            .collect();

        let mut merged_headers = self.headers.clone();
        merged_headers.extend(right_only.iter().cloned());
        let mut merged: HashMap<String, Vec<CellValue>> = merged_headers
            .iter()
            .map(|h| (h.clone(), Vec::new()))
            .collect();

        let (left_rows, _) = self.dimensions();
        for i in 0..left_rows {
            let key = self.row_key(&shared, i);
            let Some(matches) = right_index.get(&key) else {
                continue;
            };
            for &j in matches {
                for header in &self.headers {
                    if let (Some(dest), Some(src)) =
                        (merged.get_mut(header), self.columns.get(header))
                    {
                        dest.push(src[i].clone());
                    }
                }
                for header in &right_only {
                    if let (Some(dest), Some(src)) =
                        (merged.get_mut(header), other.columns.get(header))
                    {
                        dest.push(src[j].clone());
                    }
                }
            }
        }

        self.headers = merged_headers;
        self.columns = merged;
        self.check_rectangular()
    }

    fn row_key(&self, shared: &[String], row: usize) -> String {
        let mut key = String::new();
        for header in shared {
            if let Some(column) = self.columns.get(header) {
                key.push_str(&column[row].to_string_value());
            }
            key.push(KEY_SEP);
        }
        key
    }

    /// Load a delimited text file, auto-detecting comma vs tab.
    ///
    /// The first row is treated as headers, every following row as data.
    pub fn load_delimited<P: AsRef<Path>>(path: P) -> Result<Table> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let delimiter = sniff_delimiter(&content);
        Self::from_delimited_str(&content, delimiter, path)
    }

    /// Parse delimited text from a string (useful for testing)
    pub fn from_delimited_str<P: AsRef<Path>>(
        content: &str,
        delimiter: u8,
        source_name: P,
    ) -> Result<Table> {
        let path = source_name.as_ref();
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .from_reader(content.as_bytes());

        let headers = csv_reader.headers().map_err(|e| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut table = Table::new();
        table.set_headers(headers.iter())?;

        for result in csv_reader.records() {
            let record = result.map_err(|e| Error::Csv {
                path: path.to_path_buf(),
                source: e,
            })?;
            table.append_row(record.iter().map(CellValue::parse).collect())?;
        }

        Ok(table)
    }

    /// Write the table as delimited text, columns in declared header order
    pub fn write_delimited<P: AsRef<Path>>(&self, path: P, delimiter: u8) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(path)
            .map_err(|e| Error::Csv {
                path: path.to_path_buf(),
                source: e,
            })?;

        writer.write_record(&self.headers).map_err(|e| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;

        let (rows, _) = self.dimensions();
        for i in 0..rows {
            let record: Vec<String> = self
                .headers
                .iter()
                .filter_map(|h| self.columns.get(h))
                .map(|col| col[i].to_string_value())
                .collect();
            writer.write_record(&record).map_err(|e| Error::Csv {
                path: path.to_path_buf(),
                source: e,
            })?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Serialize the table to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Pick comma or tab by counting candidates in the leading sample
pub fn sniff_delimiter(content: &str) -> u8 {
    let sample = content.lines().next().unwrap_or("");
    let tabs = sample.matches('\t').count();
    let commas = sample.matches(',').count();
    if tabs > commas {
        b'\t'
    } else {
        b','
    }
}

/// A cell value with type detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// Integer value
    Integer(i64),
    /// Floating-point value
    Float(f64),
    /// String value
    String(String),
    /// Empty/null cell
    Empty,
}

impl CellValue {
    /// Parse a string into a CellValue, detecting the type
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return CellValue::Empty;
        }

        if let Ok(i) = trimmed.parse::<i64>() {
            return CellValue::Integer(i);
        }

        if let Ok(f) = trimmed.parse::<f64>() {
            return CellValue::Float(f);
        }

        CellValue::String(trimmed.to_string())
    }

    /// Check if the cell is empty
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Convert to a display string
    pub fn to_string_value(&self) -> String {
        match self {
            CellValue::Integer(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::String(s) => s.clone(),
            CellValue::Empty => String::new(),
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Float(fl) => write!(f, "{}", fl),
            CellValue::String(s) => write!(f, "{}", s),
            CellValue::Empty => write!(f, ""),
        }
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Integer(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::String(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_table(headers: &[&str], rows: &[&[&str]]) -> Table {
        let mut table = Table::with_headers(headers.iter().copied());
        for row in rows {
            table
                .append_row(row.iter().map(|s| CellValue::parse(s)).collect())
                .unwrap();
        }
        table
    }

    #[test]
    fn test_headers_are_immutable() {
        let mut table = Table::with_headers(["a", "b"]);
        let err = table.set_headers(["c"]).unwrap_err();
        assert!(matches!(err, Error::ImmutableHeaders));
    }

    #[test]
    fn test_append_row_arity_checked() {
        let mut table = Table::with_headers(["a", "b"]);
        let err = table.append_row(vec![CellValue::Integer(1)]).unwrap_err();
        assert!(matches!(err, Error::RowArity { expected: 2, found: 1 }));
    }

    #[test]
    fn test_union_adopts_headers_and_sums_rows() {
        let t1 = small_table(&["x", "y"], &[&["1", "a"], &["2", "b"]]);
        let t2 = small_table(&["x", "y"], &[&["3", "c"]]);

        let mut combined = Table::new();
        combined.union(&t1).unwrap();
        combined.union(&t2).unwrap();

        assert_eq!(combined.dimensions(), (3, 2));
        assert_eq!(
            combined.column("x").unwrap(),
            &[
                CellValue::Integer(1),
                CellValue::Integer(2),
                CellValue::Integer(3)
            ]
        );
    }

    #[test]
    fn test_union_drops_extra_columns() {
        let mut base = small_table(&["x"], &[&["1"]]);
        let superset = small_table(&["x", "extra"], &[&["2", "junk"], &["3", "junk"]]);

        base.union(&superset).unwrap();

        assert_eq!(base.dimensions(), (3, 1));
        assert!(base.column("extra").is_none());
    }

    #[test]
    fn test_union_lists_all_missing_columns() {
        let mut base = small_table(&["x", "y", "z"], &[&["1", "2", "3"]]);
        let narrow = small_table(&["x"], &[&["4"]]);

        match base.union(&narrow).unwrap_err() {
            Error::MissingColumns(missing) => {
                assert_eq!(missing, vec!["y".to_string(), "z".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_union_preserves_relative_row_order() {
        let p1 = small_table(
            &["plate_name", "value"],
            &[&["P1", "0.1"], &["P1", "0.2"]],
        );
        let p2 = small_table(
            &["plate_name", "value"],
            &[&["P2", "0.3"], &["P2", "0.4"]],
        );

        let mut all = Table::new();
        all.union(&p1).unwrap();
        all.union(&p2).unwrap();

        let names: Vec<String> = all
            .column("plate_name")
            .unwrap()
            .iter()
            .map(CellValue::to_string_value)
            .collect();
        assert_eq!(names, vec!["P1", "P1", "P2", "P2"]);
    }

    #[test]
    fn test_join_on_single_shared_column() {
        let mut result = small_table(
            &["filename", "well", "value"],
            &[
                &["a.csv", "A1", "0.1"],
                &["a.csv", "A2", "0.2"],
                &["b.csv", "A1", "0.9"],
            ],
        );
        let metadata = small_table(
            &["filename", "treatment"],
            &[&["a.csv", "drug"], &["c.csv", "control"]],
        );

        result.join(&metadata, false).unwrap();

        // b.csv has no metadata, c.csv has no data
        assert_eq!(result.dimensions(), (2, 4));
        let treatments: Vec<String> = result
            .column("treatment")
            .unwrap()
            .iter()
            .map(CellValue::to_string_value)
            .collect();
        assert_eq!(treatments, vec!["drug", "drug"]);
        let wells: Vec<String> = result
            .column("well")
            .unwrap()
            .iter()
            .map(CellValue::to_string_value)
            .collect();
        assert_eq!(wells, vec!["A1", "A2"]);
    }

    #[test]
    fn test_join_multi_row_match_is_cross_product() {
        let mut left = small_table(&["k", "l"], &[&["1", "a"], &["1", "b"]]);
        let right = small_table(&["k", "r"], &[&["1", "x"], &["1", "y"]]);

        left.join(&right, false).unwrap();
        assert_eq!(left.dimensions(), (4, 3));
    }

    #[test]
    fn test_join_output_keys_exist_in_both_inputs() {
        let mut left = small_table(&["k", "l"], &[&["1", "a"], &["2", "b"], &["3", "c"]]);
        let right = small_table(&["k", "r"], &[&["2", "x"], &["3", "y"], &["4", "z"]]);

        left.join(&right, false).unwrap();

        let keys: Vec<String> = left
            .column("k")
            .unwrap()
            .iter()
            .map(CellValue::to_string_value)
            .collect();
        assert_eq!(keys, vec!["2", "3"]);
    }

    #[test]
    fn test_join_without_shared_columns_errors() {
        let mut left = small_table(&["a"], &[&["1"]]);
        let right = small_table(&["b"], &[&["2"]]);

        let err = left.join(&right, false).unwrap_err();
        assert!(matches!(err, Error::NoSharedColumns));
    }

    #[test]
    fn test_explicit_cross_join() {
        let mut left = small_table(&["a"], &[&["1"], &["2"]]);
        let right = small_table(&["b"], &[&["x"], &["y"], &["z"]]);

        left.join(&right, true).unwrap();
        assert_eq!(left.dimensions(), (6, 2));
    }

    #[test]
    fn test_delimiter_sniffing() {
        assert_eq!(sniff_delimiter("a,b,c\n1,2,3\n"), b',');
        assert_eq!(sniff_delimiter("a\tb\tc\n1\t2\t3\n"), b'\t');
        assert_eq!(sniff_delimiter("a,b\tc,d\n"), b',');
    }

    #[test]
    fn test_load_tab_delimited_str() {
        let table = Table::from_delimited_str("a\tb\n1\tx\n", b'\t', "meta.txt").unwrap();
        assert_eq!(table.headers(), &["a".to_string(), "b".to_string()]);
        assert_eq!(table.column("b").unwrap(), &[CellValue::String("x".into())]);
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");

        let original = small_table(
            &["plate_name", "row", "value"],
            &[&["P1", "A", "0.25"], &["P1", "B", "1.5"]],
        );
        original.write_delimited(&path, b',').unwrap();

        let reloaded = Table::load_delimited(&path).unwrap();
        assert_eq!(reloaded.headers(), original.headers());
        assert_eq!(reloaded.dimensions(), original.dimensions());
        assert_eq!(reloaded.column("value"), original.column("value"));
    }

    #[test]
    fn test_cell_value_parse() {
        assert_eq!(CellValue::parse("42"), CellValue::Integer(42));
        assert_eq!(CellValue::parse("3.14"), CellValue::Float(3.14));
        assert_eq!(CellValue::parse("abc"), CellValue::String("abc".into()));
        assert_eq!(CellValue::parse("  "), CellValue::Empty);
    }
}
