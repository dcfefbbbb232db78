//! Conversion pipeline: files in, one tidy table out

use crate::error::{Error, Result};
use crate::parser;
use crate::plate::ParsedExport;
use crate::table::Table;
use crate::xml;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Knobs for a conversion run
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    /// Allow a metadata join with no shared columns (full cross product)
    pub allow_cross_join: bool,
    /// Skip input files that fail to parse instead of aborting the run
    pub keep_going: bool,
}

/// Summary of a conversion run
#[derive(Debug, Default)]
pub struct RunReport {
    /// Input files successfully converted
    pub files_converted: usize,
    /// Plates extracted across all inputs
    pub plates: usize,
    /// Rows in the final table
    pub rows: usize,
    /// Per-file failures collected in keep-going mode
    pub failures: Vec<(PathBuf, String)>,
}

/// Parse one export file, selecting the parser by extension
pub fn parse_export<P: AsRef<Path>>(path: P) -> Result<ParsedExport> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("csv") | Some("txt") => parser::parse_text(path),
        Some("xml") => xml::parse_xml(path),
        _ => Err(Error::UnsupportedExtension(path.to_path_buf())),
    }
}

/// Convert a set of export files into one tidy table, optionally joining
/// metadata tables listed in a manifest file.
///
/// Fail-fast by default; with `keep_going` a failing input is skipped and
/// recorded in the report. Metadata failures are always fatal since they
/// affect every row of the result.
pub fn convert(
    inputs: &[PathBuf],
    manifest: Option<&Path>,
    options: &ConvertOptions,
) -> Result<(Table, RunReport)> {
    let mut all = Table::new();
    let mut report = RunReport::default();

    for input in inputs {
        match union_plates(input, &mut all) {
            Ok(plates) => {
                report.files_converted += 1;
                report.plates += plates;
            }
            Err(e) if options.keep_going => {
                warn!("skipping '{}': {}", input.display(), e);
                report.failures.push((input.clone(), e.to_string()));
            }
            Err(e) => return Err(e),
        }
    }

    if let Some(manifest) = manifest {
        for path in read_manifest(manifest)? {
            info!("joining metadata from '{}'", path.display());
            let metadata = Table::load_delimited(&path)?;
            all.join(&metadata, options.allow_cross_join)?;
        }
    }

    report.rows = all.dimensions().0;
    Ok((all, report))
}

/// Parse one file and union its plates' tidy tables into `all`
fn union_plates(input: &Path, all: &mut Table) -> Result<usize> {
    let export = parse_export(input)?;
    let mut count = 0;
    for plate in &export.plates {
        if plate.data_table().is_empty() {
            debug!("skipping empty plate '{}' from '{}'", plate.name, input.display());
            continue;
        }
        all.union(plate.data_table())?;
        count += 1;
    }
    Ok(count)
}

/// A metadata manifest is a plain file with one table path per line, no
/// header. Blank lines are ignored.
fn read_manifest(path: &Path) -> Result<Vec<PathBuf>> {
    let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::CellValue;
    use std::fs;

    fn text_export(name: &str, values: &str) -> String {
        format!(
            "Plate:,{name},,,,Absorbance\n,Temperature(C),1,2\n,37,{values}\n~End\n"
        )
    }

    #[test]
    fn test_convert_unions_all_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, text_export("P1", "0.1,0.2")).unwrap();
        fs::write(&b, text_export("P2", "0.3,0.4")).unwrap();

        let (table, report) =
            convert(&[a, b], None, &ConvertOptions::default()).unwrap();

        // two plates, two wells each
        assert_eq!(report.files_converted, 2);
        assert_eq!(report.plates, 2);
        assert_eq!(table.dimensions().0, 4);
        let names: Vec<String> = table
            .column("plate_name")
            .unwrap()
            .iter()
            .map(CellValue::to_string_value)
            .collect();
        assert_eq!(names, vec!["P1", "P1", "P2", "P2"]);
    }

    #[test]
    fn test_metadata_join_narrows_result() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, text_export("P1", "0.1,0.2")).unwrap();
        fs::write(&b, text_export("P2", "0.3,0.4")).unwrap();

        // Metadata only covers a.csv, keyed on the tidy filename column
        let metadata = dir.path().join("metadata.csv");
        fs::write(
            &metadata,
            format!("filename,treatment\n{},drug\n", a.display()),
        )
        .unwrap();
        let manifest = dir.path().join("manifest.txt");
        fs::write(&manifest, format!("{}\n", metadata.display())).unwrap();

        let (table, _) = convert(
            &[a, b],
            Some(&manifest),
            &ConvertOptions::default(),
        )
        .unwrap();

        assert_eq!(table.dimensions().0, 2);
        let treatments: Vec<String> = table
            .column("treatment")
            .unwrap()
            .iter()
            .map(CellValue::to_string_value)
            .collect();
        assert_eq!(treatments, vec!["drug", "drug"]);
    }

    #[test]
    fn test_fail_fast_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.csv");
        let bad = dir.path().join("bad.csv");
        fs::write(&good, text_export("P1", "0.1,0.2")).unwrap();
        fs::write(&bad, "Plate:,P2,,,,Absorbance\n,37,0.3,0.4\n~End\n").unwrap();

        let result = convert(&[good, bad], None, &ConvertOptions::default());
        assert!(matches!(result, Err(Error::Parse { .. })));
    }

    #[test]
    fn test_keep_going_collects_failures() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.csv");
        let bad = dir.path().join("bad.csv");
        fs::write(&good, text_export("P1", "0.1,0.2")).unwrap();
        fs::write(&bad, "Plate:,P2,,,,Absorbance\n,37,0.3,0.4\n~End\n").unwrap();

        let options = ConvertOptions {
            keep_going: true,
            ..Default::default()
        };
        let (table, report) = convert(&[bad.clone(), good], None, &options).unwrap();

        assert_eq!(report.files_converted, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, bad);
        assert_eq!(table.dimensions().0, 2);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = parse_export("export.pdf").unwrap_err();
        assert!(matches!(err, Error::UnsupportedExtension(_)));
    }

    #[test]
    fn test_xml_and_text_inputs_share_one_schema() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("a.csv");
        fs::write(&text, text_export("P1", "0.1,0.2")).unwrap();

        let xml = dir.path().join("b.xml");
        fs::write(
            &xml,
            r#"<Experiment xmlns="http://moleculardevices.com/microplateData">
<PlateSection Name="P2">
  <ReadTime>10:21:02 AM 1/22/2016</ReadTime>
  <InstrumentSettings ReadMode="Fluorescence">
    <ReadTemperature>25</ReadTemperature>
  </InstrumentSettings>
  <Wells>
    <Well Name="A1"><RawData>1.5</RawData></Well>
    <Well Name="A2"><RawData>2.5</RawData></Well>
  </Wells>
</PlateSection>
</Experiment>"#,
        )
        .unwrap();

        let (table, report) =
            convert(&[text, xml], None, &ConvertOptions::default()).unwrap();

        assert_eq!(report.plates, 2);
        assert_eq!(table.dimensions().0, 4);
        let modes: Vec<String> = table
            .column("measurement_type")
            .unwrap()
            .iter()
            .map(CellValue::to_string_value)
            .collect();
        assert_eq!(modes, vec!["Absorbance", "Absorbance", "Fluorescence", "Fluorescence"]);
    }
}
