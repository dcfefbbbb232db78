//! XML instrument export parser
//!
//! Unlike the text scanner there is no block state machine here; plate
//! boundaries come straight from the `PlateSection` element structure.
//! Well values arrive keyed by well name ("A1"), so row order is
//! reconstructed by sorting labels by row letter then column number and
//! feeding the rows through the same append path as the text variant.

use crate::error::{Error, Result};
use crate::plate::{ParsedExport, Plate};
use chrono::NaiveDateTime;
use log::debug;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Instrument clock format, e.g. "10:21:02 AM 1/22/2016"
const CLOCK_FORMAT: &str = "%I:%M:%S %p %m/%d/%Y";

/// Parse an XML export file
pub fn parse_xml<P: AsRef<Path>>(path: P) -> Result<ParsedExport> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_xml_str(&content, path)
}

/// Parse XML from a string (useful for testing)
pub fn parse_xml_str<P: AsRef<Path>>(content: &str, source_name: P) -> Result<ParsedExport> {
    let path = source_name.as_ref();
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut plates = Vec::new();
    let mut section: Option<Section> = None;
    let mut current_well: Option<String> = None;
    let mut target = Target::None;
    let mut text = String::new();

    loop {
        let event = reader.read_event().map_err(|e| Error::Xml {
            path: path.to_path_buf(),
            source: e,
        })?;
        match event {
            Event::Start(ref e) => match e.local_name().as_ref() {
                b"PlateSection" => {
                    let name = get_attribute(e, "Name", path)?.unwrap_or_default();
                    section = Some(Section::new(strip_control(&name)));
                }
                b"InstrumentSettings" => {
                    if let Some(section) = section.as_mut() {
                        section.read_mode = get_attribute(e, "ReadMode", path)?.unwrap_or_default();
                    }
                }
                b"Well" => {
                    current_well = get_attribute(e, "Name", path)?;
                }
                b"ReadTime" => target = start_text(Target::ReadTime, &mut text),
                b"ReadTemperature" => target = start_text(Target::Temperature, &mut text),
                b"RawData" => target = start_text(Target::RawData, &mut text),
                _ => {}
            },
            Event::Empty(ref e) => {
                if e.local_name().as_ref() == b"InstrumentSettings" {
                    if let Some(section) = section.as_mut() {
                        section.read_mode = get_attribute(e, "ReadMode", path)?.unwrap_or_default();
                    }
                }
            }
            Event::Text(ref t) => {
                if target != Target::None {
                    let fragment = t.unescape().map_err(|e| Error::Xml {
                        path: path.to_path_buf(),
                        source: e,
                    })?;
                    text.push_str(&fragment);
                }
            }
            Event::End(ref e) => match e.local_name().as_ref() {
                b"ReadTime" => {
                    if let Some(section) = section.as_mut() {
                        section.read_time = Some(text.clone());
                    }
                    target = Target::None;
                }
                b"ReadTemperature" => {
                    if let Some(section) = section.as_mut() {
                        section.temperature = text.clone();
                    }
                    target = Target::None;
                }
                b"RawData" => {
                    if let (Some(section), Some(well)) = (section.as_mut(), current_well.as_ref()) {
                        let value = text.trim().parse::<f64>().map_err(|_| Error::DataFormat {
                            path: path.to_path_buf(),
                            line: line_of(content, reader.buffer_position()),
                            value: text.trim().to_string(),
                        })?;
                        section.wells.push((well.clone(), value));
                    }
                    target = Target::None;
                }
                b"Well" => current_well = None,
                b"PlateSection" => {
                    if let Some(section) = section.take() {
                        if let Some(plate) = section.into_plate(path)? {
                            plates.push(plate);
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(ParsedExport {
        path: path.to_path_buf(),
        plates,
    })
}

/// Which element's character data is currently being collected
#[derive(Debug, PartialEq)]
enum Target {
    None,
    ReadTime,
    Temperature,
    RawData,
}

fn start_text(target: Target, text: &mut String) -> Target {
    text.clear();
    target
}

/// Accumulated state for one `PlateSection` element
struct Section {
    name: String,
    read_time: Option<String>,
    read_mode: String,
    temperature: String,
    wells: Vec<(String, f64)>,
}

impl Section {
    fn new(name: String) -> Self {
        Self {
            name,
            read_time: None,
            read_mode: String::new(),
            temperature: String::new(),
            wells: Vec::new(),
        }
    }

    /// Build a plate, or `None` for sections without a read time
    /// (settings/summary sections, not plate data).
    fn into_plate(self, path: &Path) -> Result<Option<Plate>> {
        let Some(read_time) = self.read_time else {
            debug!("skipping plate section '{}' without a read time", self.name);
            return Ok(None);
        };
        let time_stamp = parse_clock(&read_time, path)?;

        // Group wells into rows, ordering columns numerically
        let mut grid: BTreeMap<String, BTreeMap<usize, f64>> = BTreeMap::new();
        for (well, value) in self.wells {
            let (row, column) = split_well_name(&well, path)?;
            grid.entry(row).or_default().insert(column, value);
        }

        let mut plate = Plate::new(
            self.name,
            path.to_string_lossy(),
            self.read_mode,
            self.temperature,
            time_stamp,
        );
        for row in grid.into_values() {
            plate.push_row(row.into_values().collect())?;
        }
        Ok(Some(plate))
    }
}

/// Parse the instrument clock format into epoch seconds
fn parse_clock(value: &str, path: &Path) -> Result<i64> {
    let parsed =
        NaiveDateTime::parse_from_str(value.trim(), CLOCK_FORMAT).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            line: 0,
            message: format!("bad read time '{}': {}", value.trim(), e),
        })?;
    Ok(parsed.and_utc().timestamp())
}

/// Split a well name like "A1" into its row letters and column number
fn split_well_name(well: &str, path: &Path) -> Result<(String, usize)> {
    let digits = well.find(|c: char| c.is_ascii_digit()).unwrap_or(well.len());
    let (row, column) = well.split_at(digits);
    let column = column.parse::<usize>().ok();
    match (row.is_empty(), column) {
        (false, Some(column)) => Ok((row.to_string(), column)),
        _ => Err(Error::Parse {
            path: path.to_path_buf(),
            line: 0,
            message: format!("bad well name '{}'", well),
        }),
    }
}

/// Instrument exports embed NULs and other control bytes in plate names
fn strip_control(s: &str) -> String {
    s.chars().filter(|c| !c.is_control()).collect()
}

fn get_attribute(e: &BytesStart, name: &str, path: &Path) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| Error::Xml {
            path: path.to_path_buf(),
            source: quick_xml::Error::from(e),
        })?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = attr.unescape_value().map_err(|e| Error::Xml {
                path: path.to_path_buf(),
                source: e,
            })?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn line_of(content: &str, position: u64) -> usize {
    let position = (position as usize).min(content.len());
    content[..position].matches('\n').count() + 1
}
