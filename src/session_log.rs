//! Recorded position logs.
//!
//! One line per position fix, raw fix first and filtered estimate second:
//! `rx,ry,rz|fx,fy,fz`. Measurement runs are stored one file per reference
//! point, named `Direction(x_y_z).txt`, where coordinates may use a decimal
//! comma (`North(1,5_2_0,8).txt`).

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{PResult, PositioningError};
use crate::types::LocationData;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub raw: LocationData,
    pub filtered: LocationData,
}

impl SessionRecord {
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{}|{},{},{}",
            self.raw.x, self.raw.y, self.raw.z, self.filtered.x, self.filtered.y, self.filtered.z
        )
    }

    /// `line_no` is 1-based and only used for error reporting.
    pub fn parse_line(line: &str, line_no: usize) -> PResult<Self> {
        let (raw, filtered) = line.trim().split_once('|').ok_or_else(|| PositioningError::Parse {
            line: line_no,
            message: "missing '|' separator".to_string(),
        })?;
        Ok(Self {
            raw: parse_triplet(raw, line_no)?,
            filtered: parse_triplet(filtered, line_no)?,
        })
    }
}

fn parse_triplet(text: &str, line_no: usize) -> PResult<LocationData> {
    let values: Vec<f64> = text
        .split(',')
        .map(|part| {
            part.trim().parse::<f64>().map_err(|e| PositioningError::Parse {
                line: line_no,
                message: format!("bad coordinate '{}': {}", part.trim(), e),
            })
        })
        .collect::<PResult<_>>()?;

    match values.as_slice() {
        [x, y, z] => Ok(LocationData::new(*x, *y, *z)),
        _ => Err(PositioningError::Parse {
            line: line_no,
            message: format!("expected 3 coordinates, found {}", values.len()),
        }),
    }
}

pub fn read_session_log(path: impl AsRef<Path>) -> PResult<Vec<SessionRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(SessionRecord::parse_line(&line, idx + 1)?);
    }
    Ok(records)
}

pub fn write_session_log(path: impl AsRef<Path>, records: &[SessionRecord]) -> PResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for record in records {
        writeln!(writer, "{}", record.to_line())?;
    }
    writer.flush()?;
    Ok(())
}

/// Reference point encoded in a measurement file name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub direction: String,
    pub position: LocationData,
}

/// Parse `Direction(x_y_z)` out of a file name (extension optional).
pub fn parse_reference_name(name: &str) -> PResult<ReferencePoint> {
    let bad = |message: String| PositioningError::Parse { line: 0, message };

    let (direction, rest) = name
        .split_once('(')
        .ok_or_else(|| bad(format!("no '(' in file name '{}'", name)))?;
    let (coords, _) = rest
        .split_once(')')
        .ok_or_else(|| bad(format!("no ')' in file name '{}'", name)))?;

    let values: Vec<f64> = coords
        .split('_')
        .map(|part| {
            part.replace(',', ".")
                .parse::<f64>()
                .map_err(|e| bad(format!("bad coordinate '{}' in '{}': {}", part, name, e)))
        })
        .collect::<PResult<_>>()?;

    match values.as_slice() {
        [x, y, z] => Ok(ReferencePoint {
            direction: direction.to_string(),
            position: LocationData::new(*x, *y, *z),
        }),
        _ => Err(bad(format!("expected x_y_z in '{}'", name))),
    }
}
