use std::collections::BTreeSet;
use std::fmt;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::{RmError, REVMATCH_NONE};

const SAMPLE_COLUMNS: [&str; 4] = ["Time", "RPM", "CurrentGear", "RevMatch"];
const DRIVE_COLUMNS: [&str; 3] = ["RPM", "CurrentGear", "MPH"];

/// One telemetry row as recorded by the logger.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Sample {
    #[serde(rename = "Time")]
    pub time: f64,
    #[serde(rename = "RPM")]
    pub rpm: f64,
    #[serde(rename = "CurrentGear")]
    pub gear: u32,
    #[serde(rename = "RevMatch")]
    pub revmatch: f64,
    #[serde(rename = "MPH", default)]
    pub speed: Option<f64>,
}

impl Sample {
    pub fn new(time: f64, rpm: f64, gear: u32, revmatch: f64) -> Self {
        Self {
            time,
            rpm,
            gear,
            revmatch,
            speed: None,
        }
    }

    pub fn has_revmatch(&self) -> bool {
        self.revmatch != REVMATCH_NONE
    }

    /// A rev-match target is only plotted for gears that have a lower gear to shift into.
    pub fn revmatch_valid(&self) -> bool {
        self.gear > 1 && self.has_revmatch()
    }
}

/// The subset of columns the ratio analysis needs.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DriveSample {
    #[serde(rename = "RPM")]
    pub rpm: f64,
    #[serde(rename = "CurrentGear")]
    pub gear: u32,
    #[serde(rename = "MPH")]
    pub speed: f64,
}

/// Read every row of a telemetry CSV into memory.
pub fn read_samples<R: Read>(reader: R) -> Result<Vec<Sample>, RmError> {
    read_rows(reader, &SAMPLE_COLUMNS)
}

/// Read the `RPM`, `CurrentGear` and `MPH` columns of a telemetry CSV.
pub fn read_drive_samples<R: Read>(reader: R) -> Result<Vec<DriveSample>, RmError> {
    read_rows(reader, &DRIVE_COLUMNS)
}

pub(crate) fn read_rows<R, T>(reader: R, required: &[&'static str]) -> Result<Vec<T>, RmError>
where
    R: Read,
    T: for<'de> Deserialize<'de>,
{
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = rdr.headers()?.clone();
    for &column in required {
        if !headers.iter().any(|h| h == column) {
            return Err(RmError::MissingColumn(column));
        }
    }
    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Console diagnostics printed after rendering.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Summary {
    pub rows: usize,
    pub gears: Vec<u32>,
    pub rpm_range: Option<(f64, f64)>,
    pub revmatch_range: Option<(f64, f64)>,
}

impl Summary {
    pub fn from_samples(samples: &[Sample]) -> Self {
        let gears: BTreeSet<u32> = samples.iter().map(|s| s.gear).collect();
        Self {
            rows: samples.len(),
            gears: gears.into_iter().collect(),
            rpm_range: min_max(samples.iter().map(|s| s.rpm)),
            revmatch_range: min_max(
                samples
                    .iter()
                    .filter(|s| s.has_revmatch())
                    .map(|s| s.revmatch),
            ),
        }
    }
}

fn min_max<I: Iterator<Item = f64>>(values: I) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn fmt_range(range: Option<(f64, f64)>) -> String {
    range
        .map(|(lo, hi)| format!("{} - {}", lo, hi))
        .unwrap_or_else(|| "n/a".into())
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Data points: {}", self.rows)?;
        writeln!(f, "Gears present: {:?}", self.gears)?;
        writeln!(f, "RPM range: {}", fmt_range(self.rpm_range))?;
        write!(
            f,
            "RevMatch range (excluding -1): {}",
            fmt_range(self.revmatch_range)
        )
    }
}
