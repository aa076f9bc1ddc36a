//! Readers for the plain-text `config.txt` shared with the logger.
//!
//! The file mixes tooth-count pairs (`input,output`) with bare numeric lines:
//!
//! ```text
//! 15,61      # final drive
//! 11,37      # gear 1
//! 22,41      # gear 2
//! 2000
//! 6800
//! 74.38402
//! ```
//!
//! The bare lines are, in order, the minimum RPM, maximum RPM and wheel
//! circumference in inches. Plotting only needs the RPM window and treats a
//! bad file as "no bounds"; gear analysis needs all of it and fails loudly.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::ratio::{Drivetrain, TeethRatio};
use crate::RmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RpmRange {
    pub min: i32,
    pub max: i32,
}

impl RpmRange {
    pub fn contains(&self, rpm: f64) -> bool {
        rpm >= self.min as f64 && rpm <= self.max as f64
    }
}

/// Reasons the plot falls back to an auto-scaled Y axis.
#[derive(Error, Debug)]
pub enum BoundsFallback {
    #[error("{0} not found, using auto-scale")]
    NotFound(String),
    #[error("{0} could not be read ({1}), using auto-scale")]
    Unreadable(String, io::Error),
    #[error("{0} doesn't have enough valid lines, using auto-scale")]
    InsufficientLines(String),
    #[error("invalid RPM values in {0} ('{1}'), using auto-scale")]
    InvalidValue(String, String),
}

/// Read the RPM axis window from `path`.
pub fn load_rpm_bounds(path: &Path) -> Result<RpmRange, BoundsFallback> {
    let name = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => BoundsFallback::NotFound(name.clone()),
        _ => BoundsFallback::Unreadable(name.clone(), err),
    })?;
    parse_rpm_bounds(&text, &name)
}

/// The first two non-blank lines without a comma are the min and max RPM.
pub fn parse_rpm_bounds(text: &str, name: &str) -> Result<RpmRange, BoundsFallback> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.contains(','))
        .take(2)
        .collect();
    if lines.len() < 2 {
        return Err(BoundsFallback::InsufficientLines(name.to_string()));
    }
    let parse = |line: &str| {
        line.parse::<i32>()
            .map_err(|_| BoundsFallback::InvalidValue(name.to_string(), line.to_string()))
    };
    Ok(RpmRange {
        min: parse(lines[0])?,
        max: parse(lines[1])?,
    })
}

#[derive(Clone, Debug, PartialEq)]
pub struct VehicleConfig {
    pub drivetrain: Drivetrain,
    pub rpm_range: RpmRange,
}

/// Strict parse of the full vehicle description.
pub fn parse_vehicle_config(text: &str) -> Result<VehicleConfig, RmError> {
    let mut final_drive: Option<TeethRatio> = None;
    let mut gears: Vec<TeethRatio> = Vec::new();
    let mut min_rpm: Option<i32> = None;
    let mut max_rpm: Option<i32> = None;
    let mut wheel: Option<f64> = None;
    let mut bare_lines = 0usize;

    for raw in text.lines() {
        let line = match raw.split_once('#') {
            Some((before, _)) => before.trim(),
            None => raw.trim(),
        };
        if line.is_empty() {
            continue;
        }

        if line.contains(',') {
            let teeth = parse_teeth(line)?;
            if final_drive.is_none() {
                final_drive = Some(teeth);
            } else {
                gears.push(teeth);
            }
            continue;
        }

        match bare_lines {
            0 => min_rpm = Some(parse_number(line, "min_rpm")?),
            1 => max_rpm = Some(parse_number(line, "max_rpm")?),
            2 => wheel = Some(parse_number(line, "wheel circumference")?),
            _ => {
                return Err(RmError::Config(format!(
                    "unexpected extra line '{}'",
                    line
                )))
            }
        }
        bare_lines += 1;
    }

    let mut missing = Vec::new();
    if final_drive.is_none() {
        missing.push("final drive ratio");
    }
    if gears.is_empty() {
        missing.push("gear ratio data");
    }
    if min_rpm.is_none() || max_rpm.is_none() {
        missing.push("RPM range data");
    }
    if wheel.is_none() {
        missing.push("wheel circumference");
    }

    match (final_drive, min_rpm, max_rpm, wheel) {
        (Some(final_drive), Some(min), Some(max), Some(wheel)) if !gears.is_empty() => {
            if wheel <= 0.0 {
                return Err(RmError::Config(
                    "wheel circumference must be positive".into(),
                ));
            }
            Ok(VehicleConfig {
                drivetrain: Drivetrain::from_teeth(final_drive, &gears, wheel),
                rpm_range: RpmRange { min, max },
            })
        }
        _ => Err(RmError::Config(format!("missing {}", missing.join(", ")))),
    }
}

fn parse_teeth(line: &str) -> Result<TeethRatio, RmError> {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    let invalid = || RmError::Config(format!("invalid gear ratio line '{}'", line));
    let (input, output) = compact.split_once(',').ok_or_else(invalid)?;
    let input: u32 = input.parse().map_err(|_| invalid())?;
    let output: u32 = output.parse().map_err(|_| invalid())?;
    if input == 0 || output == 0 {
        return Err(invalid());
    }
    Ok(TeethRatio { input, output })
}

fn parse_number<T: std::str::FromStr>(line: &str, what: &str) -> Result<T, RmError> {
    line.parse()
        .map_err(|_| RmError::Config(format!("invalid {} value '{}'", what, line)))
}
