//! Offline gear detection and downshift targets from recorded RPM and speed.

use std::io::Read;

use serde::Deserialize;

use crate::config::VehicleConfig;
use crate::ratio::Drivetrain;
use crate::telemetry::read_rows;
use crate::{RmError, MPH_TO_INCHES_PER_MIN, REVMATCH_NONE};

/// Raw logger output before gear and rev-match columns are derived.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Reading {
    #[serde(rename = "Time", default)]
    pub time: Option<f64>,
    #[serde(rename = "RPM")]
    pub rpm: f64,
    #[serde(rename = "MPH")]
    pub mph: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Annotated {
    pub time: Option<f64>,
    pub rpm: f64,
    pub mph: f64,
    pub gear: u32,
    pub revmatch: f64,
}

pub fn read_readings<R: Read>(reader: R) -> Result<Vec<Reading>, RmError> {
    read_rows(reader, &["RPM", "MPH"])
}

/// Pick the gear whose ratio is closest to the observed engine/wheel ratio.
///
/// Gears are compared against the midpoint between neighbouring ratios, so
/// the table must be ordered from the shortest (largest ratio) gear upward.
/// A stationary car is always in first.
pub fn infer_gear(drivetrain: &Drivetrain, rpm: f64, mph: f64) -> u32 {
    let table: Vec<(u32, f64)> = drivetrain.gears().zip(drivetrain.ratios()).collect();
    let top = table.last().map(|(gear, _)| *gear).unwrap_or(1);
    if mph == 0.0 {
        return 1;
    }
    let observed = (rpm * drivetrain.wheel_circumference_in)
        / (mph * MPH_TO_INCHES_PER_MIN)
        / drivetrain.final_drive;
    for pair in table.windows(2) {
        let (gear, ratio) = pair[0];
        let midpoint = (ratio + pair[1].1) / 2.0;
        if observed > midpoint {
            return gear;
        }
    }
    top
}

/// Current gear and the whole-number target RPM the logger records for it.
///
/// The target is evaluated with the current gear's ratio at the current speed,
/// the same way recordings are produced, so annotated files line up with
/// logged ones. It is [`REVMATCH_NONE`] in first gear or when it falls outside
/// the configured RPM window.
pub fn rev_match_target(
    config: &VehicleConfig,
    rpm: f64,
    mph: f64,
) -> Result<(u32, f64), RmError> {
    let gear = infer_gear(&config.drivetrain, rpm, mph);
    if gear < 2 {
        return Ok((gear, REVMATCH_NONE));
    }
    let target = config.drivetrain.theoretical_rpm(gear, mph)?.trunc();
    if config.rpm_range.contains(target) {
        Ok((gear, target))
    } else {
        Ok((gear, REVMATCH_NONE))
    }
}

/// Derive `CurrentGear` and `RevMatch` for every reading.
pub fn annotate(readings: &[Reading], config: &VehicleConfig) -> Result<Vec<Annotated>, RmError> {
    readings
        .iter()
        .map(|r| {
            let (gear, revmatch) = rev_match_target(config, r.rpm, r.mph)?;
            Ok(Annotated {
                time: r.time,
                rpm: r.rpm,
                mph: r.mph,
                gear,
                revmatch,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RpmRange;

    fn config() -> VehicleConfig {
        VehicleConfig {
            drivetrain: Drivetrain::default(),
            rpm_range: RpmRange {
                min: 1500,
                max: 7000,
            },
        }
    }

    #[test]
    fn test_stationary_is_first_gear() {
        assert_eq!(infer_gear(&Drivetrain::default(), 900.0, 0.0), 1);
    }

    #[test]
    fn test_infers_gear_from_its_own_theoretical_rpm() {
        let dt = Drivetrain::default();
        for gear in dt.gears() {
            let rpm = dt.theoretical_rpm(gear, 30.0).unwrap();
            assert_eq!(infer_gear(&dt, rpm, 30.0), gear);
        }
    }

    #[test]
    fn test_first_gear_has_no_target() {
        let dt = Drivetrain::default();
        let rpm = dt.theoretical_rpm(1, 15.0).unwrap();
        let (gear, target) = rev_match_target(&config(), rpm, 15.0).unwrap();
        assert_eq!(gear, 1);
        assert_eq!(target, REVMATCH_NONE);
    }

    #[test]
    fn test_target_uses_current_gear_ratio() {
        let dt = Drivetrain::default();
        let rpm = dt.theoretical_rpm(3, 40.0).unwrap() + 250.0;
        let (gear, target) = rev_match_target(&config(), rpm, 40.0).unwrap();
        assert_eq!(gear, 3);
        assert_eq!(target, dt.theoretical_rpm(3, 40.0).unwrap().trunc());
    }

    #[test]
    fn test_target_outside_window_is_sentinel() {
        let dt = Drivetrain::default();
        // Second gear at 70 mph lands above the 7000 RPM ceiling.
        let rpm = dt.theoretical_rpm(2, 70.0).unwrap();
        let (gear, target) = rev_match_target(&config(), rpm, 70.0).unwrap();
        assert_eq!(gear, 2);
        assert_eq!(target, REVMATCH_NONE);
    }

    #[test]
    fn test_annotate_csv() {
        let text = "RPM,MPH\n900,0\n3000,25.0\n";
        let readings = read_readings(text.as_bytes()).unwrap();
        assert_eq!(readings[0].time, None);
        let rows = annotate(&readings, &config()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].gear, 1);
        assert_eq!(rows[0].revmatch, REVMATCH_NONE);
        // 3000 rpm at 25 mph is second gear; 25 mph in second is 2689.8 rpm
        assert_eq!(rows[1].gear, 2);
        assert_eq!(rows[1].revmatch, 2689.0);
    }
}
