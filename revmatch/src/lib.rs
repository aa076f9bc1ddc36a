//! Gear segmentation and drivetrain analysis for recorded rev-match telemetry.

use thiserror::Error;

pub mod config;
pub mod gearbox;
pub mod palette;
pub mod ratio;
pub mod segment;
pub mod telemetry;

pub use config::{
    load_rpm_bounds, parse_rpm_bounds, parse_vehicle_config, BoundsFallback, RpmRange,
    VehicleConfig,
};
pub use gearbox::{annotate, infer_gear, read_readings, rev_match_target, Annotated, Reading};
pub use palette::{build_legend, gear_color, LegendEntry, Rgb, DEFAULT_COLOR};
pub use ratio::{analyze_ratios, Drivetrain, GearCurve, GroupOutcome, LinearFit, TeethRatio};
pub use segment::{segment, Segment, Segmenter, Segments};
pub use telemetry::{read_drive_samples, read_samples, DriveSample, Sample, Summary};

/// Sentinel stored in the `RevMatch` column when no downshift target applies.
pub const REVMATCH_NONE: f64 = -1.0;

/// Converts miles per hour into inches per minute.
pub const MPH_TO_INCHES_PER_MIN: f64 = 1056.0;

#[derive(Error, Debug)]
pub enum RmError {
    #[error("failed to read telemetry CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing required column: {0}")]
    MissingColumn(&'static str),
    #[error("gear {0} has no entry in the drivetrain ratio table")]
    UnknownGear(u32),
    #[error("invalid vehicle config: {0}")]
    Config(String),
    #[error("insufficient data: {0}")]
    InsufficientData(String),
}
