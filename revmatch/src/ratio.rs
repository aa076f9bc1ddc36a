// Expected engine speed per gear from the drivetrain ratios, compared with a
// straight-line fit through the measured RPM/speed pairs of each gear.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array1;
use ordered_float::OrderedFloat;

use crate::telemetry::DriveSample;
use crate::{RmError, MPH_TO_INCHES_PER_MIN};

/// A ratio expressed by tooth counts; the multiplier is `output / input`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TeethRatio {
    pub input: u32,
    pub output: u32,
}

impl TeethRatio {
    pub const fn new(input: u32, output: u32) -> Self {
        Self { input, output }
    }

    pub fn ratio(&self) -> f64 {
        self.output as f64 / self.input as f64
    }
}

const DEFAULT_FINAL_DRIVE: TeethRatio = TeethRatio::new(15, 61);
const DEFAULT_GEARS: [TeethRatio; 5] = [
    TeethRatio::new(11, 37),
    TeethRatio::new(22, 41),
    TeethRatio::new(28, 37),
    TeethRatio::new(34, 35),
    TeethRatio::new(39, 32),
];
const DEFAULT_WHEEL_CIRCUMFERENCE_IN: f64 = 74.38402;

#[derive(Clone, Debug, PartialEq)]
pub struct Drivetrain {
    pub final_drive: f64,
    pub wheel_circumference_in: f64,
    gear_ratios: BTreeMap<u32, f64>,
}

impl Default for Drivetrain {
    fn default() -> Self {
        Self::from_teeth(
            DEFAULT_FINAL_DRIVE,
            &DEFAULT_GEARS,
            DEFAULT_WHEEL_CIRCUMFERENCE_IN,
        )
    }
}

impl Drivetrain {
    pub fn new<I>(final_drive: f64, wheel_circumference_in: f64, gear_ratios: I) -> Self
    where
        I: IntoIterator<Item = (u32, f64)>,
    {
        Self {
            final_drive,
            wheel_circumference_in,
            gear_ratios: gear_ratios.into_iter().collect(),
        }
    }

    /// Gears are numbered from 1 in the order given.
    pub fn from_teeth(final_drive: TeethRatio, gears: &[TeethRatio], wheel_in: f64) -> Self {
        Self::new(
            final_drive.ratio(),
            wheel_in,
            gears
                .iter()
                .enumerate()
                .map(|(idx, teeth)| (idx as u32 + 1, teeth.ratio())),
        )
    }

    pub fn gears(&self) -> impl Iterator<Item = u32> + '_ {
        self.gear_ratios.keys().copied()
    }

    pub(crate) fn ratios(&self) -> impl Iterator<Item = f64> + '_ {
        self.gear_ratios.values().copied()
    }

    pub fn ratio(&self, gear: u32) -> Result<f64, RmError> {
        self.gear_ratios
            .get(&gear)
            .copied()
            .ok_or(RmError::UnknownGear(gear))
    }

    /// Engine RPM at `mph` in `gear` with no clutch slip.
    pub fn theoretical_rpm(&self, gear: u32, mph: f64) -> Result<f64, RmError> {
        let ratio = self.ratio(gear)?;
        Ok(MPH_TO_INCHES_PER_MIN * mph * self.final_drive * ratio / self.wheel_circumference_in)
    }
}

/// `y = slope * x + intercept`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
}

impl LinearFit {
    /// Ordinary least squares. `None` when `xs` has fewer than two distinct values.
    pub fn fit(xs: &Array1<f64>, ys: &Array1<f64>) -> Option<Self> {
        if xs.len() != ys.len() || xs.len() < 2 {
            return None;
        }
        let x_mean = xs.mean()?;
        let y_mean = ys.mean()?;
        let dx = xs - x_mean;
        let dy = ys - y_mean;
        let sxx = dx.dot(&dx);
        if sxx <= 0.0 || !sxx.is_finite() {
            return None;
        }
        let slope = dx.dot(&dy) / sxx;
        Some(Self {
            slope,
            intercept: y_mean - slope * x_mean,
        })
    }

    pub fn eval(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

#[derive(Clone, Debug)]
pub struct GearCurve {
    pub gear: u32,
    /// `(theoretical_rpm, mph)` ordered by speed.
    pub theoretical: Vec<(f64, f64)>,
    /// `(measured_rpm, mph)` ordered by speed.
    pub measured: Vec<(f64, f64)>,
    /// Speed as a function of measured RPM.
    pub fit: LinearFit,
    /// The fitted line evaluated at each distinct measured RPM, ascending.
    pub fitted: Vec<(f64, f64)>,
}

#[derive(Clone, Debug)]
pub enum GroupOutcome {
    Fitted(GearCurve),
    Skipped { gear: u32, distinct_rpm: usize },
}

impl GroupOutcome {
    pub fn gear(&self) -> u32 {
        match self {
            GroupOutcome::Fitted(curve) => curve.gear,
            GroupOutcome::Skipped { gear, .. } => *gear,
        }
    }
}

struct Row {
    rpm: f64,
    speed: f64,
    theoretical: f64,
}

/// Compare measured and theoretical RPM per gear.
///
/// Every sample is resolved against the ratio table before any grouping, so a
/// single unknown gear aborts the whole analysis. Groups come back in
/// ascending gear order.
pub fn analyze_ratios(
    samples: &[DriveSample],
    drivetrain: &Drivetrain,
) -> Result<Vec<GroupOutcome>, RmError> {
    if samples.is_empty() {
        return Err(RmError::InsufficientData("no samples to analyse".into()));
    }

    let mut groups: BTreeMap<u32, Vec<Row>> = BTreeMap::new();
    for sample in samples {
        let theoretical = drivetrain.theoretical_rpm(sample.gear, sample.speed)?;
        groups.entry(sample.gear).or_default().push(Row {
            rpm: sample.rpm,
            speed: sample.speed,
            theoretical,
        });
    }

    Ok(groups
        .into_iter()
        .map(|(gear, rows)| fit_group(gear, rows))
        .collect())
}

fn fit_group(gear: u32, mut rows: Vec<Row>) -> GroupOutcome {
    rows.sort_by_key(|row| OrderedFloat(row.speed));

    let distinct: BTreeSet<OrderedFloat<f64>> = rows.iter().map(|r| OrderedFloat(r.rpm)).collect();
    let rpm = Array1::from_iter(rows.iter().map(|r| r.rpm));
    let speed = Array1::from_iter(rows.iter().map(|r| r.speed));

    let fit = match LinearFit::fit(&rpm, &speed) {
        Some(fit) if distinct.len() >= 2 => fit,
        _ => {
            return GroupOutcome::Skipped {
                gear,
                distinct_rpm: distinct.len(),
            }
        }
    };

    GroupOutcome::Fitted(GearCurve {
        gear,
        theoretical: rows.iter().map(|r| (r.theoretical, r.speed)).collect(),
        measured: rows.iter().map(|r| (r.rpm, r.speed)).collect(),
        fit,
        fitted: distinct
            .into_iter()
            .map(|OrderedFloat(x)| (x, fit.eval(x)))
            .collect(),
    })
}
