//! Splits a telemetry trace into contiguous per-gear runs.
//!
//! Two families are produced in the same forward pass. RPM segments are keyed
//! by the current gear and cover every sample. Rev-match segments are keyed by
//! the downshift target (`gear - 1`) and only cover samples with a usable
//! rev-match value.

use crate::telemetry::Sample;

/// A maximal run of points sharing one gear key.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    gear: u32,
    points: Vec<(f64, f64)>,
}

impl Segment {
    fn open(gear: u32, point: (f64, f64)) -> Self {
        Self {
            gear,
            points: vec![point],
        }
    }

    pub fn gear(&self) -> u32 {
        self.gear
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Segments {
    pub rpm: Vec<Segment>,
    pub revmatch: Vec<Segment>,
}

impl Segments {
    /// Every (x, y) point across both families.
    pub fn all_points(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.rpm
            .iter()
            .chain(self.revmatch.iter())
            .flat_map(|s| s.points.iter())
    }
}

/// Incremental segmenter. Only the previous sample's gear and whether it
/// carried a rev-match value are remembered between calls to [`push`].
///
/// [`push`]: Segmenter::push
#[derive(Debug, Default)]
pub struct Segmenter {
    prev_gear: Option<u32>,
    prev_revmatch_present: bool,
    out: Segments,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: &Sample) {
        self.push_rpm(sample);
        self.push_revmatch(sample);
        self.prev_gear = Some(sample.gear);
        self.prev_revmatch_present = sample.has_revmatch();
    }

    fn push_rpm(&mut self, sample: &Sample) {
        let point = (sample.time, sample.rpm);
        match (self.prev_gear, self.out.rpm.last_mut()) {
            (Some(prev), Some(open)) if prev == sample.gear => open.points.push(point),
            _ => self.out.rpm.push(Segment::open(sample.gear, point)),
        }
    }

    fn push_revmatch(&mut self, sample: &Sample) {
        if !sample.revmatch_valid() {
            return;
        }
        let key = sample.gear - 1;
        let point = (sample.time, sample.revmatch);

        let boundary = match self.prev_gear {
            Some(prev) => prev != sample.gear || !self.prev_revmatch_present,
            None => false,
        };
        match self.out.revmatch.last_mut() {
            // a run only ever holds points for one target gear
            Some(open) if !boundary && open.gear == key => open.points.push(point),
            _ => self.out.revmatch.push(Segment::open(key, point)),
        }
    }

    pub fn finish(self) -> Segments {
        self.out
    }
}

/// Segment a complete trace in one pass.
pub fn segment(samples: &[Sample]) -> Segments {
    let mut segmenter = Segmenter::new();
    for sample in samples {
        segmenter.push(sample);
    }
    segmenter.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::REVMATCH_NONE;

    fn trace(rows: &[(u32, f64)]) -> Vec<Sample> {
        rows.iter()
            .enumerate()
            .map(|(i, &(gear, revmatch))| {
                Sample::new(i as f64 * 0.2, 1000.0 + i as f64 * 10.0, gear, revmatch)
            })
            .collect()
    }

    fn keys(segments: &[Segment]) -> Vec<u32> {
        segments.iter().map(Segment::gear).collect()
    }

    fn lens(segments: &[Segment]) -> Vec<usize> {
        segments.iter().map(Segment::len).collect()
    }

    #[test]
    fn test_empty_trace() {
        let out = segment(&[]);
        assert!(out.rpm.is_empty());
        assert!(out.revmatch.is_empty());
    }

    #[test]
    fn test_gear_change_starts_rpm_segment() {
        let samples = trace(&[
            (1, REVMATCH_NONE),
            (1, REVMATCH_NONE),
            (2, REVMATCH_NONE),
            (2, REVMATCH_NONE),
            (1, REVMATCH_NONE),
        ]);
        let out = segment(&samples);
        assert_eq!(keys(&out.rpm), vec![1, 2, 1]);
        assert_eq!(lens(&out.rpm), vec![2, 2, 1]);
        assert!(out.revmatch.is_empty());
    }

    #[test]
    fn test_rpm_segments_reproduce_trace() {
        let samples = trace(&[
            (3, 4000.0),
            (3, REVMATCH_NONE),
            (4, 3500.0),
            (2, 5000.0),
            (2, 5100.0),
            (5, REVMATCH_NONE),
            (5, 2800.0),
        ]);
        let out = segment(&samples);
        let flattened: Vec<(f64, f64)> = out
            .rpm
            .iter()
            .flat_map(|s| s.points().iter().copied())
            .collect();
        let expected: Vec<(f64, f64)> = samples.iter().map(|s| (s.time, s.rpm)).collect();
        assert_eq!(flattened, expected);
    }

    #[test]
    fn test_revmatch_boundary_on_invalid_and_gear_change() {
        let samples = trace(&[(2, 5000.0), (2, 5200.0), (3, REVMATCH_NONE), (3, 6000.0)]);
        let out = segment(&samples);
        assert_eq!(keys(&out.revmatch), vec![1, 2]);
        assert_eq!(
            out.revmatch[0].points(),
            &[(samples[0].time, 5000.0), (samples[1].time, 5200.0)]
        );
        assert_eq!(out.revmatch[1].points(), &[(samples[3].time, 6000.0)]);
    }

    #[test]
    fn test_revmatch_gap_in_same_gear_splits() {
        let samples = trace(&[(3, 4000.0), (3, REVMATCH_NONE), (3, 4100.0), (3, 4200.0)]);
        let out = segment(&samples);
        assert_eq!(keys(&out.revmatch), vec![2, 2]);
        assert_eq!(lens(&out.revmatch), vec![1, 2]);
        assert_eq!(out.rpm.len(), 1);
    }

    #[test]
    fn test_first_gear_never_contributes_revmatch() {
        let samples = trace(&[(1, 6000.0), (1, 6100.0), (2, 5000.0)]);
        let out = segment(&samples);
        assert_eq!(keys(&out.revmatch), vec![1]);
        assert_eq!(lens(&out.revmatch), vec![1]);
    }

    #[test]
    fn test_isolated_valid_sample_is_singleton() {
        let samples = trace(&[
            (4, REVMATCH_NONE),
            (4, 3300.0),
            (4, REVMATCH_NONE),
            (4, REVMATCH_NONE),
        ]);
        let out = segment(&samples);
        assert_eq!(keys(&out.revmatch), vec![3]);
        assert_eq!(lens(&out.revmatch), vec![1]);
    }

    #[test]
    fn test_revmatch_points_satisfy_predicate() {
        let samples = trace(&[
            (1, 3000.0),
            (2, REVMATCH_NONE),
            (2, 4500.0),
            (3, 4700.0),
            (3, 4800.0),
            (1, REVMATCH_NONE),
            (5, 2500.0),
        ]);
        let out = segment(&samples);
        for seg in &out.revmatch {
            for &(t, y) in seg.points() {
                let source = samples.iter().find(|s| s.time == t).unwrap();
                assert!(source.revmatch_valid());
                assert_eq!(source.revmatch, y);
                assert_eq!(seg.gear(), source.gear - 1);
            }
        }
        let contributed: usize = out.revmatch.iter().map(Segment::len).sum();
        let valid = samples.iter().filter(|s| s.revmatch_valid()).count();
        assert_eq!(contributed, valid);
    }

    #[test]
    fn test_first_valid_sample_opens_segment() {
        let samples = trace(&[(3, 4100.0)]);
        let out = segment(&samples);
        assert_eq!(keys(&out.revmatch), vec![2]);
    }

    #[test]
    fn test_segmenting_is_idempotent() {
        let samples = trace(&[(2, 5000.0), (2, REVMATCH_NONE), (3, 4000.0), (3, 4050.0)]);
        assert_eq!(segment(&samples), segment(&samples));
    }
}
