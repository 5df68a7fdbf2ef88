use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geometry::{CandidateSet, LocalFrame, PlanarLine, Route, Segment, planar_distance};
use crate::matching::Matcher;
use crate::params::{MatcherConfig, check_range, check_unit_interval};

/// Spacing of the offset samples taken along a segment (meters)
const SAMPLE_SPACING_M: f64 = 5.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OverlapConfig {
    /// Maximum lateral offset for a piece of segment to count as overlapping
    pub road_side_threshold: f64,
    /// Mean offset under which a segment is accepted outright
    pub perfect_match_threshold: f64,
    /// Minimum share of the route's length the segment must overlap
    pub overlap_pct_threshold: f64,
}

impl MatcherConfig for OverlapConfig {
    const KEYS: &'static [&'static str] = &[
        "road_side_threshold",
        "perfect_match_threshold",
        "overlap_pct_threshold",
    ];

    fn validate(&self) -> Result<(), ConfigError> {
        check_range("road_side_threshold", self.road_side_threshold, 0.0, f64::MAX)?;
        check_range(
            "perfect_match_threshold",
            self.perfect_match_threshold,
            0.0,
            f64::MAX,
        )?;
        check_unit_interval("overlap_pct_threshold", self.overlap_pct_threshold)
    }
}

/// Lateral relation between a segment and the route
#[derive(Clone, Debug, PartialEq)]
pub struct OverlapMeasure {
    pub mean_offset_m: f64,
    /// Length of segment pieces lying within the road side threshold
    pub overlapping_m: f64,
    /// Length of the route the overlap is measured against
    pub reference_m: f64,
}

impl OverlapMeasure {
    pub fn share(&self) -> f64 {
        if self.reference_m <= 0.0 {
            return 0.0;
        }
        (self.overlapping_m / self.reference_m).min(1.0)
    }
}

/// Keeps segments running alongside the route, tolerating the offset of
/// divided roads and parallel carriageways
#[derive(Clone, Debug)]
pub struct OverlapMatcher {
    config: OverlapConfig,
}

impl OverlapMatcher {
    pub fn new(config: OverlapConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &OverlapConfig {
        &self.config
    }

    pub fn measure(
        &self,
        segment: &Segment,
        route: &PlanarLine,
        frame: &LocalFrame,
    ) -> Option<OverlapMeasure> {
        let planar = frame.project_line(&segment.geometry);
        if planar.length() <= 0.0 || route.length() <= 0.0 {
            return None;
        }

        let samples = densify(&planar);
        let offsets: Vec<f64> = samples
            .iter()
            .filter_map(|sample| route.distance_to(*sample))
            .collect();
        if offsets.len() != samples.len() {
            return None;
        }

        let mean_offset_m = offsets.iter().sum::<f64>() / offsets.len() as f64;
        let overlapping_m: f64 = samples
            .windows(2)
            .zip(offsets.windows(2))
            .filter(|(_, offset)| offset.iter().all(|o| *o <= self.config.road_side_threshold))
            .map(|(pair, _)| planar_distance(pair[0], pair[1]))
            .sum();

        Some(OverlapMeasure {
            mean_offset_m,
            overlapping_m,
            reference_m: route.length(),
        })
    }

    fn accepts(&self, measure: &OverlapMeasure) -> bool {
        measure.mean_offset_m <= self.config.perfect_match_threshold
            || measure.share() >= self.config.overlap_pct_threshold
    }
}

/// Vertices of the line plus evenly spaced points in between
fn densify(line: &PlanarLine) -> Vec<geo::Coord<f64>> {
    let mut samples = Vec::new();
    for piece in line.lines() {
        let length = planar_distance(piece.start, piece.end);
        let steps = (length / SAMPLE_SPACING_M).ceil().max(1.0) as usize;
        let delta = piece.delta();
        samples.extend((0..steps).map(|i| {
            let t = i as f64 / steps as f64;
            geo::Coord {
                x: piece.start.x + delta.x * t,
                y: piece.start.y + delta.y * t,
            }
        }));
    }
    samples.extend(line.line().0.last().copied());
    samples
}

impl Matcher for OverlapMatcher {
    fn name(&self) -> &'static str {
        "overlap"
    }

    fn matches(&self, candidates: CandidateSet, route: Route) -> (CandidateSet, Route) {
        if route.is_degenerate() {
            return (CandidateSet::empty(), route);
        }
        let frame = route.frame();
        let planar = frame.project_line(route.line());

        let kept = candidates.filter(|segment| match self.measure(segment, &planar, &frame) {
            Some(measure) => {
                trace!(
                    "{} mean offset {:.1}m, overlapping {:.1}m of {:.1}m",
                    segment.id, measure.mean_offset_m, measure.overlapping_m, measure.reference_m
                );
                self.accepts(&measure)
            }
            None => false,
        });
        (kept, route)
    }
}
