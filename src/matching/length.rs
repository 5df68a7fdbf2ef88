use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geometry::{CandidateSet, LocalFrame, PlanarLine, Route, Segment};
use crate::matching::Matcher;
use crate::params::{MatcherConfig, check_unit_interval};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LengthConfig {
    /// Minimum share of the segment the route must cover
    pub length_threshold: f64,
    /// Maximum relative discrepancy between covered and segment length
    pub length_diff_threshold: f64,
}

impl MatcherConfig for LengthConfig {
    const KEYS: &'static [&'static str] = &["length_threshold", "length_diff_threshold"];

    fn validate(&self) -> Result<(), ConfigError> {
        check_unit_interval("length_threshold", self.length_threshold)?;
        check_unit_interval("length_diff_threshold", self.length_diff_threshold)
    }
}

/// How much of a segment the route accounts for
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coverage {
    /// Along-route distance between the projections of the segment's ends
    pub covered_m: f64,
    pub segment_m: f64,
}

impl Coverage {
    pub fn ratio(&self) -> f64 {
        self.covered_m / self.segment_m
    }

    /// |covered - segment| relative to the longer of both, in [0, 1]
    pub fn discrepancy(&self) -> f64 {
        let longer = self.covered_m.max(self.segment_m);
        (self.covered_m - self.segment_m).abs() / longer
    }
}

/// Rejects segments the route only grazes or whose length does not fit
/// the stretch of route they would account for
#[derive(Clone, Debug)]
pub struct LengthMatcher {
    config: LengthConfig,
}

impl LengthMatcher {
    pub fn new(config: LengthConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LengthConfig {
        &self.config
    }

    pub fn coverage(segment: &Segment, route: &PlanarLine, frame: &LocalFrame) -> Option<Coverage> {
        let planar = frame.project_line(&segment.geometry);
        let segment_m = planar.length();
        if segment_m <= 0.0 {
            return None;
        }
        let start = route.locate(*planar.line().0.first()?)?;
        let end = route.locate(*planar.line().0.last()?)?;
        Some(Coverage {
            covered_m: (end.along - start.along).abs(),
            segment_m,
        })
    }

    fn accepts(&self, coverage: &Coverage) -> bool {
        coverage.ratio() >= self.config.length_threshold
            && coverage.discrepancy() <= self.config.length_diff_threshold
    }
}

impl Matcher for LengthMatcher {
    fn name(&self) -> &'static str {
        "length"
    }

    fn matches(&self, candidates: CandidateSet, route: Route) -> (CandidateSet, Route) {
        if route.is_degenerate() {
            return (CandidateSet::empty(), route);
        }
        let frame = route.frame();
        let planar = frame.project_line(route.line());

        let kept = candidates.filter(|segment| match Self::coverage(segment, &planar, &frame) {
            Some(coverage) => {
                trace!(
                    "{} covered {:.1}m of {:.1}m",
                    segment.id, coverage.covered_m, coverage.segment_m
                );
                self.accepts(&coverage)
            }
            None => false,
        });
        (kept, route)
    }
}
