use geo::algorithm::Bearing;
use geo::{Coord, Haversine, LineString, Point};
use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geometry::{
    CandidateSet, LocalFrame, PlanarLine, Route, Segment, angle_difference, straightness,
};
use crate::matching::Matcher;
use crate::params::{MatcherConfig, check_range, check_unit_interval};

/// Shortest stretch of route used to estimate a local bearing (meters)
const MIN_BEARING_WINDOW_M: f64 = 10.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BearingConfig {
    /// Minimum confidence of the bearing estimates, in [0, 1]. Below it the
    /// segment is passed on unjudged.
    pub bearing_threshold: f64,
    /// Maximum bearing difference in degrees
    pub bearing_diff_threshold: f64,
    /// Also accept segments pointing the opposite way
    pub match_inverted_bearings: bool,
}

impl MatcherConfig for BearingConfig {
    const KEYS: &'static [&'static str] = &[
        "bearing_threshold",
        "bearing_diff_threshold",
        "match_inverted_bearings",
    ];

    fn validate(&self) -> Result<(), ConfigError> {
        check_unit_interval("bearing_threshold", self.bearing_threshold)?;
        check_range("bearing_diff_threshold", self.bearing_diff_threshold, 0.0, 180.0)
    }
}

/// Outcome of comparing one segment against the route
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BearingVerdict {
    Aligned,
    Inverted,
    Misaligned,
    /// Estimates too unstable to decide either way
    Uncertain,
    Degenerate,
}

impl BearingVerdict {
    pub fn keeps(self) -> bool {
        matches!(
            self,
            BearingVerdict::Aligned | BearingVerdict::Inverted | BearingVerdict::Uncertain
        )
    }
}

/// Keeps segments heading the same way as the route near them
#[derive(Clone, Debug)]
pub struct BearingMatcher {
    config: BearingConfig,
}

impl BearingMatcher {
    pub fn new(config: BearingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BearingConfig {
        &self.config
    }

    /// Bearing and straightness of the route stretch as long as the segment,
    /// centred on the route position nearest to the segment's midpoint.
    fn local_route_bearing(
        segment: &Segment,
        route: &PlanarLine,
        frame: &LocalFrame,
    ) -> Option<(f64, f64)> {
        let midpoint = segment.midpoint()?;
        let location = route.locate(frame.project(midpoint.0))?;
        let half = (segment.length_m().max(MIN_BEARING_WINDOW_M)) / 2.0;
        let window: LineString<f64> = route
            .window(location.along - half, location.along + half)
            .coords()
            .map(|c| frame.unproject(*c))
            .collect();
        let start: Coord<f64> = *window.0.first()?;
        let end: Coord<f64> = *window.0.last()?;
        if start == end {
            return None;
        }
        let bearing = Haversine.bearing(Point::from(start), Point::from(end));
        Some((bearing, straightness(&window)))
    }

    pub fn assess(
        &self,
        segment: &Segment,
        route: &PlanarLine,
        frame: &LocalFrame,
    ) -> BearingVerdict {
        if segment.is_degenerate() {
            return BearingVerdict::Degenerate;
        }

        // Closed loops have no chord, so their confidence is zero
        let window = Self::local_route_bearing(segment, route, frame);
        let confidence = match window {
            Some((_, route_straightness)) => segment.straightness().min(route_straightness),
            None => segment.straightness(),
        };
        if confidence < self.config.bearing_threshold {
            return BearingVerdict::Uncertain;
        }

        let (Some(segment_bearing), Some((route_bearing, _))) = (segment.bearing(), window) else {
            return BearingVerdict::Degenerate;
        };

        let threshold = self.config.bearing_diff_threshold;
        if angle_difference(route_bearing, segment_bearing) <= threshold {
            BearingVerdict::Aligned
        } else if self.config.match_inverted_bearings
            && angle_difference(route_bearing, segment_bearing + 180.0) <= threshold
        {
            BearingVerdict::Inverted
        } else {
            BearingVerdict::Misaligned
        }
    }
}

impl Matcher for BearingMatcher {
    fn name(&self) -> &'static str {
        "bearing"
    }

    fn matches(&self, candidates: CandidateSet, route: Route) -> (CandidateSet, Route) {
        if route.is_degenerate() {
            return (CandidateSet::empty(), route);
        }
        let frame = route.frame();
        let planar = frame.project_line(route.line());

        let kept = candidates.filter(|segment| {
            let verdict = self.assess(segment, &planar, &frame);
            trace!("{} bearing verdict {:?}", segment.id, verdict);
            verdict.keeps()
        });
        (kept, route)
    }
}
