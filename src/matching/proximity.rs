use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::geometry::{CandidateSet, LocalFrame, PlanarLine, Route, Segment};
use crate::matching::Matcher;
use crate::params::MatcherConfig;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProximityConfig {
    /// Maximum distance between route and segment (meters)
    pub search_radius_m: u32,
}

impl MatcherConfig for ProximityConfig {
    const KEYS: &'static [&'static str] = &["search_radius_m"];

    fn validate(&self) -> Result<(), ConfigError> {
        if self.search_radius_m == 0 {
            return Err(ConfigError::invalid("search_radius_m", "must be positive"));
        }
        Ok(())
    }
}

/// Keeps segments that come within the search radius of the route
#[derive(Clone, Debug)]
pub struct ProximityMatcher {
    config: ProximityConfig,
}

impl ProximityMatcher {
    pub fn new(config: ProximityConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ProximityConfig {
        &self.config
    }

    /// Minimum distance in meters between the segment and the projected
    /// route, `None` for a degenerate segment.
    pub fn distance_m(segment: &Segment, route: &PlanarLine, frame: &LocalFrame) -> Option<f64> {
        if segment.is_degenerate() {
            return None;
        }
        frame.project_line(&segment.geometry).distance_to_line(route)
    }
}

impl Matcher for ProximityMatcher {
    fn name(&self) -> &'static str {
        "proximity"
    }

    fn matches(&self, candidates: CandidateSet, route: Route) -> (CandidateSet, Route) {
        if candidates.is_empty() {
            return (candidates, route);
        }
        if route.is_degenerate() {
            debug!("Route has no extent, dropping {} candidates", candidates.len());
            return (CandidateSet::empty(), route);
        }

        let frame = route.frame();
        let planar = frame.project_line(route.line());
        let radius = f64::from(self.config.search_radius_m);

        let kept = candidates.filter(|segment| {
            Self::distance_m(segment, &planar, &frame).is_some_and(|distance| distance <= radius)
        });
        (kept, route)
    }
}
