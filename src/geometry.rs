use geo::algorithm::{Bearing, Distance};
use geo::{
    Closest, ClosestPoint, Coord, Haversine, Intersects, Line, LineInterpolatePoint, LineString,
    Point,
};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::ConfigError;

/// Approximate metres per degree of latitude (and of longitude at the equator)
pub const METERS_PER_DEGREE: f64 = 111_320.0;

/// Identity of a street-graph segment ("sg")
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sg#{}", self.0)
    }
}

/// A candidate edge of the reference street graph
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub geometry: LineString<f64>,
}

impl Segment {
    pub fn new(id: u64, coordinates: Vec<Coord<f64>>) -> Self {
        Self {
            id: SegmentId(id),
            geometry: LineString::from(coordinates),
        }
    }

    /// Length in meters
    pub fn length_m(&self) -> f64 {
        haversine_length(&self.geometry)
    }

    pub fn is_degenerate(&self) -> bool {
        is_degenerate(&self.geometry)
    }

    /// Compass bearing from the first to the last vertex, `None` when both
    /// coincide.
    pub fn bearing(&self) -> Option<f64> {
        let start = self.geometry.0.first()?;
        let end = self.geometry.0.last()?;
        if start == end {
            return None;
        }
        Some(Haversine.bearing(Point::from(*start), Point::from(*end)))
    }

    pub fn straightness(&self) -> f64 {
        straightness(&self.geometry)
    }

    /// Point halfway along the geometry
    pub fn midpoint(&self) -> Option<Point<f64>> {
        self.geometry.line_interpolate_point(0.5)
    }
}

/// The traveled polyline, optionally annotated with one elevation per vertex.
///
/// Matchers never mutate a route; a refining stage hands back a new value.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    line: LineString<f64>,
    elevation: Option<Vec<f64>>,
}

impl Route {
    pub fn new(line: LineString<f64>) -> Self {
        Self {
            line,
            elevation: None,
        }
    }

    pub fn with_elevation(line: LineString<f64>, elevation: Vec<f64>) -> Result<Self, ConfigError> {
        if line.0.len() != elevation.len() {
            return Err(ConfigError::ElevationMismatch {
                vertices: line.0.len(),
                elevations: elevation.len(),
            });
        }
        Ok(Self {
            line,
            elevation: Some(elevation),
        })
    }

    pub fn line(&self) -> &LineString<f64> {
        &self.line
    }

    pub fn elevation(&self) -> Option<&[f64]> {
        self.elevation.as_deref()
    }

    /// Length in meters, ignoring elevation
    pub fn length_m(&self) -> f64 {
        haversine_length(&self.line)
    }

    /// Fewer than two vertices or no extent at all
    pub fn is_degenerate(&self) -> bool {
        is_degenerate(&self.line)
    }

    /// Metric frame anchored at the first vertex of the route
    pub fn frame(&self) -> LocalFrame {
        LocalFrame::around(self.line.0.first().copied().unwrap_or(Coord { x: 0.0, y: 0.0 }))
    }
}

impl From<LineString<f64>> for Route {
    fn from(line: LineString<f64>) -> Self {
        Route::new(line)
    }
}

/// The segments still considered plausible at some pipeline stage.
///
/// Membership is keyed by [`SegmentId`] and kept in insertion order. After
/// construction the set can only shrink.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CandidateSet {
    segments: Vec<Segment>,
}

impl CandidateSet {
    /// Builds a set from the provider's segments, keeping the first
    /// occurrence of every id.
    pub fn new(segments: impl IntoIterator<Item = Segment>) -> Self {
        let mut seen = HashSet::new();
        let segments = segments
            .into_iter()
            .filter(|segment| seen.insert(segment.id))
            .collect();
        Self { segments }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segments.iter()
    }

    pub fn ids(&self) -> Vec<SegmentId> {
        self.segments.iter().map(|segment| segment.id).collect()
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.segments.iter().any(|segment| segment.id == id)
    }

    pub fn retain(&mut self, keep: impl FnMut(&Segment) -> bool) {
        self.segments.retain(keep);
    }

    pub fn filter(mut self, keep: impl FnMut(&Segment) -> bool) -> Self {
        self.retain(keep);
        self
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }
}

impl FromIterator<Segment> for CandidateSet {
    fn from_iter<T: IntoIterator<Item = Segment>>(iter: T) -> Self {
        CandidateSet::new(iter)
    }
}

/// Equirectangular projection of lon/lat coordinates into meters around
/// an origin. Accurate enough at the scale of a single route.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalFrame {
    origin: Coord<f64>,
    scale_x: f64,
    scale_y: f64,
}

impl LocalFrame {
    pub fn around(origin: Coord<f64>) -> Self {
        Self {
            origin,
            scale_x: METERS_PER_DEGREE * origin.y.to_radians().cos(),
            scale_y: METERS_PER_DEGREE,
        }
    }

    pub fn project(&self, coord: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (coord.x - self.origin.x) * self.scale_x,
            y: (coord.y - self.origin.y) * self.scale_y,
        }
    }

    pub fn unproject(&self, coord: Coord<f64>) -> Coord<f64> {
        Coord {
            x: self.origin.x + coord.x / self.scale_x,
            y: self.origin.y + coord.y / self.scale_y,
        }
    }

    pub fn project_line(&self, line: &LineString<f64>) -> PlanarLine {
        PlanarLine::new(line.coords().map(|c| self.project(*c)).collect())
    }
}

/// A polyline in a [`LocalFrame`] together with the cumulative distance at
/// each vertex.
#[derive(Clone, Debug)]
pub struct PlanarLine {
    line: LineString<f64>,
    cumulative: Vec<f64>,
}

/// Where a point falls relative to a [`PlanarLine`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Location {
    /// Distance along the line to the closest point
    pub along: f64,
    /// Lateral distance from the point to the line
    pub offset: f64,
}

impl PlanarLine {
    pub fn new(line: LineString<f64>) -> Self {
        let mut cumulative = Vec::with_capacity(line.0.len());
        let mut total = 0.0;
        for (i, coord) in line.0.iter().enumerate() {
            if i > 0 {
                total += planar_distance(line.0[i - 1], *coord);
            }
            cumulative.push(total);
        }
        Self { line, cumulative }
    }

    pub fn line(&self) -> &LineString<f64> {
        &self.line
    }

    pub fn length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    pub fn lines(&self) -> impl Iterator<Item = Line<f64>> + '_ {
        self.line.lines()
    }

    /// Closest location on the line to `point`; `None` for an empty line.
    pub fn locate(&self, point: Coord<f64>) -> Option<Location> {
        if self.line.0.len() == 1 {
            return Some(Location {
                along: 0.0,
                offset: planar_distance(self.line.0[0], point),
            });
        }
        self.lines()
            .enumerate()
            .filter_map(|(i, line)| {
                let closest = match line.closest_point(&Point::from(point)) {
                    Closest::SinglePoint(p) | Closest::Intersection(p) => p.0,
                    Closest::Indeterminate => return None,
                };
                Some(Location {
                    along: self.cumulative[i] + planar_distance(line.start, closest),
                    offset: planar_distance(closest, point),
                })
            })
            .min_by_key(|location| OrderedFloat(location.offset))
    }

    pub fn distance_to(&self, point: Coord<f64>) -> Option<f64> {
        self.locate(point).map(|location| location.offset)
    }

    /// Coordinate at `along` meters from the start, clamped to the line.
    pub fn interpolate(&self, along: f64) -> Option<Coord<f64>> {
        let length = self.length();
        if length <= 0.0 {
            return self.line.0.first().copied();
        }
        let fraction = (along / length).clamp(0.0, 1.0);
        self.line.line_interpolate_point(fraction).map(|p| p.0)
    }

    /// The portion of the line between two along-line positions.
    pub fn window(&self, from: f64, to: f64) -> LineString<f64> {
        let (from, to) = if from <= to { (from, to) } else { (to, from) };
        let mut coords = Vec::new();
        coords.extend(self.interpolate(from));
        coords.extend(
            self.line
                .0
                .iter()
                .zip(&self.cumulative)
                .filter(|(_, at)| **at > from && **at < to)
                .map(|(coord, _)| *coord),
        );
        coords.extend(self.interpolate(to));
        LineString::from(coords)
    }

    /// Minimum distance to another planar line, zero when they cross.
    pub fn distance_to_line(&self, other: &PlanarLine) -> Option<f64> {
        if self.line.0.is_empty() || other.line.0.is_empty() {
            return None;
        }
        if self.line.intersects(&other.line) {
            return Some(0.0);
        }
        // Disjoint polylines are closest at a vertex of one of them.
        let here = self.line.coords().filter_map(|c| other.distance_to(*c));
        let there = other.line.coords().filter_map(|c| self.distance_to(*c));
        here.chain(there).min_by_key(|d| OrderedFloat(*d))
    }
}

pub(crate) fn planar_distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

pub fn haversine_length(line: &LineString<f64>) -> f64 {
    line.lines()
        .map(|segment| Haversine.distance(segment.start_point(), segment.end_point()))
        .sum()
}

fn is_degenerate(line: &LineString<f64>) -> bool {
    line.0.len() < 2 || haversine_length(line) <= 0.0
}

/// Chord length over path length, in [0, 1]. Zero for degenerate lines.
pub fn straightness(line: &LineString<f64>) -> f64 {
    let path = haversine_length(line);
    if path <= 0.0 {
        return 0.0;
    }
    match (line.0.first(), line.0.last()) {
        (Some(start), Some(end)) => {
            let chord = Haversine.distance(Point::from(*start), Point::from(*end));
            (chord / path).clamp(0.0, 1.0)
        }
        _ => 0.0,
    }
}

/// Smallest absolute difference between two bearings in degrees, in [0, 180].
pub fn angle_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    diff.min(360.0 - diff)
}
