use anyhow::{Context, Result, bail};
use geo::{Coord, LineString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;

use crate::evaluation::MatchCase;
use crate::geometry::{CandidateSet, Route, Segment, SegmentId};

pub(crate) mod dataset {
    use serde::{Deserialize, Serialize};

    /// A labelled matching dataset as exported from the route review tool
    #[derive(Debug, Serialize, Deserialize, Clone)]
    pub struct CaseFile {
        pub cases: Vec<CaseEntry>,
    }

    #[derive(Debug, Serialize, Deserialize, Clone)]
    pub struct CaseEntry {
        #[serde(default)]
        pub name: Option<String>,

        /// `[lon, lat]` or `[lon, lat, elevation]` per vertex
        pub route: Vec<Vec<f64>>,

        #[serde(rename = "sgs")]
        pub segments: Vec<SegmentEntry>,

        /// Ids of segments confirmed to be traversed by the route
        #[serde(default)]
        pub confirmed: Vec<u64>,
    }

    #[derive(Debug, Serialize, Deserialize, Clone)]
    pub struct SegmentEntry {
        pub id: u64,
        pub coordinates: Vec<[f64; 2]>,
    }
}

pub use dataset::{CaseEntry, CaseFile, SegmentEntry};

/// Label of a case for logs, falling back to its position in the file
pub fn case_label(entry: &CaseEntry, index: usize) -> String {
    entry
        .name
        .clone()
        .unwrap_or_else(|| format!("case #{}", index))
}

fn route_from_entry(vertices: &[Vec<f64>]) -> Result<Route> {
    let mut coords = Vec::with_capacity(vertices.len());
    let mut elevation = Vec::with_capacity(vertices.len());
    for vertex in vertices {
        match vertex.as_slice() {
            [lon, lat] => coords.push(Coord { x: *lon, y: *lat }),
            [lon, lat, ele] => {
                coords.push(Coord { x: *lon, y: *lat });
                elevation.push(*ele);
            }
            other => bail!("Route vertex needs 2 or 3 values, got {}", other.len()),
        }
    }

    let line = LineString::from(coords);
    if elevation.is_empty() {
        Ok(Route::new(line))
    } else {
        Ok(Route::with_elevation(line, elevation)?)
    }
}

impl TryFrom<CaseEntry> for MatchCase {
    type Error = anyhow::Error;

    fn try_from(entry: CaseEntry) -> Result<Self> {
        let route = route_from_entry(&entry.route)?;
        let candidates = CandidateSet::new(entry.segments.into_iter().map(|sg| {
            Segment::new(
                sg.id,
                sg.coordinates
                    .into_iter()
                    .map(|[x, y]| Coord { x, y })
                    .collect(),
            )
        }));
        Ok(MatchCase {
            name: entry.name,
            route,
            candidates,
            bound: entry.confirmed.into_iter().map(SegmentId).collect(),
        })
    }
}

/// Reads a dataset file into matching cases
pub fn read_cases(path: impl AsRef<Path>) -> Result<Vec<MatchCase>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let file: CaseFile =
        serde_json::from_slice(&bytes).with_context(|| format!("Invalid dataset {:?}", path))?;
    file.cases
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let label = case_label(&entry, i);
            MatchCase::try_from(entry).with_context(|| format!("Invalid {}", label))
        })
        .collect()
}

/// GeoJSON of the route and the surviving candidates, for inspecting a match
pub fn candidates_to_geojson(candidates: &CandidateSet, route: &Route) -> Value {
    let coords = |line: &LineString<f64>| -> Vec<Vec<f64>> {
        line.coords().map(|c| vec![c.x, c.y]).collect()
    };

    let mut features = vec![json!({
        "type": "Feature",
        "properties": {
            "role": "route",
            "length_m": route.length_m(),
        },
        "geometry": {
            "type": "LineString",
            "coordinates": coords(route.line())
        }
    })];

    for segment in candidates.iter() {
        features.push(json!({
            "type": "Feature",
            "properties": {
                "role": "segment",
                "segment_id": segment.id.0,
                "length_m": segment.length_m(),
            },
            "geometry": {
                "type": "LineString",
                "coordinates": coords(&segment.geometry)
            }
        }));
    }

    json!({
        "type": "FeatureCollection",
        "features": features
    })
}

/// Flat summary line of a single match, used by the binary
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MatchSummary {
    pub case: String,
    pub candidates: usize,
    pub matched: Vec<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATASET: &str = r#"{
        "cases": [
            {
                "name": "bridge",
                "route": [[9.99, 53.55, 4.0], [10.0, 53.55, 5.5]],
                "sgs": [
                    { "id": 11, "coordinates": [[9.992, 53.55], [9.998, 53.55]] },
                    { "id": 12, "coordinates": [[9.992, 53.56], [9.998, 53.56]] }
                ],
                "confirmed": [11]
            },
            {
                "route": [[9.99, 53.55], [10.0, 53.55]],
                "sgs": []
            }
        ]
    }"#;

    #[test]
    fn parses_cases() {
        let file: CaseFile = serde_json::from_str(DATASET).unwrap();
        assert_eq!(case_label(&file.cases[0], 0), "bridge");
        assert_eq!(case_label(&file.cases[1], 1), "case #1");

        let cases: Vec<MatchCase> = file
            .cases
            .into_iter()
            .map(|entry| MatchCase::try_from(entry).unwrap())
            .collect();
        assert_eq!(cases[0].route.elevation(), Some(&[4.0, 5.5][..]));
        assert_eq!(cases[0].candidates.len(), 2);
        assert!(cases[0].bound.contains(&SegmentId(11)));
        assert!(cases[1].route.elevation().is_none());
        assert_eq!(cases[0].label(0), "bridge");
        assert_eq!(cases[1].label(1), "case #1");
        assert!(cases[1].candidates.is_empty());
    }

    #[test]
    fn rejects_mixed_elevation() {
        let entry = CaseEntry {
            name: None,
            route: vec![vec![9.99, 53.55, 4.0], vec![10.0, 53.55]],
            segments: vec![],
            confirmed: vec![],
        };
        assert!(MatchCase::try_from(entry).is_err());
    }

    #[test]
    fn geojson_lists_route_and_segments() {
        let file: CaseFile = serde_json::from_str(DATASET).unwrap();
        let case = MatchCase::try_from(file.cases[0].clone()).unwrap();
        let geojson = candidates_to_geojson(&case.candidates, &case.route);
        let features = geojson["features"].as_array().unwrap();
        assert_eq!(features.len(), 3);
        assert_eq!(features[0]["properties"]["role"], "route");
        assert_eq!(features[1]["properties"]["segment_id"], 11);
    }
}
