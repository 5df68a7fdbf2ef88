use geo::{Coord, LineString, coord, line_string};
use hypermatch::{
    CandidateSet, ConfigError, ConfigStore, FixedTrial, Hypermodel, HypermodelKind,
    HypermodelRecord, JsonFileStore, MatchCase, MemoryStore, ParamValue, Params, REGISTRY, Route,
    Segment, SegmentId, Trial, evaluate, promote_if_better, select_best, select_best_from,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::collections::HashSet;

/// Proposes uniformly random values, like a tuner's first exploratory trials
struct RandomTrial(StdRng);

impl Trial for RandomTrial {
    fn suggest_int(&mut self, _name: &str, low: i64, high: i64) -> i64 {
        self.0.random_range(low..=high)
    }

    fn suggest_float(&mut self, _name: &str, low: f64, high: f64) -> f64 {
        self.0.random_range(low..=high)
    }

    fn suggest_categorical(&mut self, _name: &str, choices: &[ParamValue]) -> ParamValue {
        choices[self.0.random_range(0..choices.len())]
    }
}

fn topologic_params() -> Params {
    Params::from([
        ("search_radius_m".to_string(), ParamValue::Int(20)),
        ("bearing_threshold".to_string(), ParamValue::Real(0.5)),
        ("bearing_diff_threshold".to_string(), ParamValue::Real(20.0)),
        ("match_inverted_bearings".to_string(), ParamValue::Bool(true)),
        ("length_threshold".to_string(), ParamValue::Real(0.5)),
        ("length_diff_threshold".to_string(), ParamValue::Real(0.5)),
        ("road_side_threshold".to_string(), ParamValue::Real(15.0)),
        ("perfect_match_threshold".to_string(), ParamValue::Real(2.0)),
        ("overlap_pct_threshold".to_string(), ParamValue::Real(0.3)),
    ])
}

fn valid_config(kind: HypermodelKind, score: f64) -> serde_json::Value {
    let params = Hypermodel::get_trial_config(kind, &mut FixedTrial::new(topologic_params()));
    json!({ "params": params, "f1": score })
}

/// An eastbound street in Hamburg with a parallel carriageway, a crossing
/// street and a far away segment
fn street_case() -> MatchCase {
    let route = Route::new(line_string![(x: 10.000, y: 53.550), (x: 10.004, y: 53.550)]);
    let candidates = CandidateSet::new(vec![
        Segment::new(1, vec![coord! { x: 10.0005, y: 53.55 }, coord! { x: 10.0020, y: 53.55 }]),
        Segment::new(2, vec![coord! { x: 10.0020, y: 53.55 }, coord! { x: 10.0035, y: 53.55 }]),
        Segment::new(
            3,
            vec![coord! { x: 10.0035, y: 53.55008 }, coord! { x: 10.0020, y: 53.55008 }],
        ),
        Segment::new(4, vec![coord! { x: 10.0030, y: 53.5490 }, coord! { x: 10.0030, y: 53.5510 }]),
        Segment::new(5, vec![coord! { x: 10.0100, y: 53.5600 }, coord! { x: 10.0120, y: 53.5600 }]),
    ]);
    MatchCase {
        name: Some("Hamburg eastbound".to_string()),
        route,
        candidates,
        bound: [1, 2].into_iter().map(SegmentId).collect(),
    }
}

fn random_segments(rng: &mut StdRng, count: u64) -> CandidateSet {
    CandidateSet::new((0..count).map(|id| {
        let start = Coord {
            x: 10.0 + rng.random_range(-0.002..0.006),
            y: 53.55 + rng.random_range(-0.002..0.002),
        };
        let end = Coord {
            x: start.x + rng.random_range(-0.002..0.002),
            y: start.y + rng.random_range(-0.002..0.002),
        };
        Segment::new(id, vec![start, end])
    }))
}

#[test]
fn store_then_load_round_trips() {
    let store = MemoryStore::new();
    let config = valid_config(HypermodelKind::Bearing, 0.42);
    Hypermodel::store_config(HypermodelKind::Bearing, &store, config.clone()).unwrap();

    let loaded = Hypermodel::load_config(HypermodelKind::Bearing, &store).unwrap();
    assert_eq!(loaded, HypermodelRecord::from_value(config).unwrap());
    assert_eq!(loaded.score(), 0.42);
}

#[test]
fn load_defaults_when_nothing_was_stored() {
    let store = MemoryStore::new();
    for kind in HypermodelKind::ALL {
        let record = Hypermodel::load_config(kind, &store).unwrap();
        assert_eq!(record, HypermodelRecord::default());
        assert!(record.params.is_empty());
        assert_eq!(record.score(), 0.0);
    }
}

#[test]
fn store_rejects_records_without_params() {
    let store = MemoryStore::new();
    let err = Hypermodel::store_config(HypermodelKind::Length, &store, json!({ "f1": 0.9 }))
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::MissingField("params".into()))
    );
    assert_eq!(store.read(HypermodelKind::Length).unwrap(), None);
}

#[test]
fn store_rejects_params_the_kind_cannot_build() {
    let store = MemoryStore::new();
    let config = json!({ "params": { "search_radius_m": 0 }, "f1": 0.9 });
    let err = Hypermodel::store_config(HypermodelKind::Proximity, &store, config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::InvalidParameter { .. })
    ));
}

#[test]
fn store_overwrites_wholesale() {
    let store = MemoryStore::new();
    let first = json!({ "params": { "search_radius_m": 10 }, "f1": 0.3, "recall": 0.9 });
    let second = json!({ "params": { "search_radius_m": 50 }, "f1": 0.5 });
    Hypermodel::store_config(HypermodelKind::Proximity, &store, first).unwrap();
    Hypermodel::store_config(HypermodelKind::Proximity, &store, second).unwrap();

    let record = Hypermodel::load_config(HypermodelKind::Proximity, &store).unwrap();
    assert_eq!(record.params["search_radius_m"], ParamValue::Int(50));
    assert_eq!(record.metrics.get("recall"), None);
}

#[test]
fn selector_prefers_first_maximum() {
    let store = MemoryStore::new();
    let kinds = [
        HypermodelKind::Proximity,
        HypermodelKind::Bearing,
        HypermodelKind::Length,
        HypermodelKind::Overlap,
    ];
    for (kind, score) in kinds.into_iter().zip([0.2, 0.9, 0.9, 0.1]) {
        Hypermodel::store_config(kind, &store, valid_config(kind, score)).unwrap();
    }

    let best = select_best_from(&REGISTRY[..4], &store, "f1").unwrap();
    assert_eq!(best.kind(), HypermodelKind::Bearing);

    // The unscored topologic kind does not change the outcome
    let best = select_best(&store, "f1").unwrap();
    assert_eq!(best.kind(), HypermodelKind::Bearing);
}

#[test]
fn selector_ranks_by_requested_metric() {
    let store = MemoryStore::new();
    let mut proximity = valid_config(HypermodelKind::Proximity, 0.8);
    proximity["recall"] = json!(0.3);
    let mut overlap = valid_config(HypermodelKind::Overlap, 0.5);
    overlap["recall"] = json!(0.95);
    Hypermodel::store_config(HypermodelKind::Proximity, &store, proximity).unwrap();
    Hypermodel::store_config(HypermodelKind::Overlap, &store, overlap).unwrap();

    assert_eq!(select_best(&store, "f1").unwrap().kind(), HypermodelKind::Proximity);
    assert_eq!(select_best(&store, "recall").unwrap().kind(), HypermodelKind::Overlap);
}

#[test]
fn selector_fails_without_registered_kinds() {
    let err = select_best_from(&[], &MemoryStore::new(), "f1").unwrap_err();
    assert_eq!(err.downcast_ref::<ConfigError>(), Some(&ConfigError::EmptyRegistry));
}

#[test]
fn selecting_an_unset_kind_fails_fast() {
    // Nothing stored: the first kind wins the all-zero tie but has no params
    let err = select_best(&MemoryStore::new(), "f1").unwrap_err();
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::MissingField("search_radius_m".into()))
    );
}

#[test]
fn from_persisted_uses_stored_params() {
    let dir = std::env::temp_dir().join(format!("hypermatch-persisted-{}", std::process::id()));
    let store = JsonFileStore::new(&dir);
    Hypermodel::store_config(
        HypermodelKind::Topologic,
        &store,
        json!({ "params": topologic_params(), "f1": 0.7 }),
    )
    .unwrap();

    let hypermodel = Hypermodel::from_persisted(HypermodelKind::Topologic, &store).unwrap();
    assert_eq!(hypermodel.params(), &topologic_params());
    assert_eq!(hypermodel.pipeline().len(), 5);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn topologic_search_space_is_the_union_of_its_parts() {
    let topologic = Hypermodel::search_space(HypermodelKind::Topologic).unwrap();

    let mut union = HashSet::new();
    let mut total = 0;
    for kind in &HypermodelKind::ALL[..4] {
        let space = Hypermodel::search_space(*kind).unwrap();
        total += space.len();
        union.extend(space.keys().map(str::to_string));
    }

    assert_eq!(union.len(), total, "constituent keys collide");
    assert_eq!(topologic.keys().map(str::to_string).collect::<HashSet<_>>(), union);
    assert_eq!(topologic.len(), 9);
}

#[test]
fn trial_configs_stay_within_their_domains() {
    let mut trial = RandomTrial(StdRng::seed_from_u64(11));
    for kind in HypermodelKind::ALL {
        let space = Hypermodel::search_space(kind).unwrap();
        for _ in 0..20 {
            let params = Hypermodel::get_trial_config(kind, &mut trial);
            space.admits(&params).unwrap();
            assert!(Hypermodel::new(kind, params).is_ok());
        }
    }
}

#[test]
fn candidates_only_ever_shrink() {
    let mut rng = StdRng::seed_from_u64(3);
    let route = street_case().route;
    for round in 0..30 {
        let candidates = random_segments(&mut rng, 25);
        for kind in HypermodelKind::ALL {
            let mut trial = RandomTrial(StdRng::seed_from_u64(round));
            let params = Hypermodel::get_trial_config(kind, &mut trial);
            let hypermodel = Hypermodel::new(kind, params).unwrap();
            let (matched, out_route) = hypermodel.matches(candidates.clone(), route.clone());
            assert!(matched.len() <= candidates.len());
            assert!(matched.iter().all(|sg| candidates.contains(sg.id)));
            assert_eq!(out_route, route);
        }
    }
}

#[test_log::test]
fn topologic_finds_the_traveled_street() {
    let case = street_case();
    let hypermodel = Hypermodel::new(HypermodelKind::Topologic, topologic_params()).unwrap();
    let (matched, _) = hypermodel.matches(case.candidates.clone(), case.route.clone());
    let mut ids: Vec<_> = matched.ids().into_iter().map(|id| id.0).collect();
    ids.sort();
    // The opposite carriageway is kept because inverted bearings are allowed
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn inverted_carriageway_depends_on_bearing_setting() {
    let case = street_case();
    let mut params = topologic_params();
    params.insert("match_inverted_bearings".into(), ParamValue::Bool(false));
    params.insert("bearing_diff_threshold".into(), ParamValue::Real(5.0));
    let hypermodel = Hypermodel::new(HypermodelKind::Topologic, params).unwrap();
    let (matched, _) = hypermodel.matches(case.candidates.clone(), case.route.clone());
    let mut ids: Vec<_> = matched.ids().into_iter().map(|id| id.0).collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn empty_candidates_survive_every_kind() {
    let route = street_case().route;
    for kind in HypermodelKind::ALL {
        let params = Hypermodel::get_trial_config(kind, &mut FixedTrial::new(topologic_params()));
        let hypermodel = Hypermodel::new(kind, params).unwrap();
        let (matched, out_route) = hypermodel.matches(CandidateSet::empty(), route.clone());
        assert!(matched.is_empty());
        assert_eq!(out_route, route);
    }
}

#[test]
fn degenerate_route_matches_nothing() {
    let case = street_case();
    let point = Route::new(LineString::from(vec![coord! { x: 10.001, y: 53.55 }]));
    let hypermodel = Hypermodel::new(HypermodelKind::Topologic, topologic_params()).unwrap();
    let (matched, _) = hypermodel.matches(case.candidates, point);
    assert!(matched.is_empty());
}

#[test]
fn evaluation_promotes_only_improvements() {
    let store = MemoryStore::new();
    let cases = vec![street_case(); 4];

    let mut params = topologic_params();
    params.insert("match_inverted_bearings".into(), ParamValue::Bool(false));
    params.insert("bearing_diff_threshold".into(), ParamValue::Real(5.0));
    let precise = Hypermodel::new(HypermodelKind::Topologic, params).unwrap();
    let lenient = Hypermodel::new(HypermodelKind::Topologic, topologic_params()).unwrap();

    let precise_report = evaluate(&precise, &cases);
    let lenient_report = evaluate(&lenient, &cases);
    assert_eq!(precise_report.cases, 4);
    assert_eq!(precise_report.confusion.f1(), 1.0);
    assert!(lenient_report.confusion.f1() < 1.0);

    assert!(promote_if_better(&lenient, &store, &lenient_report, "f1").unwrap());
    assert!(promote_if_better(&precise, &store, &precise_report, "f1").unwrap());
    assert!(!promote_if_better(&lenient, &store, &lenient_report, "f1").unwrap());

    let stored = Hypermodel::load_config(HypermodelKind::Topologic, &store).unwrap();
    assert_eq!(&stored.params, precise.params());
    assert_eq!(stored.score(), 1.0);
    assert_eq!(select_best(&store, "f1").unwrap().kind(), HypermodelKind::Topologic);
}
