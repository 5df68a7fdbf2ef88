use anyhow::{Result, anyhow};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::geometry::{CandidateSet, Route};
use crate::matching::{
    BearingConfig, BearingMatcher, LengthConfig, LengthMatcher, Matcher, OverlapConfig,
    OverlapMatcher, Passthrough, ProximityConfig, ProximityMatcher, Sequential,
};
use crate::params::{MatcherConfig, ParamValue, Params, SearchSpace, Trial};
use crate::store::{ConfigStore, HypermodelRecord};

/// Stable identifiers of the known hypermodel variants, in registration order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HypermodelKind {
    Proximity,
    Bearing,
    Length,
    Overlap,
    Topologic,
}

impl HypermodelKind {
    pub const ALL: [HypermodelKind; 5] = [
        HypermodelKind::Proximity,
        HypermodelKind::Bearing,
        HypermodelKind::Length,
        HypermodelKind::Overlap,
        HypermodelKind::Topologic,
    ];

    /// Key under which the kind's record is stored
    pub fn id(&self) -> &'static str {
        match self {
            HypermodelKind::Proximity => "proximity",
            HypermodelKind::Bearing => "bearing",
            HypermodelKind::Length => "length",
            HypermodelKind::Overlap => "overlap",
            HypermodelKind::Topologic => "topologic",
        }
    }

    /// The kind's entry in the global [`REGISTRY`]
    pub fn entry(&self) -> &'static RegistryEntry {
        match self {
            HypermodelKind::Proximity => &REGISTRY[0],
            HypermodelKind::Bearing => &REGISTRY[1],
            HypermodelKind::Length => &REGISTRY[2],
            HypermodelKind::Overlap => &REGISTRY[3],
            HypermodelKind::Topologic => &REGISTRY[4],
        }
    }
}

impl fmt::Display for HypermodelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for HypermodelKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        HypermodelKind::ALL
            .into_iter()
            .find(|kind| kind.id() == s)
            .ok_or_else(|| anyhow!("Unknown hypermodel kind: {}", s))
    }
}

/// What every hypermodel variant has to define: which matchers it builds
/// from a params map and which parameters it exposes to the tuner.
pub trait HypermodelSpec {
    const KIND: HypermodelKind;

    fn build_pipeline(params: &Params) -> Result<Vec<Box<dyn Matcher>>, ConfigError>;

    fn get_trial_config(trial: &mut dyn Trial) -> Params;
}

fn insert(params: &mut Params, name: &str, value: impl Into<ParamValue>) {
    params.insert(name.to_string(), value.into());
}

pub struct ProximityHypermodel;

impl HypermodelSpec for ProximityHypermodel {
    const KIND: HypermodelKind = HypermodelKind::Proximity;

    fn build_pipeline(params: &Params) -> Result<Vec<Box<dyn Matcher>>, ConfigError> {
        let config = ProximityConfig::from_params(params)?;
        Ok(vec![Box::new(ProximityMatcher::new(config)?)])
    }

    fn get_trial_config(trial: &mut dyn Trial) -> Params {
        let mut params = Params::new();
        insert(&mut params, "search_radius_m", trial.suggest_int("search_radius_m", 1, 100));
        params
    }
}

pub struct BearingHypermodel;

impl HypermodelSpec for BearingHypermodel {
    const KIND: HypermodelKind = HypermodelKind::Bearing;

    fn build_pipeline(params: &Params) -> Result<Vec<Box<dyn Matcher>>, ConfigError> {
        let config = BearingConfig::from_params(params)?;
        Ok(vec![Box::new(BearingMatcher::new(config)?)])
    }

    fn get_trial_config(trial: &mut dyn Trial) -> Params {
        let mut params = Params::new();
        insert(
            &mut params,
            "bearing_threshold",
            trial.suggest_float("bearing_threshold", 0.0, 1.0),
        );
        insert(
            &mut params,
            "bearing_diff_threshold",
            trial.suggest_float("bearing_diff_threshold", 0.0, 180.0),
        );
        insert(
            &mut params,
            "match_inverted_bearings",
            trial.suggest_categorical("match_inverted_bearings", &[true.into(), false.into()]),
        );
        params
    }
}

pub struct LengthHypermodel;

impl HypermodelSpec for LengthHypermodel {
    const KIND: HypermodelKind = HypermodelKind::Length;

    fn build_pipeline(params: &Params) -> Result<Vec<Box<dyn Matcher>>, ConfigError> {
        let config = LengthConfig::from_params(params)?;
        Ok(vec![Box::new(LengthMatcher::new(config)?)])
    }

    fn get_trial_config(trial: &mut dyn Trial) -> Params {
        let mut params = Params::new();
        insert(
            &mut params,
            "length_threshold",
            trial.suggest_float("length_threshold", 0.0, 1.0),
        );
        insert(
            &mut params,
            "length_diff_threshold",
            trial.suggest_float("length_diff_threshold", 0.0, 1.0),
        );
        params
    }
}

pub struct OverlapHypermodel;

impl HypermodelSpec for OverlapHypermodel {
    const KIND: HypermodelKind = HypermodelKind::Overlap;

    fn build_pipeline(params: &Params) -> Result<Vec<Box<dyn Matcher>>, ConfigError> {
        let config = OverlapConfig::from_params(params)?;
        Ok(vec![Box::new(OverlapMatcher::new(config)?)])
    }

    fn get_trial_config(trial: &mut dyn Trial) -> Params {
        let mut params = Params::new();
        insert(
            &mut params,
            "road_side_threshold",
            trial.suggest_float("road_side_threshold", 0.0, 100.0),
        );
        insert(
            &mut params,
            "perfect_match_threshold",
            trial.suggest_float("perfect_match_threshold", 0.0, 50.0),
        );
        insert(
            &mut params,
            "overlap_pct_threshold",
            trial.suggest_float("overlap_pct_threshold", 0.0, 1.0),
        );
        params
    }
}

/// Proximity, bearing, length and overlap matching in sequence, all read
/// from one shared params map.
pub struct TopologicHypermodel;

impl HypermodelSpec for TopologicHypermodel {
    const KIND: HypermodelKind = HypermodelKind::Topologic;

    fn build_pipeline(params: &Params) -> Result<Vec<Box<dyn Matcher>>, ConfigError> {
        let mut stages = ProximityHypermodel::build_pipeline(params)?;
        stages.extend(BearingHypermodel::build_pipeline(params)?);
        stages.extend(LengthHypermodel::build_pipeline(params)?);
        stages.extend(OverlapHypermodel::build_pipeline(params)?);
        Ok(stages)
    }

    fn get_trial_config(trial: &mut dyn Trial) -> Params {
        let mut params = ProximityHypermodel::get_trial_config(trial);
        for part in [
            BearingHypermodel::get_trial_config(trial),
            LengthHypermodel::get_trial_config(trial),
            OverlapHypermodel::get_trial_config(trial),
        ] {
            for (name, value) in part {
                let previous = params.insert(name, value);
                debug_assert!(previous.is_none(), "constituent search spaces overlap");
            }
        }
        params
    }
}

/// One row of the explicit variant table: a kind and its two capabilities
pub struct RegistryEntry {
    pub kind: HypermodelKind,
    pub build_pipeline: fn(&Params) -> Result<Vec<Box<dyn Matcher>>, ConfigError>,
    pub get_trial_config: fn(&mut dyn Trial) -> Params,
}

impl RegistryEntry {
    pub const fn of<H: HypermodelSpec>() -> Self {
        Self {
            kind: H::KIND,
            build_pipeline: H::build_pipeline,
            get_trial_config: H::get_trial_config,
        }
    }

    pub fn search_space(&self) -> Result<SearchSpace, ConfigError> {
        SearchSpace::record(self.get_trial_config)
    }
}

/// Every known hypermodel variant. Selection ties go to the earlier entry.
pub static REGISTRY: [RegistryEntry; 5] = [
    RegistryEntry::of::<ProximityHypermodel>(),
    RegistryEntry::of::<BearingHypermodel>(),
    RegistryEntry::of::<LengthHypermodel>(),
    RegistryEntry::of::<OverlapHypermodel>(),
    RegistryEntry::of::<TopologicHypermodel>(),
];

/// A configured matching pipeline of some kind. The pipeline is built once
/// and immutable afterwards, so a hypermodel can be shared across threads.
#[derive(Debug)]
pub struct Hypermodel {
    kind: HypermodelKind,
    params: Params,
    pipeline: Sequential,
}

impl Hypermodel {
    pub fn new(kind: HypermodelKind, params: Params) -> Result<Self, ConfigError> {
        Self::from_entry(kind.entry(), params)
    }

    pub fn of<H: HypermodelSpec>(params: Params) -> Result<Self, ConfigError> {
        Self::new(H::KIND, params)
    }

    pub fn from_entry(entry: &RegistryEntry, params: Params) -> Result<Self, ConfigError> {
        let mut stages: Vec<Box<dyn Matcher>> = vec![Box::new(Passthrough)];
        stages.extend((entry.build_pipeline)(&params)?);
        Ok(Self {
            kind: entry.kind,
            params,
            pipeline: Sequential::new(stages),
        })
    }

    /// Builds the kind from its persisted params
    pub fn from_persisted(kind: HypermodelKind, store: &dyn ConfigStore) -> Result<Self> {
        let record = Self::load_config(kind, store)?;
        Ok(Self::new(kind, record.params)?)
    }

    pub fn kind(&self) -> HypermodelKind {
        self.kind
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn pipeline(&self) -> &Sequential {
        &self.pipeline
    }

    pub fn matches(&self, candidates: CandidateSet, route: Route) -> (CandidateSet, Route) {
        let before = candidates.len();
        let (candidates, route) = self.pipeline.matches(candidates, route);
        debug!(
            "{} hypermodel kept {} of {} candidates",
            self.kind,
            candidates.len(),
            before
        );
        (candidates, route)
    }

    /// The stored record for `kind`, or the default record if none exists
    pub fn load_config(kind: HypermodelKind, store: &dyn ConfigStore) -> Result<HypermodelRecord> {
        Ok(store.read(kind)?.unwrap_or_default())
    }

    /// Replaces the stored record for `kind`. The record needs a `params`
    /// object that builds a valid pipeline of that kind.
    pub fn store_config(
        kind: HypermodelKind,
        store: &dyn ConfigStore,
        config: Value,
    ) -> Result<()> {
        let record = HypermodelRecord::from_value(config)?;
        (kind.entry().build_pipeline)(&record.params)?;
        store.write(kind, &record)?;
        info!("Stored {} config (f1 {:.3})", kind, record.score());
        Ok(())
    }

    pub fn get_trial_config(kind: HypermodelKind, trial: &mut dyn Trial) -> Params {
        (kind.entry().get_trial_config)(trial)
    }

    pub fn search_space(kind: HypermodelKind) -> Result<SearchSpace, ConfigError> {
        kind.entry().search_space()
    }
}

/// Picks the registered kind whose stored record scores highest on `metric`
/// and builds it from its stored params.
pub fn select_best(store: &dyn ConfigStore, metric: &str) -> Result<Hypermodel> {
    select_best_from(&REGISTRY, store, metric)
}

pub fn select_best_from(
    entries: &[RegistryEntry],
    store: &dyn ConfigStore,
    metric: &str,
) -> Result<Hypermodel> {
    let mut best: Option<(&RegistryEntry, HypermodelRecord)> = None;
    for entry in entries {
        let record = Hypermodel::load_config(entry.kind, store)?;
        debug!("{} scores {} = {:.4}", entry.kind, metric, record.metric(metric));
        let better = match &best {
            Some((_, current)) => record.metric(metric) > current.metric(metric),
            None => true,
        };
        if better {
            best = Some((entry, record));
        }
    }

    let (entry, record) = best.ok_or(ConfigError::EmptyRegistry)?;
    info!(
        "Selected {} hypermodel ({} = {:.4})",
        entry.kind,
        metric,
        record.metric(metric)
    );
    Ok(Hypermodel::from_entry(entry, record.params)?)
}
