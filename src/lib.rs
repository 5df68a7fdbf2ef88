//! Matching of traveled routes against candidate street-graph segments.
//!
//! A [`Hypermodel`] is a configured pipeline of geometric [`Matcher`]s
//! (proximity, bearing, length, overlap) that narrows a [`CandidateSet`]
//! down to the segments a [`Route`] actually follows. Hypermodel configs
//! are persisted per kind together with their quality score, tuned through
//! the [`Trial`] search-space contract and ranked with [`select_best`].

pub mod error;
pub mod evaluation;
pub mod geometry;
pub mod hypermodel;
pub mod io;
pub mod matching;
pub mod params;
pub mod store;

pub use error::ConfigError;
pub use evaluation::{Confusion, EvaluationReport, MatchCase, evaluate, promote_if_better};
pub use geometry::{CandidateSet, Route, Segment, SegmentId};
pub use hypermodel::{
    BearingHypermodel, Hypermodel, HypermodelKind, HypermodelSpec, LengthHypermodel,
    OverlapHypermodel, ProximityHypermodel, REGISTRY, RegistryEntry, TopologicHypermodel,
    select_best, select_best_from,
};
pub use matching::{Matcher, Passthrough, Sequential};
pub use params::{Domain, FixedTrial, ParamValue, Params, SearchSpace, Trial};
pub use store::{
    ConfigStore, DEFAULT_METRIC, HypermodelRecord, JsonFileStore, MemoryStore, StoreConfig,
};
