use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ConfigError;

/// A single tunable parameter value as persisted and as proposed by a trial
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Real(f64),
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Real(value)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Real(v) => write!(f, "{}", v),
        }
    }
}

/// Parameter name to value, possibly merged across several matchers
pub type Params = BTreeMap<String, ParamValue>;

/// Typed configuration of one matcher kind, read out of a shared [`Params`]
/// map. Keys the kind does not know are ignored.
pub trait MatcherConfig: Serialize + DeserializeOwned + Sized {
    /// Every key the kind requires
    const KEYS: &'static [&'static str];

    /// Domain checks on the parsed values
    fn validate(&self) -> Result<(), ConfigError>;

    fn from_params(params: &Params) -> Result<Self, ConfigError> {
        let mut relevant = serde_json::Map::new();
        for key in Self::KEYS {
            let value = params
                .get(*key)
                .ok_or_else(|| ConfigError::MissingField(key.to_string()))?;
            let value = serde_json::to_value(value)
                .map_err(|e| ConfigError::invalid(key, e.to_string()))?;
            relevant.insert(key.to_string(), value);
        }
        let config: Self = serde_json::from_value(serde_json::Value::Object(relevant))
            .map_err(|e| ConfigError::invalid(&Self::KEYS.join(","), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

pub(crate) fn check_unit_interval(name: &str, value: f64) -> Result<(), ConfigError> {
    check_range(name, value, 0.0, 1.0)
}

pub(crate) fn check_range(name: &str, value: f64, low: f64, high: f64) -> Result<(), ConfigError> {
    if !(low..=high).contains(&value) {
        return Err(ConfigError::invalid(
            name,
            format!("{} is outside of [{}, {}]", value, low, high),
        ));
    }
    Ok(())
}

/// The hyperparameter search driver, e.g. one trial of an external tuner.
///
/// The matching core only decides which calls to make for each hypermodel
/// kind; how values are proposed is up to the implementor.
pub trait Trial {
    fn suggest_int(&mut self, name: &str, low: i64, high: i64) -> i64;
    fn suggest_float(&mut self, name: &str, low: f64, high: f64) -> f64;
    fn suggest_categorical(&mut self, name: &str, choices: &[ParamValue]) -> ParamValue;
}

/// Domain of a single tunable parameter
#[derive(Clone, Debug, PartialEq)]
pub enum Domain {
    Int { low: i64, high: i64 },
    Real { low: f64, high: f64 },
    Categorical(Vec<ParamValue>),
}

impl Domain {
    pub fn contains(&self, value: &ParamValue) -> bool {
        match (self, value) {
            (Domain::Int { low, high }, ParamValue::Int(v)) => (*low..=*high).contains(v),
            (Domain::Real { low, high }, ParamValue::Real(v)) => (*low..=*high).contains(v),
            (Domain::Real { low, high }, ParamValue::Int(v)) => {
                (*low..=*high).contains(&(*v as f64))
            }
            (Domain::Categorical(choices), v) => choices.contains(v),
            _ => false,
        }
    }
}

/// The ordered set of parameter domains a hypermodel kind declares
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchSpace {
    entries: Vec<(String, Domain)>,
}

impl SearchSpace {
    /// Runs `declare` against a recording trial and collects every domain it
    /// asks for. Asking for the same name twice is a schema error.
    pub fn record(declare: impl FnOnce(&mut dyn Trial) -> Params) -> Result<Self, ConfigError> {
        let mut recorder = SpaceRecorder::default();
        declare(&mut recorder);
        match recorder.collision {
            Some(name) => Err(ConfigError::SearchSpaceCollision(name)),
            None => Ok(recorder.space),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Domain> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, domain)| domain)
    }

    /// Checks that `params` holds an in-domain value for every declared key
    pub fn admits(&self, params: &Params) -> Result<(), ConfigError> {
        for (name, domain) in &self.entries {
            let value = params
                .get(name)
                .ok_or_else(|| ConfigError::MissingField(name.clone()))?;
            if !domain.contains(value) {
                return Err(ConfigError::invalid(
                    name,
                    format!("{} is outside of {:?}", value, domain),
                ));
            }
        }
        Ok(())
    }

    fn insert(&mut self, name: &str, domain: Domain) -> bool {
        if self.get(name).is_some() {
            return false;
        }
        self.entries.push((name.to_string(), domain));
        true
    }
}

#[derive(Default)]
struct SpaceRecorder {
    space: SearchSpace,
    collision: Option<String>,
}

impl SpaceRecorder {
    fn declare(&mut self, name: &str, domain: Domain) {
        if !self.space.insert(name, domain) && self.collision.is_none() {
            self.collision = Some(name.to_string());
        }
    }
}

impl Trial for SpaceRecorder {
    fn suggest_int(&mut self, name: &str, low: i64, high: i64) -> i64 {
        self.declare(name, Domain::Int { low, high });
        low
    }

    fn suggest_float(&mut self, name: &str, low: f64, high: f64) -> f64 {
        self.declare(name, Domain::Real { low, high });
        low
    }

    fn suggest_categorical(&mut self, name: &str, choices: &[ParamValue]) -> ParamValue {
        self.declare(name, Domain::Categorical(choices.to_vec()));
        choices.first().copied().unwrap_or(ParamValue::Bool(false))
    }
}

/// Answers every suggestion from a preset parameter map, falling back to
/// the lower bound (or first choice) when a value is absent or out of range.
#[derive(Clone, Debug, Default)]
pub struct FixedTrial {
    params: Params,
}

impl FixedTrial {
    pub fn new(params: Params) -> Self {
        Self { params }
    }
}

impl Trial for FixedTrial {
    fn suggest_int(&mut self, name: &str, low: i64, high: i64) -> i64 {
        match self.params.get(name) {
            Some(ParamValue::Int(v)) if (low..=high).contains(v) => *v,
            _ => low,
        }
    }

    fn suggest_float(&mut self, name: &str, low: f64, high: f64) -> f64 {
        match self.params.get(name) {
            Some(ParamValue::Real(v)) if (low..=high).contains(v) => *v,
            Some(ParamValue::Int(v)) if (low..=high).contains(&(*v as f64)) => *v as f64,
            _ => low,
        }
    }

    fn suggest_categorical(&mut self, name: &str, choices: &[ParamValue]) -> ParamValue {
        match self.params.get(name) {
            Some(v) if choices.contains(v) => *v,
            _ => choices.first().copied().unwrap_or(ParamValue::Bool(false)),
        }
    }
}
