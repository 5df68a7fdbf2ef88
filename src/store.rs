use anyhow::{Context, Result, anyhow};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::ConfigError;
use crate::hypermodel::HypermodelKind;
use crate::params::Params;

/// Metric hypermodels are ranked by unless told otherwise
pub const DEFAULT_METRIC: &str = "f1";

/// The persisted configuration of one hypermodel kind: its parameters and
/// the quality metrics they achieved, stored flat as
/// `{ "params": { .. }, "f1": 0.8, .. }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HypermodelRecord {
    pub params: Params,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, f64>,
}

impl Default for HypermodelRecord {
    fn default() -> Self {
        Self {
            params: Params::new(),
            metrics: BTreeMap::from([(DEFAULT_METRIC.to_string(), 0.0)]),
        }
    }
}

impl HypermodelRecord {
    pub fn new(params: Params, metrics: BTreeMap<String, f64>) -> Self {
        Self { params, metrics }
    }

    /// Value of the named metric, zero when it was never recorded
    pub fn metric(&self, key: &str) -> f64 {
        self.metrics.get(key).copied().unwrap_or(0.0)
    }

    pub fn score(&self) -> f64 {
        self.metric(DEFAULT_METRIC)
    }

    /// Validates the shape of a raw record as written by a training process
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        let Value::Object(fields) = &value else {
            return Err(ConfigError::invalid("record", "expected a JSON object"));
        };
        match fields.get("params") {
            None => return Err(ConfigError::MissingField("params".into())),
            Some(Value::Object(params)) => {
                for (name, param) in params {
                    if !(param.is_boolean() || param.is_number()) {
                        return Err(ConfigError::invalid(name, "expected a number or boolean"));
                    }
                }
            }
            Some(_) => return Err(ConfigError::invalid("params", "expected an object")),
        }
        for (name, metric) in fields.iter().filter(|(name, _)| *name != "params") {
            if !metric.is_number() {
                return Err(ConfigError::invalid(name, "metrics must be numbers"));
            }
        }
        serde_json::from_value(value).map_err(|e| ConfigError::invalid("record", e.to_string()))
    }
}

/// Where hypermodel records live. One record per kind, always replaced as a
/// whole.
pub trait ConfigStore: Send + Sync {
    /// `None` when nothing was stored for the kind yet
    fn read(&self, kind: HypermodelKind) -> Result<Option<HypermodelRecord>>;

    fn write(&self, kind: HypermodelKind, record: &HypermodelRecord) -> Result<()>;
}

/// Settings for the on-disk store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one `<kind>.hypermodel.json` per kind
    pub config_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("config"),
        }
    }
}

impl StoreConfig {
    pub const ENV_VAR: &'static str = "HYPERMATCH_CONFIG_DIR";

    /// Default settings, with the directory overridden from the environment
    pub fn from_env() -> Self {
        match std::env::var(Self::ENV_VAR) {
            Ok(dir) if !dir.is_empty() => Self {
                config_dir: PathBuf::from(dir),
            },
            _ => Self::default(),
        }
    }
}

/// Pretty-printed JSON files, one per hypermodel kind
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(&config.config_dir)
    }

    pub fn path(&self, kind: HypermodelKind) -> PathBuf {
        self.dir.join(format!("{}.hypermodel.json", kind.id()))
    }
}

impl ConfigStore for JsonFileStore {
    fn read(&self, kind: HypermodelKind) -> Result<Option<HypermodelRecord>> {
        let path = self.path(kind);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No stored config for {} at {:?}", kind, path);
                return Ok(None);
            }
            Err(e) => return Err(anyhow!("Failed to read {:?}: {}", path, e)),
        };
        let value: Value =
            serde_json::from_slice(&bytes).with_context(|| format!("Invalid JSON in {:?}", path))?;
        let record = HypermodelRecord::from_value(value)
            .with_context(|| format!("Invalid hypermodel record in {:?}", path))?;
        Ok(Some(record))
    }

    fn write(&self, kind: HypermodelKind, record: &HypermodelRecord) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {:?}", self.dir))?;
        let path = self.path(kind);
        let json = serde_json::to_string_pretty(record)?;
        std::fs::write(&path, json).with_context(|| format!("Failed to write {:?}", path))?;
        debug!("Wrote {} config to {:?}", kind, path);
        Ok(())
    }
}

/// Keeps records in memory, e.g. for evaluation runs that should not touch
/// the persisted configs
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<HypermodelKind, HypermodelRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn read(&self, kind: HypermodelKind) -> Result<Option<HypermodelRecord>> {
        let records = self
            .records
            .read()
            .map_err(|_| anyhow!("Config store lock poisoned"))?;
        Ok(records.get(&kind).cloned())
    }

    fn write(&self, kind: HypermodelKind, record: &HypermodelRecord) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| anyhow!("Config store lock poisoned"))?;
        records.insert(kind, record.clone());
        Ok(())
    }
}
