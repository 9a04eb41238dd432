use crate::config::query::QueryConfig;
use crate::error::Result;
use crate::lock::LockDuration;
use serde::{Deserialize, Serialize};

/// Lock defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lifetime of locks generated by the store (default: 1 hour)
    #[serde(default = "default_lock_duration")]
    pub default_duration_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_duration_ms: default_lock_duration(),
        }
    }
}

impl LockConfig {
    pub fn duration(&self) -> LockDuration {
        LockDuration::Millis(self.default_duration_ms)
    }
}

fn default_lock_duration() -> u64 {
    60 * 60 * 1000
}

/// Configuration for a data store
///
/// Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataStoreConfig {
    /// Namespace given to every resource name (default: none)
    #[serde(default)]
    pub namespace: Option<String>,

    /// Hand out read-only sources only (default: false)
    #[serde(default)]
    pub read_only: bool,

    /// Offer lock access on sources (default: true)
    #[serde(default = "default_true")]
    pub locking_enabled: bool,

    #[serde(default)]
    pub lock: LockConfig,

    #[serde(default)]
    pub query: QueryConfig,

    /// Service title reported by `info()`
    #[serde(default)]
    pub title: Option<String>,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            read_only: false,
            locking_enabled: true,
            lock: LockConfig::default(),
            query: QueryConfig::default(),
            title: None,
        }
    }
}

impl DataStoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build from loose connection parameters, as factories receive them.
    pub fn from_params(params: serde_json::Map<String, serde_json::Value>) -> Result<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(params))?)
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_locking(mut self, enabled: bool) -> Self {
        self.locking_enabled = enabled;
        self
    }

    pub fn with_lock_duration(mut self, millis: u64) -> Self {
        self.lock.default_duration_ms = millis;
        self
    }

    pub fn with_query(mut self, query: QueryConfig) -> Self {
        self.query = query;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

fn default_true() -> bool {
    true
}
