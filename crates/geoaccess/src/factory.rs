//! Data store factories
//!
//! Stores are built from loose connection parameters (a JSON object). The
//! caller owns a [`DataStoreRegistry`] and registers the factories it wants;
//! there is no process-wide lookup.
//!
//! # Example
//!
//! ```no_run
//! use geoaccess::prelude::*;
//! use serde_json::json;
//!
//! # fn main() -> Result<()> {
//! let registry = DataStoreRegistry::with_defaults();
//! let params = json!({ "type": "memory", "namespace": "topo" });
//! let store = registry.create(params.as_object().cloned().unwrap_or_default())?;
//! assert!(store.type_names()?.is_empty());
//! # Ok(())
//! # }
//! ```

use geoaccess_core::{DataStore, DataStoreConfig, GeoAccessError, Result};
use geoaccess_memory::MemoryDataStore;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Connection parameters handed to factories.
pub type Params = Map<String, Value>;

/// Builds one kind of data store from connection parameters.
pub trait DataStoreFactory: Send + Sync {
    /// Unique name of the factory (e.g., "memory").
    fn display_name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Whether `params` are meant for this factory.
    fn can_process(&self, params: &Params) -> bool;

    fn create(&self, params: &Params) -> Result<Arc<dyn DataStore>>;
}

/// Factory for [`MemoryDataStore`]
///
/// Accepts `{"type": "memory", ...}`; every other key is read as a
/// [`DataStoreConfig`] field.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryDataStoreFactory;

impl MemoryDataStoreFactory {
    pub const TYPE: &'static str = "memory";
}

impl DataStoreFactory for MemoryDataStoreFactory {
    fn display_name(&self) -> &str {
        Self::TYPE
    }

    fn description(&self) -> &str {
        "Features held in process memory"
    }

    fn can_process(&self, params: &Params) -> bool {
        params.get("type").and_then(Value::as_str) == Some(Self::TYPE)
    }

    fn create(&self, params: &Params) -> Result<Arc<dyn DataStore>> {
        if !self.can_process(params) {
            return Err(GeoAccessError::InvalidArgument(format!(
                "parameters are not for the {} factory",
                Self::TYPE
            )));
        }
        let mut config_params = params.clone();
        config_params.remove("type");
        let config = DataStoreConfig::from_params(config_params)?;
        Ok(Arc::new(MemoryDataStore::with_config(config)))
    }
}

/// Registry of data store factories, tried in registration order.
#[derive(Default)]
pub struct DataStoreRegistry {
    factories: Vec<Box<dyn DataStoreFactory>>,
}

impl DataStoreRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the factories shipped with this crate
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(MemoryDataStoreFactory));
        registry
    }

    /// Register a factory
    ///
    /// Panics if a factory with the same display name is already registered.
    pub fn register(&mut self, factory: Box<dyn DataStoreFactory>) {
        if self.get(factory.display_name()).is_some() {
            panic!(
                "Factory '{}' already registered",
                factory.display_name()
            );
        }
        self.factories.push(factory);
    }

    /// Try to register a factory, returning error if already registered
    pub fn try_register(&mut self, factory: Box<dyn DataStoreFactory>) -> Result<()> {
        if self.get(factory.display_name()).is_some() {
            return Err(GeoAccessError::InvalidArgument(format!(
                "Factory '{}' already registered",
                factory.display_name()
            )));
        }
        self.factories.push(factory);
        Ok(())
    }

    /// Get a factory by display name
    pub fn get(&self, display_name: &str) -> Option<&dyn DataStoreFactory> {
        self.factories
            .iter()
            .find(|f| f.display_name() == display_name)
            .map(|f| f.as_ref())
    }

    /// First factory that accepts `params`
    pub fn find(&self, params: &Params) -> Option<&dyn DataStoreFactory> {
        self.factories
            .iter()
            .find(|f| f.can_process(params))
            .map(|f| f.as_ref())
    }

    /// Build a store with the first factory that accepts `params`
    pub fn create(&self, params: Params) -> Result<Arc<dyn DataStore>> {
        let factory = self.find(&params).ok_or_else(|| {
            GeoAccessError::NotFound(format!(
                "no data store factory accepts parameters {}",
                Value::Object(params.clone())
            ))
        })?;
        debug!(factory = factory.display_name(), "factory selected");
        let store = factory.create(&params)?;
        info!(factory = factory.display_name(), "data store created from parameters");
        Ok(store)
    }

    pub fn display_names(&self) -> Vec<&str> {
        self.factories.iter().map(|f| f.display_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap()
    }

    struct NamedFactory(&'static str);

    impl DataStoreFactory for NamedFactory {
        fn display_name(&self) -> &str {
            self.0
        }

        fn can_process(&self, params: &Params) -> bool {
            params.get("type").and_then(Value::as_str) == Some(self.0)
        }

        fn create(&self, _params: &Params) -> Result<Arc<dyn DataStore>> {
            Ok(Arc::new(MemoryDataStore::new()))
        }
    }

    #[test]
    fn test_memory_factory_reads_config() {
        let registry = DataStoreRegistry::with_defaults();
        let store = registry
            .create(params(json!({ "type": "memory", "namespace": "topo", "read_only": true })))
            .unwrap();
        assert_eq!(store.info().schema.as_deref(), Some("topo"));
    }

    #[test]
    fn test_unknown_params_not_found() {
        let registry = DataStoreRegistry::with_defaults();
        let err = registry
            .create(params(json!({ "type": "postgis" })))
            .err()
            .unwrap();
        assert!(matches!(err, GeoAccessError::NotFound(_)));
    }

    #[test]
    fn test_bad_config_is_serialization_error() {
        let registry = DataStoreRegistry::with_defaults();
        let err = registry
            .create(params(json!({ "type": "memory", "read_only": "maybe" })))
            .err()
            .unwrap();
        assert!(matches!(err, GeoAccessError::Serialization(_)));
    }

    #[test]
    fn test_try_register_duplicate() {
        let mut registry = DataStoreRegistry::new();
        registry.register(Box::new(NamedFactory("a")));
        assert!(registry.try_register(Box::new(NamedFactory("a"))).is_err());
        registry.try_register(Box::new(NamedFactory("b"))).unwrap();
        assert_eq!(registry.display_names(), vec!["a", "b"]);
        assert!(registry.find(&params(json!({ "type": "b" }))).is_some());
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn test_register_duplicate_panics() {
        let mut registry = DataStoreRegistry::with_defaults();
        registry.register(Box::new(MemoryDataStoreFactory));
    }
}
