use crate::entry::Entry;
use crate::source::{MemoryFeatureSource, SourceMode};
use crate::writer::MemoryFeatureWriter;
use geoaccess_core::{
    AuthorizationGenerator, BoxFeatureReader, BoxFeatureWriter, DataAccess, DataStore,
    DataStoreConfig, Feature, FeatureId, FeatureLock, FeatureSource, FeatureType, Filter,
    GeoAccessError, InProcessLockingManager, LockingManager, Name, Query, Result, ServiceInfo,
    Transaction, UuidAuthorizationGenerator,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

struct StoreInner {
    id: u64,
    config: DataStoreConfig,
    entries: RwLock<BTreeMap<String, Arc<Entry>>>,
    locks: Arc<InProcessLockingManager>,
    generator: RwLock<Arc<dyn AuthorizationGenerator>>,
    disposed: AtomicBool,
}

/// Data store keeping every feature type in memory
///
/// Cloning is cheap and clones share content. Writes made under a
/// transaction stay in a per-transaction diff until commit.
#[derive(Clone)]
pub struct MemoryDataStore {
    inner: Arc<StoreInner>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::with_config(DataStoreConfig::default())
    }

    pub fn with_config(config: DataStoreConfig) -> Self {
        let id = NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed);
        info!(
            store = id,
            read_only = config.read_only,
            locking = config.locking_enabled,
            "memory data store created"
        );
        Self {
            inner: Arc::new(StoreInner {
                id,
                config,
                entries: RwLock::new(BTreeMap::new()),
                locks: Arc::new(InProcessLockingManager::new()),
                generator: RwLock::new(Arc::new(UuidAuthorizationGenerator)),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    /// Source of authorization tokens for the default lock of new sources.
    pub fn with_authorization_generator(self, generator: Arc<dyn AuthorizationGenerator>) -> Self {
        *self.inner.generator.write() = generator;
        self
    }

    pub fn config(&self) -> &DataStoreConfig {
        &self.inner.config
    }

    /// A fresh timed lock with the configured lifetime.
    pub fn generate_lock(&self) -> FeatureLock {
        let generator = self.inner.generator.read().clone();
        FeatureLock::generate(generator.as_ref(), self.inner.config.lock.duration())
    }

    /// Load features straight into committed content, bypassing sources.
    pub fn add_features(&self, type_name: &str, features: Vec<Feature>) -> Result<Vec<FeatureId>> {
        let entry = self.entry(type_name)?;
        entry.insert(
            &Transaction::AUTO_COMMIT,
            features,
            self.inner.config.query.use_provided_fid_supported,
        )
    }

    fn ensure_live(&self) -> Result<()> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(GeoAccessError::Unsupported(format!(
                "memory data store {} is disposed",
                self.inner.id
            )));
        }
        Ok(())
    }

    fn entry(&self, type_name: &str) -> Result<Arc<Entry>> {
        self.ensure_live()?;
        self.inner
            .entries
            .read()
            .get(type_name)
            .cloned()
            .ok_or_else(|| GeoAccessError::NotFound(format!("feature type {}", type_name)))
    }

    fn manager(&self) -> Option<Arc<dyn LockingManager>> {
        if self.inner.config.locking_enabled {
            Some(self.inner.locks.clone() as Arc<dyn LockingManager>)
        } else {
            None
        }
    }

    fn mode(&self) -> SourceMode {
        let config = &self.inner.config;
        if config.read_only {
            SourceMode::ReadOnly
        } else if config.locking_enabled {
            SourceMode::Locking
        } else {
            SourceMode::Store
        }
    }

    fn ensure_writable(&self, type_name: &str, transaction: &Transaction) -> Result<()> {
        if self.inner.config.read_only {
            return Err(GeoAccessError::missing_capability("write", type_name));
        }
        if transaction.is_closed() {
            return Err(GeoAccessError::Unsupported(format!(
                "writer on closed transaction {}",
                transaction.id()
            )));
        }
        Ok(())
    }
}

impl Default for MemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DataAccess for MemoryDataStore {
    fn info(&self) -> ServiceInfo {
        let config = &self.inner.config;
        ServiceInfo {
            title: config
                .title
                .clone()
                .unwrap_or_else(|| format!("Memory data store {}", self.inner.id)),
            description: "Features held in process memory".to_string(),
            keywords: BTreeSet::from(["memory".to_string(), "features".to_string()]),
            source: None,
            publisher: None,
            schema: config.namespace.clone(),
        }
    }

    fn create_schema(&self, schema: FeatureType) -> Result<()> {
        self.ensure_live()?;
        let schema = match (schema.name().namespace.is_none(), &self.inner.config.namespace) {
            (true, Some(ns)) => {
                let name = Name::with_namespace(ns.clone(), schema.type_name());
                schema.with_name(name)
            }
            _ => schema,
        };
        let type_name = schema.type_name().to_string();

        let mut entries = self.inner.entries.write();
        if entries.contains_key(&type_name) {
            return Err(GeoAccessError::InvalidArgument(format!(
                "feature type {} already exists",
                type_name
            )));
        }
        let entry = Entry::new(
            self.inner.id,
            schema,
            self.inner.config.query.clone(),
            self.manager(),
        );
        entries.insert(type_name.clone(), Arc::new(entry));
        info!(store = self.inner.id, type_name = %type_name, "schema created");
        Ok(())
    }

    fn update_schema(&self, name: &Name, _schema: FeatureType) -> Result<()> {
        self.ensure_live()?;
        Err(GeoAccessError::Unsupported(format!(
            "schema update of {}",
            name
        )))
    }

    fn remove_schema(&self, name: &Name) -> Result<()> {
        self.ensure_live()?;
        if self.inner.entries.write().remove(name.local()).is_some() {
            info!(store = self.inner.id, type_name = name.local(), "schema removed");
        } else {
            debug!(store = self.inner.id, type_name = name.local(), "no schema to remove");
        }
        Ok(())
    }

    fn names(&self) -> Result<Vec<Name>> {
        self.ensure_live()?;
        Ok(self
            .inner
            .entries
            .read()
            .values()
            .map(|entry| entry.schema().name().clone())
            .collect())
    }

    fn schema(&self, name: &Name) -> Result<FeatureType> {
        Ok(self.entry(name.local())?.schema().clone())
    }

    fn feature_source(&self, name: &Name) -> Result<Arc<dyn FeatureSource>> {
        let entry = self.entry(name.local())?;
        Ok(Arc::new(MemoryFeatureSource::new(
            entry,
            self.mode(),
            self.manager(),
            self.generate_lock(),
        )))
    }

    fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = std::mem::take(&mut *self.inner.entries.write()).len();
        info!(store = self.inner.id, types = dropped, "memory data store disposed");
    }
}

impl DataStore for MemoryDataStore {
    fn feature_reader(&self, query: &Query, transaction: &Transaction) -> Result<BoxFeatureReader> {
        let type_name = query.type_name().ok_or_else(|| {
            GeoAccessError::InvalidArgument("feature reader needs a query with a type name".into())
        })?;
        self.entry(type_name)?.reader(transaction.id(), query)
    }

    fn feature_writer(
        &self,
        type_name: &str,
        filter: &Filter,
        transaction: &Transaction,
    ) -> Result<BoxFeatureWriter> {
        let entry = self.entry(type_name)?;
        self.ensure_writable(type_name, transaction)?;
        Ok(Box::new(MemoryFeatureWriter::updating(
            entry,
            transaction.clone(),
            filter,
        )))
    }

    fn feature_writer_append(
        &self,
        type_name: &str,
        transaction: &Transaction,
    ) -> Result<BoxFeatureWriter> {
        let entry = self.entry(type_name)?;
        self.ensure_writable(type_name, transaction)?;
        Ok(Box::new(MemoryFeatureWriter::appending(
            entry,
            transaction.clone(),
        )))
    }

    fn locking_manager(&self) -> Option<Arc<dyn LockingManager>> {
        self.manager()
    }
}

impl std::fmt::Debug for MemoryDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryDataStore")
            .field("id", &self.inner.id)
            .field("types", &self.inner.entries.read().len())
            .field("disposed", &self.inner.disposed.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoaccess_core::reader::read_all;
    use geoaccess_core::{
        require_locking, require_store, AttributeType, ErrorKind, FeatureEvent, FeatureEventType,
        FeatureListener, Geometry, SequentialAuthorizationGenerator, Value,
    };
    use parking_lot::Mutex;

    fn road_type() -> FeatureType {
        FeatureType::new("road")
            .attribute("geom", AttributeType::Geometry)
            .attribute("name", AttributeType::Text)
    }

    fn store_with_roads(config: DataStoreConfig) -> MemoryDataStore {
        let store = MemoryDataStore::with_config(config);
        store.create_schema(road_type()).unwrap();
        store
            .add_features(
                "road",
                vec![
                    Feature::new("road.1")
                        .with("name", "Main")
                        .with("geom", Geometry::point(0.0, 0.0))
                        .with_provided_id(),
                    Feature::new("road.2")
                        .with("name", "Elm")
                        .with("geom", Geometry::point(3.0, 4.0))
                        .with_provided_id(),
                ],
            )
            .unwrap();
        store
    }

    #[test]
    fn test_create_schema_twice_fails() {
        let store = MemoryDataStore::new();
        store.create_schema(road_type()).unwrap();
        let err = store.create_schema(road_type()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(store.type_names().unwrap(), vec!["road".to_string()]);
    }

    #[test]
    fn test_namespace_applied_to_new_types() {
        let store = MemoryDataStore::with_config(DataStoreConfig::new().with_namespace("topo"));
        store.create_schema(road_type()).unwrap();
        let names = store.names().unwrap();
        assert_eq!(names, vec![Name::with_namespace("topo", "road")]);
        assert_eq!(store.info().schema.as_deref(), Some("topo"));
        assert_eq!(store.schema_by_type("road").unwrap().name().to_string(), "topo:road");
    }

    #[test]
    fn test_remove_missing_schema_is_ok() {
        let store = store_with_roads(DataStoreConfig::default());
        store.remove_schema(&Name::new("river")).unwrap();
        store.remove_schema(&Name::new("road")).unwrap();
        assert!(store.names().unwrap().is_empty());
        assert!(matches!(
            store.schema_by_type("road"),
            Err(GeoAccessError::NotFound(_))
        ));
    }

    #[test]
    fn test_update_schema_unsupported() {
        let store = store_with_roads(DataStoreConfig::default());
        let err = store
            .update_schema(&Name::new("road"), road_type())
            .unwrap_err();
        assert!(matches!(err, GeoAccessError::Unsupported(_)));
    }

    #[test]
    fn test_dispose_rejects_further_calls() {
        let store = store_with_roads(DataStoreConfig::default());
        let clone = store.clone();
        store.dispose();
        store.dispose();
        assert!(clone.names().is_err());
        assert!(clone.feature_source_by_type("road").is_err());
        assert!(clone.create_schema(road_type()).is_err());
    }

    #[test]
    fn test_read_only_sources_refuse_writes() {
        let store = store_with_roads(DataStoreConfig::new().with_read_only(true));
        let source = store.feature_source_by_type("road").unwrap();
        assert!(source.as_store().is_none());
        let err = require_store(source.as_ref()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Capability);
        assert!(store
            .feature_writer_append("road", &Transaction::AUTO_COMMIT)
            .is_err());
        assert_eq!(source.count(&Query::ALL).unwrap(), Some(2));
    }

    #[test]
    fn test_locking_disabled_still_writes() {
        let store = store_with_roads(DataStoreConfig::new().with_locking(false));
        let source = store.feature_source_by_type("road").unwrap();
        assert!(source.as_locking().is_none());
        assert!(store.locking_manager().is_none());
        let writable = require_store(source.as_ref()).unwrap();
        assert_eq!(writable.remove_features(&Filter::ids(["road.1"])).unwrap(), 1);
    }

    #[test]
    fn test_append_writer_assigns_ids_and_notifies() {
        let store = store_with_roads(DataStoreConfig::default());
        let source = store.feature_source_by_type("road").unwrap();
        let seen: Arc<Mutex<Vec<FeatureEventType>>> = Arc::default();
        let sink = seen.clone();
        let listener: Arc<dyn FeatureListener> =
            Arc::new(move |event: &FeatureEvent| sink.lock().push(event.kind()));
        source.add_feature_listener(listener);

        let mut writer = store
            .feature_writer_append("road", &Transaction::AUTO_COMMIT)
            .unwrap();
        assert!(!writer.has_next().unwrap());
        let feature = writer.next_feature().unwrap();
        feature.set("name", "Oak");
        writer.write().unwrap();
        writer.close().unwrap();
        assert!(writer.next_feature().is_err());

        assert_eq!(*seen.lock(), vec![FeatureEventType::Added]);
        let oak = source
            .features_filtered(Filter::equals("name", "Oak"))
            .unwrap()
            .to_vec()
            .unwrap();
        assert_eq!(oak.len(), 1);
        assert!(oak[0].id().as_str().starts_with("road."));
    }

    #[test]
    fn test_update_writer_edits_and_removes() {
        let store = store_with_roads(DataStoreConfig::default());
        let txn = Transaction::new();
        let mut writer = store
            .feature_writer("road", &Filter::Include, &txn)
            .unwrap();
        while writer.has_next().unwrap() {
            let feature = writer.next_feature().unwrap();
            if feature.get("name") == &Value::from("Main") {
                feature.set("name", "Main St");
                writer.write().unwrap();
            } else {
                writer.remove().unwrap();
            }
        }
        writer.close().unwrap();

        let committed = read_all(
            store
                .feature_reader(&Query::builder("road").build(), &Transaction::AUTO_COMMIT)
                .unwrap(),
        )
        .unwrap();
        assert_eq!(committed.len(), 2);

        txn.commit().unwrap();
        let after = read_all(
            store
                .feature_reader(&Query::builder("road").build(), &Transaction::AUTO_COMMIT)
                .unwrap(),
        )
        .unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].get("name"), &Value::from("Main St"));
        txn.close().unwrap();
    }

    #[test]
    fn test_sources_get_generated_locks() {
        let store = store_with_roads(DataStoreConfig::new().with_lock_duration(5_000))
            .with_authorization_generator(Arc::new(SequentialAuthorizationGenerator::new("lock")));
        let first = store.feature_source_by_type("road").unwrap();
        let second = store.feature_source_by_type("road").unwrap();
        let first = require_locking(first.as_ref()).unwrap().feature_lock();
        let second = require_locking(second.as_ref()).unwrap().feature_lock();
        assert_eq!(first.authorization(), "lock-1");
        assert_eq!(second.authorization(), "lock-2");
        assert_eq!(first.duration().as_millis(), 5_000);
    }

    #[test]
    fn test_locked_feature_blocks_other_writers() {
        let store = store_with_roads(DataStoreConfig::default());
        let source = store.feature_source_by_type("road").unwrap();
        let locking = require_locking(source.as_ref()).unwrap();
        locking.set_feature_lock(FeatureLock::timed("alpha", 60_000));
        assert_eq!(locking.lock_features_filtered(Filter::ids(["road.1"])).unwrap(), 1);

        let err = locking
            .modify_feature("name", Value::from("X"), &Filter::ids(["road.1"]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let txn = Transaction::new();
        txn.add_authorization("alpha").unwrap();
        locking.set_transaction(txn.clone()).unwrap();
        assert_eq!(
            locking
                .modify_feature("name", Value::from("X"), &Filter::ids(["road.1"]))
                .unwrap(),
            1
        );
        txn.commit().unwrap();
        txn.close().unwrap();
    }
}
