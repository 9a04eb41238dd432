use crate::entry::{Entry, TransactionView};
use geoaccess_core::reader::read_all;
use geoaccess_core::{
    BoxFeatureReader, Envelope, ErrorKind, Feature, FeatureCollection, FeatureId, FeatureListener,
    FeatureLock, FeatureLocking, FeatureSource, FeatureStore, FeatureType, Filter,
    GeoAccessError, Hints, LockOutcome, LockingManager, Name, Query, QueryCapabilities, Result,
    Transaction, Value,
};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a source handed out by the store may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMode {
    ReadOnly,
    Store,
    Locking,
}

/// A view of one in-memory feature type.
///
/// Each source carries its own transaction and lock policy; two sources
/// over the same type share data but not those settings.
pub struct MemoryFeatureSource {
    entry: Arc<Entry>,
    mode: SourceMode,
    locks: Option<Arc<dyn LockingManager>>,
    transaction: RwLock<Transaction>,
    lock: RwLock<FeatureLock>,
}

impl MemoryFeatureSource {
    pub(crate) fn new(
        entry: Arc<Entry>,
        mode: SourceMode,
        locks: Option<Arc<dyn LockingManager>>,
        lock: FeatureLock,
    ) -> Self {
        Self {
            entry,
            mode,
            locks,
            transaction: RwLock::new(Transaction::AUTO_COMMIT),
            lock: RwLock::new(lock),
        }
    }

    pub fn mode(&self) -> SourceMode {
        self.mode
    }

    fn writable(&self) -> Result<Transaction> {
        if self.mode == SourceMode::ReadOnly {
            return Err(GeoAccessError::missing_capability(
                "write",
                self.entry.type_name(),
            ));
        }
        Ok(self.transaction.read().clone())
    }

    fn lock_manager(&self) -> Result<&Arc<dyn LockingManager>> {
        match (&self.locks, self.mode) {
            (Some(locks), SourceMode::Locking) => Ok(locks),
            _ => Err(GeoAccessError::missing_capability(
                "locking",
                self.entry.type_name(),
            )),
        }
    }

    /// Ids of the features `query` selects under the current transaction.
    fn selected_ids(&self, transaction: &Transaction, query: &Query) -> Result<Vec<FeatureId>> {
        let features = read_all(self.entry.reader(transaction.id(), query)?)?;
        Ok(features.into_iter().map(|f| f.id().clone()).collect())
    }
}

impl FeatureSource for MemoryFeatureSource {
    fn name(&self) -> &Name {
        self.entry.schema().name()
    }

    fn schema(&self) -> Result<FeatureType> {
        Ok(self.entry.schema().clone())
    }

    fn query_capabilities(&self) -> QueryCapabilities {
        self.entry.capabilities()
    }

    fn supported_hints(&self) -> BTreeSet<String> {
        let mut hints = BTreeSet::from([Hints::INCLUDE_MANDATORY_PROPS.to_string()]);
        if self.entry.use_provided_fid() {
            hints.insert(Hints::USE_PROVIDED_FID.to_string());
        }
        hints
    }

    fn features(&self, query: &Query) -> Result<FeatureCollection> {
        let view = TransactionView {
            entry: self.entry.clone(),
            transaction: self.transaction.read().id(),
        };
        Ok(FeatureCollection::new(Arc::new(view), query.clone()))
    }

    fn bounds_of(&self, query: &Query) -> Result<Option<Envelope>> {
        self.features(query)?.bounds()
    }

    fn count(&self, query: &Query) -> Result<Option<usize>> {
        self.features(query)?.count().map(Some)
    }

    fn reader(&self, query: &Query) -> Result<BoxFeatureReader> {
        self.entry.reader(self.transaction.read().id(), query)
    }

    fn add_feature_listener(&self, listener: Arc<dyn FeatureListener>) {
        let transaction = self.transaction.read().clone();
        // The diff state drops the listener when the transaction closes.
        if let Err(e) = self.entry.ensure_state(&transaction) {
            warn!(type_name = self.entry.type_name(), transaction = %transaction.id(), error = %e, "listener not registered");
            return;
        }
        self.entry.listeners().add(transaction.id(), listener);
    }

    fn remove_feature_listener(&self, listener: &Arc<dyn FeatureListener>) {
        self.entry.listeners().remove(listener);
    }

    fn as_store(&self) -> Option<&dyn FeatureStore> {
        match self.mode {
            SourceMode::ReadOnly => None,
            SourceMode::Store | SourceMode::Locking => Some(self),
        }
    }

    fn as_locking(&self) -> Option<&dyn FeatureLocking> {
        match (&self.locks, self.mode) {
            (Some(_), SourceMode::Locking) => Some(self),
            _ => None,
        }
    }
}

impl FeatureStore for MemoryFeatureSource {
    fn transaction(&self) -> Transaction {
        self.transaction.read().clone()
    }

    fn set_transaction(&self, transaction: Transaction) -> Result<()> {
        if transaction.is_closed() {
            return Err(GeoAccessError::Unsupported(format!(
                "cannot bind closed transaction {}",
                transaction.id()
            )));
        }
        debug!(type_name = self.entry.type_name(), transaction = %transaction.id(), "source bound");
        *self.transaction.write() = transaction;
        Ok(())
    }

    fn add_features(&self, features: Vec<Feature>) -> Result<Vec<FeatureId>> {
        let transaction = self.writable()?;
        self.entry
            .insert(&transaction, features, self.entry.use_provided_fid())
    }

    fn remove_features(&self, filter: &Filter) -> Result<usize> {
        let transaction = self.writable()?;
        self.entry.remove(&transaction, filter)
    }

    fn modify_features(&self, values: &[(String, Value)], filter: &Filter) -> Result<usize> {
        let transaction = self.writable()?;
        self.entry.modify(&transaction, values, filter)
    }

    fn set_features(&self, reader: BoxFeatureReader) -> Result<()> {
        let transaction = self.writable()?;
        let features: Vec<Feature> = read_all(reader)?
            .into_iter()
            .map(Feature::with_provided_id)
            .collect();
        self.entry.replace(&transaction, features)
    }
}

impl FeatureLocking for MemoryFeatureSource {
    fn set_feature_lock(&self, lock: FeatureLock) {
        *self.lock.write() = lock;
    }

    fn feature_lock(&self) -> FeatureLock {
        self.lock.read().clone()
    }

    fn lock_features(&self, query: &Query) -> Result<usize> {
        let locks = self.lock_manager()?;
        let transaction = self.transaction.read().clone();
        let lock = self.feature_lock();
        let type_name = self.entry.type_name();

        let mut held = 0;
        for id in self.selected_ids(&transaction, query)? {
            match locks.lock_feature_id(type_name, &id, &transaction, &lock) {
                Ok(LockOutcome::Acquired | LockOutcome::AlreadyHeld) => held += 1,
                Err(e) if e.kind() == ErrorKind::Authorization => {
                    warn!(type_name, feature_id = %id, error = %e, "feature skipped, locked elsewhere");
                }
                Err(e) => return Err(e),
            }
        }
        debug!(type_name, lock = %lock, held, "features locked");
        Ok(held)
    }

    fn unlock_features(&self, query: &Query) -> Result<()> {
        let locks = self.lock_manager()?;
        let transaction = self.transaction.read().clone();
        if transaction.is_auto_commit() {
            return Err(GeoAccessError::Unsupported(
                "unlock requires a transaction holding the authorization".into(),
            ));
        }
        let lock = self.feature_lock();
        let type_name = self.entry.type_name();

        let targets: Vec<FeatureId> = self
            .selected_ids(&transaction, query)?
            .into_iter()
            .filter(|id| locks.is_locked(type_name, id))
            .collect();
        // All or nothing: fail before releasing anything.
        for id in &targets {
            locks.assert_access(type_name, id, &transaction)?;
        }
        for id in &targets {
            locks.unlock_feature_id(type_name, id, &transaction, &lock)?;
        }
        debug!(type_name, released = targets.len(), "features unlocked");
        Ok(())
    }
}

impl std::fmt::Debug for MemoryFeatureSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryFeatureSource")
            .field("type_name", &self.entry.type_name())
            .field("mode", &self.mode)
            .field("transaction", &self.transaction.read().id())
            .finish()
    }
}
