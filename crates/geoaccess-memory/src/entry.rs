//! Storage for one feature type: committed features plus one diff per
//! open transaction.

use crate::state::DiffState;
use geoaccess_core::query::compare_features;
use geoaccess_core::{
    apply_query, BoxFeatureReader, CollectionBackend, Envelope, Feature, FeatureEvent,
    FeatureEventType, FeatureId, FeatureType, Filter, GeoAccessError, ListenerRegistry,
    LockingManager, NativeSupport, Query, QueryCapabilities, QueryConfig, Result, StateKey,
    Transaction, TransactionId, Value, VecFeatureReader, Version,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Pending changes of one transaction. `None` marks a removal.
type Diff = BTreeMap<FeatureId, Option<Feature>>;

#[derive(Default)]
struct EntryData {
    committed: BTreeMap<FeatureId, Feature>,
    diffs: BTreeMap<TransactionId, Diff>,
    next_fid: u64,
}

impl EntryData {
    /// The feature as `txn` sees it.
    fn current(&self, txn: TransactionId, id: &FeatureId) -> Option<&Feature> {
        if let Some(change) = self.diffs.get(&txn).and_then(|diff| diff.get(id)) {
            return change.as_ref();
        }
        self.committed.get(id)
    }

    /// Every feature `txn` sees that matches `filter`, in id order.
    fn view(&self, txn: TransactionId, filter: &Filter) -> Vec<Feature> {
        let Some(diff) = self.diffs.get(&txn) else {
            return self
                .committed
                .values()
                .filter(|f| filter.evaluate(f))
                .cloned()
                .collect();
        };
        let mut merged: BTreeMap<&FeatureId, &Feature> = self.committed.iter().collect();
        for (id, change) in diff {
            match change {
                Some(feature) => {
                    merged.insert(id, feature);
                }
                None => {
                    merged.remove(id);
                }
            }
        }
        merged
            .into_values()
            .filter(|f| filter.evaluate(f))
            .cloned()
            .collect()
    }

    fn write(&mut self, txn: TransactionId, id: FeatureId, value: Option<Feature>) {
        if txn.is_auto_commit() {
            match value {
                Some(feature) => {
                    self.committed.insert(id, feature);
                }
                None => {
                    self.committed.remove(&id);
                }
            }
        } else {
            self.diffs.entry(txn).or_default().insert(id, value);
        }
    }

    /// Whether `id` is taken anywhere, committed or pending.
    fn is_taken(&self, id: &FeatureId) -> bool {
        self.committed.contains_key(id)
            || self
                .diffs
                .values()
                .any(|diff| matches!(diff.get(id), Some(Some(_))))
    }

    fn generate_fid(&mut self, type_name: &str) -> FeatureId {
        loop {
            self.next_fid += 1;
            let id = FeatureId::new(format!("{}.{}", type_name, self.next_fid));
            if !self.is_taken(&id) {
                return id;
            }
        }
    }

    /// Ids and bounds (old and new) of everything in `diff`.
    fn extent(&self, diff: &Diff) -> (Vec<FeatureId>, Option<Envelope>) {
        let mut bounds = None;
        for (id, change) in diff {
            bounds = Envelope::merge(bounds, self.committed.get(id).and_then(Feature::bounds));
            bounds = Envelope::merge(bounds, change.as_ref().and_then(Feature::bounds));
        }
        (diff.keys().cloned().collect(), bounds)
    }
}

pub(crate) struct Entry {
    schema: FeatureType,
    state_key: StateKey,
    query: QueryConfig,
    locks: Option<Arc<dyn LockingManager>>,
    data: Mutex<EntryData>,
    listeners: ListenerRegistry,
}

impl Entry {
    pub(crate) fn new(
        store_id: u64,
        schema: FeatureType,
        query: QueryConfig,
        locks: Option<Arc<dyn LockingManager>>,
    ) -> Self {
        let state_key = StateKey::new(format!("memory:{}:{}", store_id, schema.type_name()));
        Self {
            schema,
            state_key,
            query,
            locks,
            data: Mutex::new(EntryData::default()),
            listeners: ListenerRegistry::new(),
        }
    }

    pub(crate) fn schema(&self) -> &FeatureType {
        &self.schema
    }

    pub(crate) fn type_name(&self) -> &str {
        self.schema.type_name()
    }

    pub(crate) fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub(crate) fn capabilities(&self) -> QueryCapabilities {
        self.query
            .capabilities(self.schema.attributes().iter().map(|a| a.name.as_str()))
    }

    pub(crate) fn use_provided_fid(&self) -> bool {
        self.query.use_provided_fid_supported
    }

    pub(crate) fn reserve_fid(&self) -> FeatureId {
        self.data.lock().generate_fid(self.type_name())
    }

    /// Attach this entry's diff state to `txn` on its first write or
    /// listener registration.
    pub(crate) fn ensure_state(self: &Arc<Self>, txn: &Transaction) -> Result<()> {
        if txn.is_auto_commit() || txn.state(&self.state_key).is_some() {
            return Ok(());
        }
        let state = Arc::new(DiffState::new(self.clone(), txn));
        txn.put_state(self.state_key.clone(), state)
    }

    fn check_access<'a, I>(&self, txn: &Transaction, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a FeatureId>,
    {
        if let Some(locks) = &self.locks {
            for id in ids {
                locks.assert_access(self.type_name(), id, txn)?;
            }
        }
        Ok(())
    }

    fn fire(&self, kind: FeatureEventType, txn: TransactionId, ids: Vec<FeatureId>, bounds: Option<Envelope>) {
        if ids.is_empty() {
            return;
        }
        let event = FeatureEvent::new(kind, self.schema.name().clone(), txn, bounds, Filter::ids(ids));
        match kind {
            FeatureEventType::Committed => self.listeners.notify_commit(&event),
            FeatureEventType::RolledBack => self.listeners.notify_rollback(&event),
            _ => self.listeners.notify_change(&event),
        };
    }

    /// Insert features. Ids the caller marked as provided are kept when
    /// `keep_ids` is set; every other feature gets a generated id.
    pub(crate) fn insert(
        self: &Arc<Self>,
        txn: &Transaction,
        features: Vec<Feature>,
        keep_ids: bool,
    ) -> Result<Vec<FeatureId>> {
        for feature in &features {
            self.schema.validate(feature)?;
        }
        self.ensure_state(txn)?;

        let mut ids = Vec::with_capacity(features.len());
        let mut bounds = None;
        {
            let mut data = self.data.lock();
            let mut planned = Vec::with_capacity(features.len());
            for mut feature in features {
                let id = if keep_ids && feature.uses_provided_id() {
                    let id = feature.id().clone();
                    if data.current(txn.id(), &id).is_some() || ids.contains(&id) {
                        return Err(GeoAccessError::InvalidArgument(format!(
                            "feature id {} already exists in {}",
                            id,
                            self.type_name()
                        )));
                    }
                    id
                } else {
                    data.generate_fid(self.type_name())
                };
                feature.set_id(id.clone());
                bounds = Envelope::merge(bounds, feature.bounds());
                ids.push(id);
                planned.push(feature);
            }
            for feature in planned {
                data.write(txn.id(), feature.id().clone(), Some(feature));
            }
        }
        debug!(type_name = self.type_name(), transaction = %txn.id(), count = ids.len(), "features added");
        self.fire(FeatureEventType::Added, txn.id(), ids.clone(), bounds);
        Ok(ids)
    }

    /// Set `values` on every feature matching `filter`.
    pub(crate) fn modify(
        self: &Arc<Self>,
        txn: &Transaction,
        values: &[(String, Value)],
        filter: &Filter,
    ) -> Result<usize> {
        for (name, value) in values {
            self.schema.check_value(name, value)?;
        }
        self.ensure_state(txn)?;

        let (ids, bounds) = {
            let mut data = self.data.lock();
            let targets = data.view(txn.id(), filter);
            self.check_access(txn, targets.iter().map(Feature::id))?;
            let mut bounds = None;
            let mut ids = Vec::with_capacity(targets.len());
            for mut feature in targets {
                bounds = Envelope::merge(bounds, feature.bounds());
                for (name, value) in values {
                    feature.set(name.clone(), value.clone());
                }
                bounds = Envelope::merge(bounds, feature.bounds());
                ids.push(feature.id().clone());
                data.write(txn.id(), feature.id().clone(), Some(feature));
            }
            (ids, bounds)
        };
        let count = ids.len();
        self.fire(FeatureEventType::Changed, txn.id(), ids, bounds);
        Ok(count)
    }

    /// Replace one existing feature with `feature`.
    pub(crate) fn update(self: &Arc<Self>, txn: &Transaction, feature: Feature) -> Result<()> {
        self.schema.validate(&feature)?;
        self.ensure_state(txn)?;
        let id = feature.id().clone();
        let bounds = {
            let mut data = self.data.lock();
            let old = data.current(txn.id(), &id).ok_or_else(|| {
                GeoAccessError::NotFound(format!("feature {} of {}", id, self.type_name()))
            })?;
            let bounds = Envelope::merge(old.bounds(), feature.bounds());
            self.check_access(txn, [&id])?;
            data.write(txn.id(), id.clone(), Some(feature));
            bounds
        };
        self.fire(FeatureEventType::Changed, txn.id(), vec![id], bounds);
        Ok(())
    }

    /// Remove every feature matching `filter`.
    pub(crate) fn remove(self: &Arc<Self>, txn: &Transaction, filter: &Filter) -> Result<usize> {
        self.ensure_state(txn)?;
        let (ids, bounds) = {
            let mut data = self.data.lock();
            let targets = data.view(txn.id(), filter);
            self.check_access(txn, targets.iter().map(Feature::id))?;
            let bounds = targets
                .iter()
                .map(Feature::bounds)
                .fold(None, Envelope::merge);
            let ids: Vec<FeatureId> = targets.iter().map(|f| f.id().clone()).collect();
            for id in &ids {
                data.write(txn.id(), id.clone(), None);
            }
            (ids, bounds)
        };
        let count = ids.len();
        debug!(type_name = self.type_name(), transaction = %txn.id(), count, "features removed");
        self.fire(FeatureEventType::Removed, txn.id(), ids, bounds);
        Ok(count)
    }

    /// Replace everything `txn` sees with `features`, keeping their ids.
    /// Either the whole replacement lands or nothing changes.
    pub(crate) fn replace(self: &Arc<Self>, txn: &Transaction, features: Vec<Feature>) -> Result<()> {
        let mut incoming = BTreeSet::new();
        for feature in &features {
            self.schema.validate(feature)?;
            if !incoming.insert(feature.id().clone()) {
                return Err(GeoAccessError::InvalidArgument(format!(
                    "feature id {} appears more than once in the replacement for {}",
                    feature.id(),
                    self.type_name()
                )));
            }
        }
        self.ensure_state(txn)?;

        let added: Vec<FeatureId> = features.iter().map(|f| f.id().clone()).collect();
        let added_bounds = features.iter().map(Feature::bounds).fold(None, Envelope::merge);
        let (removed, removed_bounds) = {
            let mut data = self.data.lock();
            let existing = data.view(txn.id(), &Filter::Include);
            self.check_access(txn, existing.iter().map(Feature::id))?;
            let bounds = existing.iter().map(Feature::bounds).fold(None, Envelope::merge);
            let removed: Vec<FeatureId> = existing.into_iter().map(|f| f.id().clone()).collect();
            for id in &removed {
                data.write(txn.id(), id.clone(), None);
            }
            for feature in features {
                data.write(txn.id(), feature.id().clone(), Some(feature));
            }
            (removed, bounds)
        };
        debug!(
            type_name = self.type_name(),
            transaction = %txn.id(),
            removed = removed.len(),
            added = added.len(),
            "features replaced"
        );
        self.fire(FeatureEventType::Removed, txn.id(), removed, removed_bounds);
        self.fire(FeatureEventType::Added, txn.id(), added, added_bounds);
        Ok(())
    }

    /// Apply the pending diff of `txn` and tell everyone else.
    ///
    /// Locks taken after the writes were made still apply: if `txn` lacks
    /// access to any feature in the diff, nothing is applied and the diff
    /// stays pending.
    pub(crate) fn commit(&self, txn: &Transaction) -> Result<()> {
        let (ids, bounds) = {
            let mut data = self.data.lock();
            let Some(diff) = data.diffs.get(&txn.id()) else {
                return Ok(());
            };
            self.check_access(txn, diff.keys())?;
            let Some(diff) = data.diffs.remove(&txn.id()) else {
                return Ok(());
            };
            let extent = data.extent(&diff);
            for (id, change) in diff {
                data.write(TransactionId::AUTO_COMMIT, id, change);
            }
            extent
        };
        debug!(type_name = self.type_name(), transaction = %txn.id(), count = ids.len(), "diff committed");
        self.fire(FeatureEventType::Committed, txn.id(), ids, bounds);
        Ok(())
    }

    /// Drop the pending diff of `txn` and tell its own listeners.
    pub(crate) fn rollback(&self, txn: TransactionId) {
        let (ids, bounds) = {
            let mut data = self.data.lock();
            let Some(diff) = data.diffs.remove(&txn) else {
                return;
            };
            data.extent(&diff)
        };
        debug!(type_name = self.type_name(), transaction = %txn, count = ids.len(), "diff rolled back");
        self.fire(FeatureEventType::RolledBack, txn, ids, bounds);
    }

    /// Drop the pending diff of `txn` without notification.
    pub(crate) fn discard(&self, txn: TransactionId) {
        if self.data.lock().diffs.remove(&txn).is_some() {
            debug!(type_name = self.type_name(), transaction = %txn, "diff discarded");
        }
    }

    pub(crate) fn check_query(&self, query: &Query) -> Result<()> {
        if !query.targets(self.type_name()) {
            return Err(GeoAccessError::InvalidArgument(format!(
                "query for {} sent to {}",
                query.type_name().unwrap_or_default(),
                self.type_name()
            )));
        }
        if !query.joins().is_empty() {
            return Err(GeoAccessError::missing_capability("join", self.type_name()));
        }
        if let Some(target) = query.crs_reproject() {
            if self.schema.crs() != Some(target) {
                return Err(GeoAccessError::missing_capability(
                    "reprojection",
                    self.type_name(),
                ));
            }
        }
        if matches!(query.version(), Some(v) if *v != Version::Latest) {
            return Err(GeoAccessError::missing_capability("versioning", self.type_name()));
        }
        Ok(())
    }

    /// The features `txn` sees for `query`.
    pub(crate) fn reader(&self, txn: TransactionId, query: &Query) -> Result<BoxFeatureReader> {
        self.check_query(query)?;
        let mut features = self.data.lock().view(txn, query.filter());

        let caps = self.capabilities();
        let mut native = NativeSupport {
            filter: true,
            ..NativeSupport::NONE
        };
        if caps.supports_sorting(query.sort_by()) {
            if !query.sort_by().is_empty() {
                let paging = query.start_index().is_some();
                features.sort_by(|a, b| compare_features(query.sort_by(), a, b, paging));
            }
            native.sort = true;
            if caps.is_offset_supported() {
                let start = query.start_index().unwrap_or(0);
                let max = query.max_features().unwrap_or(usize::MAX);
                features = features.into_iter().skip(start).take(max).collect();
                native.offset = true;
                native.limit = true;
            }
        }

        let schema = match query.crs() {
            Some(crs) => self.schema.clone().with_crs(crs.clone()),
            None => self.schema.clone(),
        };
        apply_query(
            Box::new(VecFeatureReader::new(schema, features)),
            query,
            native,
        )
    }

    /// Matching features as `txn` sees them, ignoring projection and paging.
    pub(crate) fn matching(&self, txn: TransactionId, filter: &Filter) -> Vec<Feature> {
        self.data.lock().view(txn, filter)
    }

    #[cfg(test)]
    pub(crate) fn pending(&self, txn: TransactionId) -> usize {
        self.data.lock().diffs.get(&txn).map_or(0, BTreeMap::len)
    }
}

/// An entry seen through one transaction; backs feature collections.
pub(crate) struct TransactionView {
    pub(crate) entry: Arc<Entry>,
    pub(crate) transaction: TransactionId,
}

impl CollectionBackend for TransactionView {
    fn schema(&self, query: &Query) -> Result<FeatureType> {
        Ok(self.entry.reader(self.transaction, query)?.schema().clone())
    }

    fn reader(&self, query: &Query) -> Result<BoxFeatureReader> {
        self.entry.reader(self.transaction, query)
    }

    /// Answered from the merged view; bounds fall back to traversal.
    fn count(&self, query: &Query) -> Result<Option<usize>> {
        self.entry.check_query(query)?;
        let matched = self.entry.matching(self.transaction, query.filter()).len();
        let remaining = matched.saturating_sub(query.start_index().unwrap_or(0));
        Ok(Some(
            query
                .max_features()
                .map_or(remaining, |max| remaining.min(max)),
        ))
    }
}
