use crate::error::{GeoAccessError, Result};
use crate::event::FeatureListener;
use crate::filter::Filter;
use crate::lock::FeatureLock;
use crate::query::{Query, QueryCapabilities};
use crate::reader::BoxFeatureReader;
use crate::traits::collection::FeatureCollection;
use crate::transaction::Transaction;
use crate::types::{Envelope, Feature, FeatureId, FeatureType, Name, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Read access to one named resource
///
/// Write and lock access are optional capabilities discovered through
/// [`FeatureSource::as_store`] and [`FeatureSource::as_locking`].
pub trait FeatureSource: Send + Sync {
    fn name(&self) -> &Name;

    fn schema(&self) -> Result<FeatureType>;

    fn query_capabilities(&self) -> QueryCapabilities;

    /// Hint keys this source honors.
    fn supported_hints(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Features matching `query`. No I/O happens until the collection is
    /// traversed.
    fn features(&self, query: &Query) -> Result<FeatureCollection>;

    fn features_filtered(&self, filter: Filter) -> Result<FeatureCollection> {
        self.features(&Query::filtered(self.name().local(), filter))
    }

    fn all_features(&self) -> Result<FeatureCollection> {
        self.features(&Query::ALL)
    }

    /// Bounds of the matching features. `None` means "not computed", not
    /// "empty"; derive it from the collection when it matters.
    fn bounds_of(&self, query: &Query) -> Result<Option<Envelope>>;

    fn bounds(&self) -> Result<Option<Envelope>> {
        self.bounds_of(&Query::ALL)
    }

    /// Number of matching features, `None` when too expensive to compute.
    fn count(&self, query: &Query) -> Result<Option<usize>>;

    /// Forward-only cursor over the matching features.
    fn reader(&self, query: &Query) -> Result<BoxFeatureReader>;

    fn add_feature_listener(&self, listener: Arc<dyn FeatureListener>);

    fn remove_feature_listener(&self, listener: &Arc<dyn FeatureListener>);

    fn as_store(&self) -> Option<&dyn FeatureStore> {
        None
    }

    fn as_locking(&self) -> Option<&dyn FeatureLocking> {
        None
    }
}

/// Write access on top of [`FeatureSource`]
///
/// Every write runs against the bound transaction. A successful write
/// raises an event for the listeners that may see it.
pub trait FeatureStore: FeatureSource {
    fn transaction(&self) -> Transaction;

    fn set_transaction(&self, transaction: Transaction) -> Result<()>;

    /// Insert features, returning the ids they were stored under.
    fn add_features(&self, features: Vec<Feature>) -> Result<Vec<FeatureId>>;

    /// Remove matching features, returning how many were removed.
    fn remove_features(&self, filter: &Filter) -> Result<usize>;

    /// Set attributes on every matching feature, returning how many changed.
    fn modify_features(&self, values: &[(String, Value)], filter: &Filter) -> Result<usize>;

    fn modify_feature(
        &self,
        attribute: &str,
        value: Value,
        filter: &Filter,
    ) -> Result<usize> {
        self.modify_features(&[(attribute.to_string(), value)], filter)
    }

    /// Replace the whole content with what `reader` yields.
    fn set_features(&self, reader: BoxFeatureReader) -> Result<()>;
}

/// Lock access on top of [`FeatureStore`]
pub trait FeatureLocking: FeatureStore {
    /// Policy used by later `lock_features` calls.
    /// [`FeatureLock::TRANSACTION`] ties locks to the bound transaction.
    fn set_feature_lock(&self, lock: FeatureLock);

    fn feature_lock(&self) -> FeatureLock;

    /// Lock the matching features and return how many are now held under
    /// the current lock, including ones held already. Features locked by
    /// someone else are skipped.
    fn lock_features(&self, query: &Query) -> Result<usize>;

    fn lock_features_filtered(&self, filter: Filter) -> Result<usize> {
        self.lock_features(&Query::filtered(self.name().local(), filter))
    }

    fn lock_all_features(&self) -> Result<usize> {
        self.lock_features(&Query::ALL)
    }

    fn unlock_features(&self, query: &Query) -> Result<()>;

    fn unlock_features_filtered(&self, filter: Filter) -> Result<()> {
        self.unlock_features(&Query::filtered(self.name().local(), filter))
    }

    fn unlock_all_features(&self) -> Result<()> {
        self.unlock_features(&Query::ALL)
    }
}

/// The write capability of `source`, or `MissingCapability`.
pub fn require_store(source: &dyn FeatureSource) -> Result<&dyn FeatureStore> {
    source
        .as_store()
        .ok_or_else(|| GeoAccessError::missing_capability("write", source.name().to_string()))
}

/// The lock capability of `source`, or `MissingCapability`.
pub fn require_locking(source: &dyn FeatureSource) -> Result<&dyn FeatureLocking> {
    source
        .as_locking()
        .ok_or_else(|| GeoAccessError::missing_capability("locking", source.name().to_string()))
}
