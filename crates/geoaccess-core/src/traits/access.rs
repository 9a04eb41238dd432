use crate::error::Result;
use crate::filter::Filter;
use crate::lock_manager::LockingManager;
use crate::query::Query;
use crate::reader::{BoxFeatureReader, BoxFeatureWriter};
use crate::traits::source::FeatureSource;
use crate::transaction::Transaction;
use crate::types::{FeatureType, Name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Descriptive metadata about a data service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    /// Namespace of the schemas served.
    #[serde(default)]
    pub schema: Option<String>,
}

/// A service exposing named resources.
pub trait DataAccess: Send + Sync {
    fn info(&self) -> ServiceInfo;

    /// Create a new resource. Fails if the name is taken.
    fn create_schema(&self, schema: FeatureType) -> Result<()>;

    fn update_schema(&self, name: &Name, schema: FeatureType) -> Result<()>;

    fn remove_schema(&self, name: &Name) -> Result<()>;

    fn names(&self) -> Result<Vec<Name>>;

    fn schema(&self, name: &Name) -> Result<FeatureType>;

    /// A source over the resource, bound to AUTO_COMMIT. Cast it with
    /// [`require_store`](crate::traits::require_store) to write.
    fn feature_source(&self, name: &Name) -> Result<Arc<dyn FeatureSource>>;

    /// Release every resource the service holds. Further calls fail.
    fn dispose(&self);
}

/// A [`DataAccess`] whose resources are simple flat feature types
/// addressed by local name, with direct cursor access.
pub trait DataStore: DataAccess {
    fn type_names(&self) -> Result<Vec<String>> {
        Ok(self
            .names()?
            .into_iter()
            .map(|name| name.local)
            .collect())
    }

    fn schema_by_type(&self, type_name: &str) -> Result<FeatureType> {
        self.schema(&Name::new(type_name))
    }

    fn feature_source_by_type(&self, type_name: &str) -> Result<Arc<dyn FeatureSource>> {
        self.feature_source(&Name::new(type_name))
    }

    /// Cursor over `query.type_name()` as seen from `transaction`.
    fn feature_reader(&self, query: &Query, transaction: &Transaction)
        -> Result<BoxFeatureReader>;

    /// Cursor for editing the matching features in place.
    fn feature_writer(
        &self,
        type_name: &str,
        filter: &Filter,
        transaction: &Transaction,
    ) -> Result<BoxFeatureWriter>;

    /// Cursor for appending new features.
    fn feature_writer_append(
        &self,
        type_name: &str,
        transaction: &Transaction,
    ) -> Result<BoxFeatureWriter>;

    /// The manager guarding writes, when the store supports locking.
    fn locking_manager(&self) -> Option<Arc<dyn LockingManager>>;
}
