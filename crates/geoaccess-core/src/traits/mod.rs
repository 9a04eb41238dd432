pub mod access;
pub mod collection;
pub mod source;

pub use access::{DataAccess, DataStore, ServiceInfo};
pub use collection::{CollectionBackend, FeatureCollection};
pub use source::{require_locking, require_store, FeatureLocking, FeatureSource, FeatureStore};
