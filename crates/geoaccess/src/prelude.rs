//! GeoAccess Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use geoaccess::prelude::*;
//! ```

// Core types
pub use crate::{
    ErrorKind, Feature, FeatureId, FeatureType, GeoAccessError, Name, Result, Value,
};

// Geometry and attributes
pub use crate::{AttributeDescriptor, AttributeType, Coordinate, Crs, Envelope, Geometry};

// Queries
pub use crate::{CompareOp, Filter, Hints, Join, JoinOn, Properties, Query, QueryCapabilities, SortBy};

// Traits
pub use crate::{
    DataAccess, DataStore, FeatureListener, FeatureLocking, FeatureReader, FeatureSource,
    FeatureStore, FeatureWriter, LockingManager,
};
pub use crate::{require_locking, require_store};

// Transactions and locks
pub use crate::{FeatureLock, LockDuration, Transaction};

// Events
pub use crate::{FeatureEvent, FeatureEventType};

// Configs
pub use crate::{DataStoreConfig, LockConfig, QueryConfig};

// Implementations
pub use crate::{DataStoreFactory, DataStoreRegistry, MemoryDataStore, MemoryDataStoreFactory};

// Re-export common external deps
pub use anyhow;
pub use serde::{Deserialize, Serialize};
pub use std::sync::Arc;
pub use tracing;
