//! GeoAccess: transactional, lockable access to geospatial features
//!
//! GeoAccess ties together:
//! - **Core contracts**: queries, transactions, locks, change events and the
//!   layered source/store/locking traits (`geoaccess-core`)
//! - **In-memory backend**: a complete data store with per-transaction
//!   diffs (`geoaccess-memory`)
//! - **Factories**: an explicit registry that builds stores from loose
//!   connection parameters
//!
//! # Quick Start
//!
//! ```no_run
//! use geoaccess::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let store = MemoryDataStore::new();
//! store.create_schema(
//!     FeatureType::new("road")
//!         .attribute("geom", AttributeType::Geometry)
//!         .attribute("name", AttributeType::Text),
//! )?;
//!
//! let source = store.feature_source_by_type("road")?;
//! let roads = require_store(source.as_ref())?;
//!
//! let txn = Transaction::new();
//! roads.set_transaction(txn.clone())?;
//! roads.add_features(vec![Feature::new("new").with("name", "Main")])?;
//! txn.commit()?;
//! txn.close()?;
//! # Ok(())
//! # }
//! ```

pub mod factory;
pub mod prelude;

pub use geoaccess_core::{
    config, error, event, filter, lock, lock_manager, observe, query, reader, traits,
    transaction, types,
};

// Re-export core types
pub use geoaccess_core::{
    apply_query, require_locking, require_store, AttributeDescriptor, AttributeType,
    AuthorizationGenerator, BoxFeatureReader, BoxFeatureWriter, CollectionBackend, CompareOp,
    Coordinate, Crs, DataAccess, DataStore, DataStoreConfig, Envelope, ErrorKind, Feature,
    FeatureCollection, FeatureEvent, FeatureEventType, FeatureId, FeatureListener, FeatureLock,
    FeatureLocking, FeatureReader, FeatureSource, FeatureStore, FeatureType, FeatureWriter,
    Filter, GeoAccessError, Geometry, Hints, InProcessLockingManager, Join, JoinKind, JoinOn,
    ListenerRegistry, LockConfig, LockDuration, LockInfo, LockOutcome, LockingManager, Name,
    NativeSupport, Properties, Query, QueryBuilder, QueryCapabilities, QueryConfig, ReaderIter,
    Result, SequentialAuthorizationGenerator, ServiceInfo, SortBy, SortOrder, State, StateKey,
    Transaction, TransactionId, UuidAuthorizationGenerator, Value, VecFeatureReader, Version,
    WeakTransaction,
};

// Re-export implementations
pub use geoaccess_memory::{MemoryDataStore, MemoryFeatureSource, MemoryFeatureWriter, SourceMode};

pub use factory::{DataStoreFactory, DataStoreRegistry, MemoryDataStoreFactory};
