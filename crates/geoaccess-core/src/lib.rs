//! GeoAccess Core: contracts and value types for transactional feature access
//!
//! This crate defines how callers read, write and lock typed records
//! (features) held by pluggable backends:
//! - Query: immutable read request (projection, filter, paging, sort, hints)
//! - Transaction: unit of work carrying backend `State` and lock authorizations
//! - LockingManager: per-feature locks keyed by authorization token
//! - FeatureSource / FeatureStore / FeatureLocking: layered read, write and
//!   lock capabilities over one resource
//! - DataAccess / DataStore: the service handing out sources
//!
//! Isolation rule: a write made in one transaction is visible to that
//! transaction at once and to everyone else only after commit. Listeners
//! are notified accordingly (see [`event`]).

pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod lock;
pub mod lock_manager;
pub mod observe;
pub mod query;
pub mod reader;
pub mod traits;
pub mod transaction;
pub mod types;

pub use config::{DataStoreConfig, LockConfig, QueryConfig};
pub use error::{ErrorKind, GeoAccessError, Result};
pub use event::{FeatureEvent, FeatureEventType, FeatureListener, ListenerRegistry};
pub use filter::{CompareOp, Filter};
pub use lock::{
    AuthorizationGenerator, FeatureLock, LockDuration, SequentialAuthorizationGenerator,
    UuidAuthorizationGenerator,
};
pub use lock_manager::{InProcessLockingManager, LockInfo, LockOutcome, LockingManager};
pub use query::{
    Hints, Join, JoinKind, JoinOn, Properties, Query, QueryBuilder, QueryCapabilities, SortBy,
    SortOrder, Version,
};
pub use reader::{
    apply_query, BoxFeatureReader, BoxFeatureWriter, FeatureReader, FeatureWriter, NativeSupport,
    ReaderIter, VecFeatureReader,
};
pub use traits::{
    require_locking, require_store, CollectionBackend, DataAccess, DataStore, FeatureCollection,
    FeatureLocking, FeatureSource, FeatureStore, ServiceInfo,
};
pub use transaction::{State, StateKey, Transaction, TransactionId, WeakTransaction};
pub use types::{
    AttributeDescriptor, AttributeType, Coordinate, Crs, Envelope, Feature, FeatureId,
    FeatureType, Geometry, Name, Value,
};
