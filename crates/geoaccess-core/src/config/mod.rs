pub mod query;
pub mod store;

pub use query::QueryConfig;
pub use store::{DataStoreConfig, LockConfig};
