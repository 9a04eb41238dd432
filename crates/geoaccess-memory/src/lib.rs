//! In-memory feature store
//!
//! Keeps every feature type in process memory behind the geoaccess-core
//! contracts.
//!
//! Key features:
//! - Per-transaction diffs, applied on commit and dropped on rollback
//! - Reads through a transaction see its own pending writes
//! - Change events routed by transaction (own writes, commits, rollbacks)
//! - Timed and transaction-scoped feature locks via the in-process manager
//! - Native filtering, sorting and paging, retyping through emulation

mod entry;
mod source;
mod state;
mod store;
mod writer;

pub use source::{MemoryFeatureSource, SourceMode};
pub use store::MemoryDataStore;
pub use writer::MemoryFeatureWriter;
