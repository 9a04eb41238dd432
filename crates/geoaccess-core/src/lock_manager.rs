//! Per-feature lock manager with authorization tokens
//!
//! Locks are keyed by (type name, feature id). A timed lock belongs to an
//! authorization token and expires on its own; a transaction lock belongs
//! to one transaction and is released when that transaction commits,
//! rolls back or closes.

use crate::error::{GeoAccessError, Result};
use crate::lock::{FeatureLock, LockDuration};
use crate::observe;
use crate::transaction::{State, StateKey, Transaction, TransactionId};
use crate::types::FeatureId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of a successful lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The feature was free and is now locked.
    Acquired,
    /// The caller already held the lock.
    AlreadyHeld,
}

impl LockOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockOutcome::Acquired => "acquired",
            LockOutcome::AlreadyHeld => "already_held",
        }
    }
}

/// Snapshot of a held lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub type_name: String,
    pub feature_id: FeatureId,
    /// `None` for transaction locks.
    pub authorization: Option<String>,
    pub transaction: Option<TransactionId>,
    pub granted_at: DateTime<Utc>,
    /// `None` for transaction locks.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Lock bookkeeping a feature store consults before writing.
pub trait LockingManager: Send + Sync {
    /// Whether any unexpired lock is held under `authorization`.
    fn exists(&self, authorization: &str) -> bool;

    /// Drop every lock held under `authorization`. `false` when there was none.
    fn release(&self, authorization: &str, transaction: &Transaction) -> Result<bool>;

    /// Restart the lifetime of every lock held under `authorization`.
    /// `false` when there was none.
    fn refresh(&self, authorization: &str, transaction: &Transaction) -> Result<bool>;

    /// Lock one feature.
    ///
    /// Re-locking under the same authorization (or the same transaction for
    /// [`FeatureLock::TRANSACTION`]) is not an error. A lock held by anyone
    /// else fails with `LockConflict` and is left untouched.
    fn lock_feature_id(
        &self,
        type_name: &str,
        feature_id: &FeatureId,
        transaction: &Transaction,
        lock: &FeatureLock,
    ) -> Result<LockOutcome>;

    /// Unlock one feature the transaction is authorized for. Unlocking a
    /// feature that is not locked is a no-op.
    fn unlock_feature_id(
        &self,
        type_name: &str,
        feature_id: &FeatureId,
        transaction: &Transaction,
        lock: &FeatureLock,
    ) -> Result<()>;

    fn is_locked(&self, type_name: &str, feature_id: &FeatureId) -> bool;

    /// Fail with `Unauthorized` if the feature is locked and `transaction`
    /// may not write it.
    fn assert_access(
        &self,
        type_name: &str,
        feature_id: &FeatureId,
        transaction: &Transaction,
    ) -> Result<()>;

    fn lock_info(&self, type_name: &str, feature_id: &FeatureId) -> Option<LockInfo>;
}

#[derive(Debug, Clone)]
enum Holder {
    Timed {
        authorization: String,
        ttl: Duration,
        since: Instant,
    },
    Transaction(TransactionId),
}

#[derive(Debug, Clone)]
struct HeldLock {
    holder: Holder,
    granted_at: DateTime<Utc>,
}

impl HeldLock {
    fn is_expired(&self) -> bool {
        match &self.holder {
            Holder::Timed { ttl, since, .. } => since.elapsed() > *ttl,
            Holder::Transaction(_) => false,
        }
    }

    fn authorization(&self) -> Option<&str> {
        match &self.holder {
            Holder::Timed { authorization, .. } => Some(authorization),
            Holder::Transaction(_) => None,
        }
    }

    /// Whether `transaction` may write or unlock the locked feature.
    fn is_authorized(&self, transaction: &Transaction) -> bool {
        match &self.holder {
            Holder::Timed { authorization, .. } => {
                !transaction.is_auto_commit() && transaction.has_authorization(authorization)
            }
            Holder::Transaction(id) => *id == transaction.id(),
        }
    }

    fn info(&self, type_name: &str, feature_id: &FeatureId) -> LockInfo {
        let (authorization, transaction, expires_at) = match &self.holder {
            Holder::Timed {
                authorization,
                ttl,
                since,
            } => {
                let remaining = ttl.saturating_sub(since.elapsed());
                let expires = chrono::Duration::from_std(remaining)
                    .ok()
                    .and_then(|d| Utc::now().checked_add_signed(d));
                (Some(authorization.clone()), None, expires)
            }
            Holder::Transaction(id) => (None, Some(*id), None),
        };
        LockInfo {
            type_name: type_name.to_string(),
            feature_id: feature_id.clone(),
            authorization,
            transaction,
            granted_at: self.granted_at,
            expires_at,
        }
    }
}

/// type name -> feature id -> lock
#[derive(Debug, Default)]
struct LockTable {
    types: BTreeMap<String, BTreeMap<FeatureId, HeldLock>>,
}

impl LockTable {
    /// The live lock on a feature, purging it first if it expired.
    fn get(&mut self, type_name: &str, feature_id: &FeatureId) -> Option<&HeldLock> {
        let locks = self.types.get_mut(type_name)?;
        if locks.get(feature_id).map_or(false, HeldLock::is_expired) {
            debug!(type_name, feature_id = %feature_id, "lock expired");
            locks.remove(feature_id);
        }
        locks.get(feature_id)
    }

    fn purge_expired(&mut self) {
        for locks in self.types.values_mut() {
            locks.retain(|_, lock| !lock.is_expired());
        }
        self.types.retain(|_, locks| !locks.is_empty());
    }

    fn release_transaction(&mut self, transaction: TransactionId) -> usize {
        let mut released = 0;
        for locks in self.types.values_mut() {
            let before = locks.len();
            locks.retain(|_, lock| !matches!(lock.holder, Holder::Transaction(id) if id == transaction));
            released += before - locks.len();
        }
        self.types.retain(|_, locks| !locks.is_empty());
        released
    }
}

static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Lock manager keeping its table in process memory
///
/// Timed locks expire on their own and are purged lazily: a lookup that
/// finds an expired lock treats it as absent. Transaction locks are tied
/// to a [`State`] the manager attaches to the locking transaction.
///
/// # Example
///
/// ```ignore
/// let manager = InProcessLockingManager::new();
/// let lock = FeatureLock::timed("token", 60_000);
/// manager.lock_feature_id("road", &"road.1".into(), &Transaction::AUTO_COMMIT, &lock)?;
/// assert!(manager.exists("token"));
/// ```
pub struct InProcessLockingManager {
    id: u64,
    table: Arc<Mutex<LockTable>>,
}

impl InProcessLockingManager {
    pub fn new() -> Self {
        Self {
            id: NEXT_MANAGER_ID.fetch_add(1, Ordering::Relaxed),
            table: Arc::new(Mutex::new(LockTable::default())),
        }
    }

    fn state_key(&self) -> StateKey {
        StateKey::new(format!("lock-manager:{}", self.id))
    }

    /// Make sure the transaction releases this manager's locks when it ends.
    fn attach_state(&self, transaction: &Transaction) -> Result<()> {
        let key = self.state_key();
        if transaction.state(&key).is_some() {
            return Ok(());
        }
        let state = Arc::new(TransactionLockState {
            table: self.table.clone(),
            transaction: transaction.id(),
        });
        transaction.put_state(key, state)
    }

    /// Number of live locks across every type.
    pub fn len(&self) -> usize {
        let mut table = self.table.lock();
        table.purge_expired();
        table.types.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn conflict(type_name: &str, feature_id: &FeatureId) -> GeoAccessError {
        observe::record_lock("conflict");
        GeoAccessError::LockConflict {
            type_name: type_name.to_string(),
            feature_id: feature_id.to_string(),
        }
    }
}

impl Default for InProcessLockingManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LockingManager for InProcessLockingManager {
    fn exists(&self, authorization: &str) -> bool {
        let mut table = self.table.lock();
        table.purge_expired();
        table
            .types
            .values()
            .flat_map(BTreeMap::values)
            .any(|lock| lock.authorization() == Some(authorization))
    }

    fn release(&self, authorization: &str, transaction: &Transaction) -> Result<bool> {
        let mut table = self.table.lock();
        table.purge_expired();
        let mut released = 0;
        for locks in table.types.values_mut() {
            let before = locks.len();
            locks.retain(|_, lock| lock.authorization() != Some(authorization));
            released += before - locks.len();
        }
        table.types.retain(|_, locks| !locks.is_empty());
        debug!(
            authorization,
            transaction = %transaction.id(),
            released,
            "released locks"
        );
        Ok(released > 0)
    }

    fn refresh(&self, authorization: &str, transaction: &Transaction) -> Result<bool> {
        let mut table = self.table.lock();
        table.purge_expired();
        let now = Instant::now();
        let mut refreshed = 0;
        for lock in table.types.values_mut().flat_map(BTreeMap::values_mut) {
            if let Holder::Timed {
                authorization: held,
                since,
                ..
            } = &mut lock.holder
            {
                if held.as_str() == authorization {
                    *since = now;
                    refreshed += 1;
                }
            }
        }
        debug!(
            authorization,
            transaction = %transaction.id(),
            refreshed,
            "refreshed locks"
        );
        Ok(refreshed > 0)
    }

    fn lock_feature_id(
        &self,
        type_name: &str,
        feature_id: &FeatureId,
        transaction: &Transaction,
        lock: &FeatureLock,
    ) -> Result<LockOutcome> {
        let holder = match lock.duration() {
            LockDuration::Transaction => {
                if transaction.is_auto_commit() {
                    return Err(GeoAccessError::InvalidArgument(
                        "transaction locks need a transaction other than AUTO_COMMIT".into(),
                    ));
                }
                if transaction.is_closed() {
                    return Err(GeoAccessError::Unsupported(format!(
                        "lock on closed transaction {}",
                        transaction.id()
                    )));
                }
                self.attach_state(transaction)?;
                Holder::Transaction(transaction.id())
            }
            LockDuration::Millis(ms) => Holder::Timed {
                authorization: lock.authorization().to_string(),
                ttl: Duration::from_millis(ms),
                since: Instant::now(),
            },
        };

        let mut table = self.table.lock();
        if let Some(existing) = table.get(type_name, feature_id) {
            let same_holder = match (&existing.holder, &holder) {
                (Holder::Timed { authorization: a, .. }, Holder::Timed { authorization: b, .. }) => {
                    a == b
                }
                (Holder::Transaction(a), Holder::Transaction(b)) => a == b,
                // Mixed kinds: the caller must already be allowed to write.
                _ => existing.is_authorized(transaction),
            };
            if !same_holder {
                return Err(Self::conflict(type_name, feature_id));
            }
            observe::record_lock(LockOutcome::AlreadyHeld.as_str());
            return Ok(LockOutcome::AlreadyHeld);
        }

        table
            .types
            .entry(type_name.to_string())
            .or_default()
            .insert(
                feature_id.clone(),
                HeldLock {
                    holder,
                    granted_at: Utc::now(),
                },
            );
        debug!(type_name, feature_id = %feature_id, lock = %lock, "lock granted");
        observe::record_lock(LockOutcome::Acquired.as_str());
        Ok(LockOutcome::Acquired)
    }

    fn unlock_feature_id(
        &self,
        type_name: &str,
        feature_id: &FeatureId,
        transaction: &Transaction,
        _lock: &FeatureLock,
    ) -> Result<()> {
        if transaction.is_auto_commit() {
            return Err(GeoAccessError::Unsupported(
                "unlock requires a transaction holding the authorization".into(),
            ));
        }
        let mut table = self.table.lock();
        let Some(existing) = table.get(type_name, feature_id) else {
            return Ok(());
        };
        if !existing.is_authorized(transaction) {
            return Err(GeoAccessError::Unauthorized {
                type_name: type_name.to_string(),
                feature_id: feature_id.to_string(),
            });
        }
        if let Some(locks) = table.types.get_mut(type_name) {
            locks.remove(feature_id);
        }
        debug!(type_name, feature_id = %feature_id, "lock released");
        Ok(())
    }

    fn is_locked(&self, type_name: &str, feature_id: &FeatureId) -> bool {
        self.table.lock().get(type_name, feature_id).is_some()
    }

    fn assert_access(
        &self,
        type_name: &str,
        feature_id: &FeatureId,
        transaction: &Transaction,
    ) -> Result<()> {
        match self.table.lock().get(type_name, feature_id) {
            Some(lock) if !lock.is_authorized(transaction) => Err(GeoAccessError::Unauthorized {
                type_name: type_name.to_string(),
                feature_id: feature_id.to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn lock_info(&self, type_name: &str, feature_id: &FeatureId) -> Option<LockInfo> {
        self.table
            .lock()
            .get(type_name, feature_id)
            .map(|lock| lock.info(type_name, feature_id))
    }
}

/// Releases a transaction's locks when it commits, rolls back or closes.
struct TransactionLockState {
    table: Arc<Mutex<LockTable>>,
    transaction: TransactionId,
}

impl TransactionLockState {
    fn release(&self, reason: &str) {
        let released = self.table.lock().release_transaction(self.transaction);
        if released > 0 {
            debug!(transaction = %self.transaction, released, "{}: transaction locks released", reason);
        }
    }
}

impl State for TransactionLockState {
    fn set_transaction(&self, transaction: Option<&Transaction>) -> Result<()> {
        if transaction.is_none() {
            self.release("detach");
        }
        Ok(())
    }

    fn add_authorization(&self, _authorization: &str) -> Result<()> {
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.release("commit");
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.release("rollback");
        Ok(())
    }
}
