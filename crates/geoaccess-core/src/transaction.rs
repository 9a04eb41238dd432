//! Units of work shared by feature stores.
//!
//! A [`Transaction`] is a cheap clonable handle. Backends park their
//! per-session resources in it as [`State`] objects under a [`StateKey`];
//! `commit` and `rollback` are broadcast to every attached state.
//! [`Transaction::AUTO_COMMIT`] stands for "no session": writes through it
//! apply immediately and it refuses to hold state.

use crate::error::{GeoAccessError, Result};
use crate::observe;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;
use tracing::{debug, warn};

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique transaction identity. `0` is AUTO_COMMIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    pub const AUTO_COMMIT: TransactionId = TransactionId(0);

    fn next() -> Self {
        TransactionId(NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_auto_commit(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_auto_commit() {
            f.write_str("AUTO_COMMIT")
        } else {
            write!(f, "txn-{}", self.0)
        }
    }
}

/// Registry key for a [`State`]; backends pick a key naming themselves and
/// the resource the state belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey(String);

impl StateKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Backend resource attached to a transaction.
///
/// Callbacks run without any transaction lock held, so a state may call
/// back into the transaction.
pub trait State: Send + Sync {
    /// `Some` when attached, `None` when detached or the transaction closes.
    fn set_transaction(&self, transaction: Option<&Transaction>) -> Result<()>;

    /// A new authorization token was added to the transaction.
    fn add_authorization(&self, authorization: &str) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;
}

#[derive(Default)]
struct Session {
    states: BTreeMap<StateKey, Arc<dyn State>>,
    properties: BTreeMap<String, serde_json::Value>,
    authorizations: BTreeSet<String>,
    closed: bool,
}

struct TransactionInner {
    id: TransactionId,
    handle: String,
    session: Mutex<Session>,
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        let session = self.session.get_mut();
        if session.closed {
            return;
        }
        warn!(
            transaction = %self.id,
            handle = %self.handle,
            "transaction dropped without close, releasing {} state(s)",
            session.states.len()
        );
        for (key, state) in std::mem::take(&mut session.states) {
            if let Err(e) = state.set_transaction(None) {
                warn!(key = %key, error = %e, "failed to release transaction state");
            }
        }
    }
}

#[derive(Clone)]
pub struct Transaction {
    inner: Option<Arc<TransactionInner>>,
}

impl Transaction {
    /// Apply every write immediately. Holds no state and no authorizations.
    pub const AUTO_COMMIT: Transaction = Transaction { inner: None };

    pub fn new() -> Self {
        Self::with_handle("")
    }

    pub fn with_handle(handle: impl Into<String>) -> Self {
        let id = TransactionId::next();
        let mut handle = handle.into();
        if handle.is_empty() {
            handle = id.to_string();
        }
        debug!(transaction = %id, handle = %handle, "transaction opened");
        Self {
            inner: Some(Arc::new(TransactionInner {
                id,
                handle,
                session: Mutex::new(Session::default()),
            })),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.inner
            .as_ref()
            .map_or(TransactionId::AUTO_COMMIT, |inner| inner.id)
    }

    pub fn is_auto_commit(&self) -> bool {
        self.inner.is_none()
    }

    /// A handle that does not keep the session alive. States attached to
    /// this transaction hold one of these instead of a clone.
    pub fn downgrade(&self) -> WeakTransaction {
        WeakTransaction {
            inner: self.inner.as_ref().map(Arc::downgrade),
        }
    }

    pub fn handle(&self) -> &str {
        self.inner
            .as_ref()
            .map_or("AUTO_COMMIT", |inner| inner.handle.as_str())
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .as_ref()
            .map_or(false, |inner| inner.session.lock().closed)
    }

    /// The open session, or the error a mutator on this transaction reports.
    fn open(&self, operation: &str) -> Result<&TransactionInner> {
        let inner = self.inner.as_deref().ok_or_else(|| {
            GeoAccessError::Unsupported(format!("{} on AUTO_COMMIT", operation))
        })?;
        if inner.session.lock().closed {
            return Err(GeoAccessError::Unsupported(format!(
                "{} on closed transaction {}",
                operation, inner.id
            )));
        }
        Ok(inner)
    }

    /// Attach `state` under `key` and hand it this transaction.
    pub fn put_state(&self, key: StateKey, state: Arc<dyn State>) -> Result<()> {
        let inner = self.open("put_state")?;
        {
            let mut session = inner.session.lock();
            if session.states.contains_key(&key) {
                return Err(GeoAccessError::InvalidArgument(format!(
                    "transaction {} already holds state for {}",
                    inner.id, key
                )));
            }
            session.states.insert(key.clone(), state.clone());
        }
        if let Err(e) = state.set_transaction(Some(self)) {
            inner.session.lock().states.remove(&key);
            return Err(e);
        }
        debug!(transaction = %inner.id, key = %key, "state attached");
        Ok(())
    }

    /// Detach the state under `key`, telling it the transaction is gone.
    pub fn remove_state(&self, key: &StateKey) -> Result<()> {
        let inner = self.open("remove_state")?;
        let state = inner.session.lock().states.remove(key).ok_or_else(|| {
            GeoAccessError::InvalidArgument(format!(
                "transaction {} holds no state for {}",
                inner.id, key
            ))
        })?;
        debug!(transaction = %inner.id, key = %key, "state detached");
        state.set_transaction(None)
    }

    pub fn state(&self, key: &StateKey) -> Option<Arc<dyn State>> {
        self.inner
            .as_ref()
            .and_then(|inner| inner.session.lock().states.get(key).cloned())
    }

    pub fn put_property(&self, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
        let inner = self.open("put_property")?;
        inner.session.lock().properties.insert(key.into(), value);
        Ok(())
    }

    pub fn property(&self, key: &str) -> Option<serde_json::Value> {
        self.inner
            .as_ref()
            .and_then(|inner| inner.session.lock().properties.get(key).cloned())
    }

    /// Record a lock authorization and pass it to every attached state.
    pub fn add_authorization(&self, authorization: impl Into<String>) -> Result<()> {
        let inner = self.open("add_authorization")?;
        let authorization = authorization.into();
        let states = {
            let mut session = inner.session.lock();
            session.authorizations.insert(authorization.clone());
            snapshot(&session)
        };
        for state in states {
            state.add_authorization(&authorization)?;
        }
        Ok(())
    }

    pub fn authorizations(&self) -> BTreeSet<String> {
        self.inner
            .as_ref()
            .map(|inner| inner.session.lock().authorizations.clone())
            .unwrap_or_default()
    }

    pub fn has_authorization(&self, authorization: &str) -> bool {
        self.inner.as_ref().map_or(false, |inner| {
            inner.session.lock().authorizations.contains(authorization)
        })
    }

    /// Commit every attached state. A no-op on AUTO_COMMIT.
    pub fn commit(&self) -> Result<()> {
        if self.is_auto_commit() {
            return Ok(());
        }
        let start = Instant::now();
        let result = self.broadcast("commit", |state| state.commit());
        observe::record_commit(start.elapsed(), result.is_ok());
        result
    }

    /// Roll back every attached state.
    pub fn rollback(&self) -> Result<()> {
        let start = Instant::now();
        let result = self.broadcast("rollback", |state| state.rollback());
        observe::record_rollback(start.elapsed(), result.is_ok());
        result
    }

    /// Run `f` on every state, then clear authorizations. Every state gets
    /// its callback even after a failure; the first failure is reported.
    fn broadcast<F>(&self, operation: &str, f: F) -> Result<()>
    where
        F: Fn(&dyn State) -> Result<()>,
    {
        let inner = self.open(operation)?;
        let states = snapshot(&inner.session.lock());

        let mut failures = 0usize;
        let mut first: Option<GeoAccessError> = None;
        for state in &states {
            if let Err(e) = f(state.as_ref()) {
                failures += 1;
                first.get_or_insert(e);
            }
        }

        inner.session.lock().authorizations.clear();
        debug!(
            transaction = %inner.id,
            states = states.len(),
            failures,
            "{} finished",
            operation
        );

        match first {
            None => Ok(()),
            Some(cause) => Err(GeoAccessError::data_source(
                format!(
                    "{} of transaction {} failed for {} of {} state(s)",
                    operation,
                    inner.id,
                    failures,
                    states.len()
                ),
                cause,
            )),
        }
    }

    /// Detach every state and end the session. Idempotent; a no-op on
    /// AUTO_COMMIT. State release failures are logged, not returned.
    pub fn close(&self) -> Result<()> {
        let Some(inner) = self.inner.as_deref() else {
            return Ok(());
        };
        let states = {
            let mut session = inner.session.lock();
            if session.closed {
                return Ok(());
            }
            session.closed = true;
            session.properties.clear();
            session.authorizations.clear();
            std::mem::take(&mut session.states)
        };
        for (key, state) in states {
            if let Err(e) = state.set_transaction(None) {
                warn!(transaction = %inner.id, key = %key, error = %e, "failed to release state on close");
            }
        }
        debug!(transaction = %inner.id, "transaction closed");
        Ok(())
    }
}

/// Non-owning counterpart of [`Transaction`].
#[derive(Clone, Default)]
pub struct WeakTransaction {
    inner: Option<Weak<TransactionInner>>,
}

impl WeakTransaction {
    /// The transaction, if it is still alive. AUTO_COMMIT always is.
    pub fn upgrade(&self) -> Option<Transaction> {
        match &self.inner {
            None => Some(Transaction::AUTO_COMMIT),
            Some(weak) => weak.upgrade().map(|inner| Transaction { inner: Some(inner) }),
        }
    }
}

impl fmt::Debug for WeakTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakTransaction")
            .field("alive", &self.upgrade().is_some())
            .finish()
    }
}

fn snapshot(session: &Session) -> Vec<Arc<dyn State>> {
    session.states.values().cloned().collect()
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Transaction {}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id())
            .field("handle", &self.handle())
            .finish()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    /// Records every callback it receives.
    #[derive(Default)]
    struct RecordingState {
        log: Mutex<Vec<String>>,
        attached: Mutex<Option<Transaction>>,
        fail_commit: bool,
    }

    impl RecordingState {
        fn log(&self) -> Vec<String> {
            self.log.lock().clone()
        }
    }

    impl State for RecordingState {
        fn set_transaction(&self, transaction: Option<&Transaction>) -> Result<()> {
            let entry = match transaction {
                Some(t) => format!("attach {}", t.id()),
                None => "detach".to_string(),
            };
            self.log.lock().push(entry);
            *self.attached.lock() = transaction.cloned();
            Ok(())
        }

        fn add_authorization(&self, authorization: &str) -> Result<()> {
            self.log.lock().push(format!("auth {}", authorization));
            Ok(())
        }

        fn commit(&self) -> Result<()> {
            // Authorizations must still be visible during the callback.
            let auths = self
                .attached
                .lock()
                .as_ref()
                .map(|t| t.authorizations().len())
                .unwrap_or(0);
            self.log.lock().push(format!("commit auths={}", auths));
            if self.fail_commit {
                return Err(GeoAccessError::data_source_msg("boom"));
            }
            Ok(())
        }

        fn rollback(&self) -> Result<()> {
            self.log.lock().push("rollback".to_string());
            Ok(())
        }
    }

    #[test]
    fn test_put_and_remove_state_notify() {
        let txn = Transaction::new();
        let state = Arc::new(RecordingState::default());
        txn.put_state("a".into(), state.clone()).unwrap();
        assert!(txn.state(&"a".into()).is_some());
        assert!(txn.put_state("a".into(), state.clone()).is_err());

        txn.remove_state(&"a".into()).unwrap();
        assert!(txn.state(&"a".into()).is_none());
        assert!(txn.remove_state(&"a".into()).is_err());
        assert_eq!(state.log(), vec![format!("attach {}", txn.id()), "detach".into()]);
    }

    #[test]
    fn test_authorization_reaches_states_and_survives_callbacks() {
        let txn = Transaction::new();
        let state = Arc::new(RecordingState::default());
        txn.put_state("a".into(), state.clone()).unwrap();
        txn.add_authorization("token-1").unwrap();
        assert!(txn.has_authorization("token-1"));

        txn.commit().unwrap();
        assert!(txn.authorizations().is_empty());
        let log = state.log();
        assert_eq!(log[1], "auth token-1");
        assert_eq!(log[2], "commit auths=1");
        txn.close().unwrap();
    }

    #[test]
    fn test_commit_runs_every_state_and_reports_first_failure() {
        let txn = Transaction::new();
        let failing = Arc::new(RecordingState {
            fail_commit: true,
            ..Default::default()
        });
        let healthy = Arc::new(RecordingState::default());
        txn.put_state("a-failing".into(), failing.clone()).unwrap();
        txn.put_state("b-healthy".into(), healthy.clone()).unwrap();
        txn.add_authorization("t").unwrap();

        let err = txn.commit().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataSource);
        assert!(healthy.log().iter().any(|l| l.starts_with("commit")));
        assert!(txn.authorizations().is_empty());
        // States stay attached after commit.
        assert!(txn.state(&"b-healthy".into()).is_some());
        txn.close().unwrap();
    }

    #[test]
    fn test_close_detaches_and_blocks_reuse() {
        let txn = Transaction::with_handle("edit session");
        let state = Arc::new(RecordingState::default());
        txn.put_state("a".into(), state.clone()).unwrap();
        txn.put_property("user", serde_json::json!("ada")).unwrap();
        txn.close().unwrap();

        assert!(txn.is_closed());
        assert_eq!(state.log().last().map(String::as_str), Some("detach"));
        assert!(txn.property("user").is_none());
        assert!(txn.commit().is_err());
        assert!(txn.add_authorization("x").is_err());
        txn.close().unwrap();
        assert_eq!(txn.handle(), "edit session");
    }

    #[test]
    fn test_auto_commit_refuses_mutation() {
        let auto = Transaction::AUTO_COMMIT;
        let state = Arc::new(RecordingState::default());
        for err in [
            auto.put_state("a".into(), state.clone()).unwrap_err(),
            auto.add_authorization("t").unwrap_err(),
            auto.put_property("k", serde_json::json!(1)).unwrap_err(),
            auto.rollback().unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::Usage);
        }
        assert!(state.log().is_empty());
        assert!(auto.commit().is_ok());
        assert!(auto.close().is_ok());
        assert!(auto.authorizations().is_empty());
        assert!(!auto.is_closed());
        assert_eq!(auto.id(), TransactionId::AUTO_COMMIT);
    }

    #[test]
    fn test_drop_without_close_releases_state() {
        let state = Arc::new(RecordingState::default());
        {
            let txn = Transaction::new();
            txn.put_state("a".into(), state.clone()).unwrap();
            // Break the handle cycle the test state keeps.
            *state.attached.lock() = None;
        }
        assert_eq!(state.log().last().map(String::as_str), Some("detach"));
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Transaction::new();
        let b = Transaction::new();
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_weak_handle_does_not_keep_session_alive() {
        let txn = Transaction::new();
        let weak = txn.downgrade();
        assert_eq!(weak.upgrade(), Some(txn.clone()));
        drop(txn);
        assert!(weak.upgrade().is_none());
        assert_eq!(
            Transaction::AUTO_COMMIT.downgrade().upgrade(),
            Some(Transaction::AUTO_COMMIT)
        );
    }
}
