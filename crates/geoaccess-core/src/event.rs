//! Change notification.
//!
//! A listener is bound to the transaction its source was using when the
//! listener was registered. Delivery follows the isolation rules:
//!
//! * a write through AUTO_COMMIT reaches every listener;
//! * a write through a transaction reaches only listeners bound to that
//!   transaction;
//! * a commit reaches every listener bound to another transaction, once;
//! * a rollback reaches listeners bound to the rolled back transaction.

use crate::filter::Filter;
use crate::observe;
use crate::transaction::TransactionId;
use crate::types::{Envelope, Name};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureEventType {
    Added,
    Changed,
    Removed,
    Committed,
    RolledBack,
}

impl FeatureEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureEventType::Added => "added",
            FeatureEventType::Changed => "changed",
            FeatureEventType::Removed => "removed",
            FeatureEventType::Committed => "committed",
            FeatureEventType::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for FeatureEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEvent {
    kind: FeatureEventType,
    type_name: Name,
    /// Transaction the change happened in.
    transaction: TransactionId,
    /// Affected area, when known.
    bounds: Option<Envelope>,
    /// Affected features; `Include` when unknown.
    filter: Filter,
}

impl FeatureEvent {
    pub fn new(
        kind: FeatureEventType,
        type_name: Name,
        transaction: TransactionId,
        bounds: Option<Envelope>,
        filter: Filter,
    ) -> Self {
        Self {
            kind,
            type_name,
            transaction,
            bounds,
            filter,
        }
    }

    pub fn kind(&self) -> FeatureEventType {
        self.kind
    }

    pub fn type_name(&self) -> &Name {
        &self.type_name
    }

    pub fn transaction(&self) -> TransactionId {
        self.transaction
    }

    pub fn bounds(&self) -> Option<&Envelope> {
        self.bounds.as_ref()
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }
}

impl fmt::Display for FeatureEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} in {} [{}]",
            self.type_name, self.kind, self.transaction, self.filter
        )
    }
}

/// Receives change events.
pub trait FeatureListener: Send + Sync {
    fn changed(&self, event: &FeatureEvent);
}

impl<F> FeatureListener for F
where
    F: Fn(&FeatureEvent) + Send + Sync,
{
    fn changed(&self, event: &FeatureEvent) {
        self(event)
    }
}

/// Listeners of one resource, each bound to a transaction.
#[derive(Default)]
pub struct ListenerRegistry {
    entries: Mutex<Vec<(TransactionId, Arc<dyn FeatureListener>)>>,
}

fn same_listener(a: &Arc<dyn FeatureListener>, b: &Arc<dyn FeatureListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `listener` to `transaction`. Registering the same listener on
    /// the same transaction twice has no effect.
    pub fn add(&self, transaction: TransactionId, listener: Arc<dyn FeatureListener>) {
        let mut entries = self.entries.lock();
        if entries
            .iter()
            .any(|(t, l)| *t == transaction && same_listener(l, &listener))
        {
            return;
        }
        entries.push((transaction, listener));
    }

    /// Remove every binding of `listener`. Returns whether any existed.
    pub fn remove(&self, listener: &Arc<dyn FeatureListener>) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(_, l)| !same_listener(l, listener));
        entries.len() != before
    }

    /// Drop every listener bound to `transaction`.
    pub fn remove_transaction(&self, transaction: TransactionId) {
        self.entries.lock().retain(|(t, _)| *t != transaction);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver to the listeners selected by `include`, with no lock held.
    fn fire<P>(&self, event: &FeatureEvent, include: P) -> usize
    where
        P: Fn(TransactionId) -> bool,
    {
        let targets: Vec<Arc<dyn FeatureListener>> = self
            .entries
            .lock()
            .iter()
            .filter(|(t, _)| include(*t))
            .map(|(_, l)| l.clone())
            .collect();
        for listener in &targets {
            listener.changed(event);
        }
        observe::record_event(event.kind().as_str(), targets.len());
        debug!(event = %event, listeners = targets.len(), "event dispatched");
        targets.len()
    }

    pub fn fire_all(&self, event: &FeatureEvent) -> usize {
        self.fire(event, |_| true)
    }

    pub fn fire_same(&self, transaction: TransactionId, event: &FeatureEvent) -> usize {
        self.fire(event, |t| t == transaction)
    }

    pub fn fire_others(&self, transaction: TransactionId, event: &FeatureEvent) -> usize {
        self.fire(event, |t| t != transaction)
    }

    /// An add, change or remove made through `event.transaction()`.
    pub fn notify_change(&self, event: &FeatureEvent) -> usize {
        let transaction = event.transaction();
        if transaction.is_auto_commit() {
            self.fire_all(event)
        } else {
            self.fire_same(transaction, event)
        }
    }

    /// Changes made in `event.transaction()` became visible to everyone else.
    pub fn notify_commit(&self, event: &FeatureEvent) -> usize {
        self.fire_others(event.transaction(), event)
    }

    /// Changes made in `event.transaction()` were discarded.
    pub fn notify_rollback(&self, event: &FeatureEvent) -> usize {
        self.fire_same(event.transaction(), event)
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}
