use crate::entry::Entry;
use geoaccess_core::{GeoAccessError, Result, State, Transaction, TransactionId, WeakTransaction};
use std::sync::Arc;

/// Ties one entry's pending diff and listeners to the transaction that
/// owns them.
pub(crate) struct DiffState {
    entry: Arc<Entry>,
    id: TransactionId,
    transaction: WeakTransaction,
}

impl DiffState {
    pub(crate) fn new(entry: Arc<Entry>, transaction: &Transaction) -> Self {
        Self {
            entry,
            id: transaction.id(),
            transaction: transaction.downgrade(),
        }
    }
}

impl State for DiffState {
    fn set_transaction(&self, transaction: Option<&Transaction>) -> Result<()> {
        if transaction.is_none() {
            self.entry.discard(self.id);
            self.entry.listeners().remove_transaction(self.id);
        }
        Ok(())
    }

    fn add_authorization(&self, _authorization: &str) -> Result<()> {
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let transaction = self.transaction.upgrade().ok_or_else(|| {
            GeoAccessError::Unsupported(format!("transaction {} is gone", self.id))
        })?;
        self.entry.commit(&transaction)
    }

    fn rollback(&self) -> Result<()> {
        self.entry.rollback(self.id);
        Ok(())
    }
}
