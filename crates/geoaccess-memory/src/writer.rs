use crate::entry::Entry;
use geoaccess_core::{
    Feature, FeatureType, FeatureWriter, Filter, GeoAccessError, Result, Transaction,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// Cursor over a snapshot of matching features, or an append cursor
/// handing out blank features with reserved ids.
///
/// Every `write` and `remove` goes straight through the owning transaction,
/// so listeners see each change as it happens.
pub struct MemoryFeatureWriter {
    entry: Arc<Entry>,
    transaction: Transaction,
    pending: VecDeque<Feature>,
    current: Option<Feature>,
    current_is_new: bool,
    closed: bool,
}

impl MemoryFeatureWriter {
    pub(crate) fn updating(entry: Arc<Entry>, transaction: Transaction, filter: &Filter) -> Self {
        let pending = entry.matching(transaction.id(), filter).into();
        Self::with_pending(entry, transaction, pending)
    }

    pub(crate) fn appending(entry: Arc<Entry>, transaction: Transaction) -> Self {
        Self::with_pending(entry, transaction, VecDeque::new())
    }

    fn with_pending(entry: Arc<Entry>, transaction: Transaction, pending: VecDeque<Feature>) -> Self {
        Self {
            entry,
            transaction,
            pending,
            current: None,
            current_is_new: false,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(GeoAccessError::Unsupported(format!(
                "writer on {} is closed",
                self.entry.type_name()
            )));
        }
        Ok(())
    }

    fn take_current(&mut self, operation: &str) -> Result<Feature> {
        self.ensure_open()?;
        self.current.take().ok_or_else(|| {
            GeoAccessError::InvalidArgument(format!(
                "{} called before next_feature on {}",
                operation,
                self.entry.type_name()
            ))
        })
    }
}

impl FeatureWriter for MemoryFeatureWriter {
    fn schema(&self) -> &FeatureType {
        self.entry.schema()
    }

    fn has_next(&mut self) -> Result<bool> {
        self.ensure_open()?;
        Ok(!self.pending.is_empty())
    }

    /// Unwritten edits to the previous feature are dropped.
    fn next_feature(&mut self) -> Result<&mut Feature> {
        self.ensure_open()?;
        let (feature, is_new) = match self.pending.pop_front() {
            Some(feature) => (feature, false),
            None => (Feature::new(self.entry.reserve_fid()), true),
        };
        self.current_is_new = is_new;
        Ok(self.current.insert(feature))
    }

    fn write(&mut self) -> Result<()> {
        let feature = self.take_current("write")?;
        if self.current_is_new {
            self.entry
                .insert(&self.transaction, vec![feature.with_provided_id()], true)?;
        } else {
            self.entry.update(&self.transaction, feature)?;
        }
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        let feature = self.take_current("remove")?;
        if !self.current_is_new {
            self.entry
                .remove(&self.transaction, &Filter::ids([feature.id().clone()]))?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.pending.clear();
        self.current = None;
        Ok(())
    }
}

impl Drop for MemoryFeatureWriter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
