//! Low-level cursors over features.
//!
//! A [`FeatureReader`] is a single-use, forward-only sequence. It cannot be
//! restarted or skipped; paging belongs to [`Query::start_index`]. Readers
//! release their resources when dropped, so scoped ownership is enough to
//! guarantee closing on every exit path.
//!
//! [`Query::start_index`]: crate::query::Query::start_index

mod emulate;

pub use emulate::{apply_query, NativeSupport};

use crate::error::Result;
use crate::types::{Envelope, Feature, FeatureType};

pub trait FeatureReader: Send {
    fn schema(&self) -> &FeatureType;

    /// The next feature, or `None` once the sequence is exhausted.
    fn next_feature(&mut self) -> Result<Option<Feature>>;

    /// Release backend resources early. Idempotent; also runs on drop for
    /// readers holding anything worth releasing.
    fn close(&mut self) {}
}

impl<R: FeatureReader + ?Sized> FeatureReader for Box<R> {
    fn schema(&self) -> &FeatureType {
        (**self).schema()
    }

    fn next_feature(&mut self) -> Result<Option<Feature>> {
        (**self).next_feature()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

pub type BoxFeatureReader = Box<dyn FeatureReader>;

/// Iterator over a reader. Stops after the first error and closes the
/// reader once the sequence ends.
pub struct ReaderIter<R: FeatureReader> {
    reader: R,
    done: bool,
}

impl<R: FeatureReader> ReaderIter<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: FeatureReader> Iterator for ReaderIter<R> {
    type Item = Result<Feature>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_feature() {
            Ok(Some(feature)) => Some(Ok(feature)),
            Ok(None) => {
                self.done = true;
                self.reader.close();
                None
            }
            Err(e) => {
                self.done = true;
                self.reader.close();
                Some(Err(e))
            }
        }
    }
}

/// Drain a reader into memory.
pub fn read_all<R: FeatureReader>(reader: R) -> Result<Vec<Feature>> {
    ReaderIter::new(reader).collect()
}

/// Count the features a reader yields.
pub fn count_all<R: FeatureReader>(reader: R) -> Result<usize> {
    let mut count = 0;
    for feature in ReaderIter::new(reader) {
        feature?;
        count += 1;
    }
    Ok(count)
}

/// Union of the bounds of every feature a reader yields.
pub fn bounds_all<R: FeatureReader>(reader: R) -> Result<Option<Envelope>> {
    let mut bounds = None;
    for feature in ReaderIter::new(reader) {
        bounds = Envelope::merge(bounds, feature?.bounds());
    }
    Ok(bounds)
}

/// Reader over features already in memory.
pub struct VecFeatureReader {
    schema: FeatureType,
    features: std::vec::IntoIter<Feature>,
}

impl VecFeatureReader {
    pub fn new(schema: FeatureType, features: Vec<Feature>) -> Self {
        Self {
            schema,
            features: features.into_iter(),
        }
    }
}

impl FeatureReader for VecFeatureReader {
    fn schema(&self) -> &FeatureType {
        &self.schema
    }

    fn next_feature(&mut self) -> Result<Option<Feature>> {
        Ok(self.features.next())
    }

    fn close(&mut self) {
        self.features = Vec::new().into_iter();
    }
}

/// Cursor for modifying features in place, or appending new ones.
///
/// Usage: `has_next` then `next_feature`, edit the returned feature, then
/// either `write` it back or `remove` it. In append mode `has_next` is
/// always false and `next_feature` hands out a blank feature to fill in.
pub trait FeatureWriter: Send {
    fn schema(&self) -> &FeatureType;

    fn has_next(&mut self) -> Result<bool>;

    fn next_feature(&mut self) -> Result<&mut Feature>;

    /// Store the current feature.
    fn write(&mut self) -> Result<()>;

    /// Delete the current feature.
    fn remove(&mut self) -> Result<()>;

    /// Flush pending changes and release the cursor.
    fn close(&mut self) -> Result<()>;
}

pub type BoxFeatureWriter = Box<dyn FeatureWriter>;
