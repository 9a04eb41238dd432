//! Lazy feature collections.

use crate::error::Result;
use crate::filter::Filter;
use crate::query::{Query, SortBy};
use crate::reader::{bounds_all, count_all, read_all, BoxFeatureReader, FeatureReader, ReaderIter};
use crate::types::{Envelope, Feature, FeatureType};
use std::fmt;
use std::sync::Arc;

/// What a [`FeatureCollection`] needs from the backend behind it.
pub trait CollectionBackend: Send + Sync {
    fn schema(&self, query: &Query) -> Result<FeatureType>;

    fn reader(&self, query: &Query) -> Result<BoxFeatureReader>;

    /// `None` when the backend cannot answer cheaply.
    fn bounds(&self, _query: &Query) -> Result<Option<Envelope>> {
        Ok(None)
    }

    /// `None` when the backend cannot answer cheaply.
    fn count(&self, _query: &Query) -> Result<Option<usize>> {
        Ok(None)
    }
}

/// A query bound to a backend. Nothing is read until the collection is
/// traversed, and every traversal opens a fresh reader.
#[derive(Clone)]
pub struct FeatureCollection {
    backend: Arc<dyn CollectionBackend>,
    query: Query,
}

impl FeatureCollection {
    pub fn new(backend: Arc<dyn CollectionBackend>, query: Query) -> Self {
        Self { backend, query }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn schema(&self) -> Result<FeatureType> {
        self.backend.schema(&self.query)
    }

    pub fn reader(&self) -> Result<BoxFeatureReader> {
        self.backend.reader(&self.query)
    }

    pub fn iter(&self) -> Result<ReaderIter<BoxFeatureReader>> {
        Ok(ReaderIter::new(self.reader()?))
    }

    pub fn to_vec(&self) -> Result<Vec<Feature>> {
        read_all(self.reader()?)
    }

    /// Exact count, traversing the features if the backend does not know.
    pub fn count(&self) -> Result<usize> {
        match self.backend.count(&self.query)? {
            Some(n) => Ok(n),
            None => count_all(self.reader()?),
        }
    }

    /// Bounds, traversing the features if the backend does not know.
    pub fn bounds(&self) -> Result<Option<Envelope>> {
        match self.backend.bounds(&self.query)? {
            Some(b) => Ok(Some(b)),
            None => bounds_all(self.reader()?),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        let mut reader = self.reader()?;
        Ok(reader.next_feature()?.is_none())
    }

    /// The features of this collection that also match `filter`.
    pub fn subcollection(&self, filter: Filter) -> FeatureCollection {
        let combined = self.query.filter().clone().and(filter);
        self.derive(self.query.to_builder().filter(combined).build())
    }

    /// This collection ordered by `sort_by`.
    pub fn sorted(&self, sort_by: Vec<SortBy>) -> FeatureCollection {
        self.derive(self.query.to_builder().sort_by(sort_by).build())
    }

    fn derive(&self, query: Query) -> FeatureCollection {
        FeatureCollection {
            backend: self.backend.clone(),
            query,
        }
    }
}

impl fmt::Debug for FeatureCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureCollection")
            .field("query", &self.query.to_string())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{apply_query, NativeSupport, VecFeatureReader};
    use crate::types::Geometry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers nothing natively and counts reader opens.
    struct Fixture {
        features: Vec<Feature>,
        opened: AtomicUsize,
    }

    impl CollectionBackend for Fixture {
        fn schema(&self, _query: &Query) -> Result<FeatureType> {
            Ok(FeatureType::new("road"))
        }

        fn reader(&self, query: &Query) -> Result<BoxFeatureReader> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let base = Box::new(VecFeatureReader::new(
                FeatureType::new("road"),
                self.features.clone(),
            ));
            apply_query(base, query, NativeSupport::NONE)
        }
    }

    fn fixture() -> Arc<Fixture> {
        Arc::new(Fixture {
            features: vec![
                Feature::new("road.2")
                    .with("lanes", 2)
                    .with("geom", Geometry::point(5.0, 5.0)),
                Feature::new("road.1")
                    .with("lanes", 4)
                    .with("geom", Geometry::point(1.0, 1.0)),
            ],
            opened: AtomicUsize::new(0),
        })
    }

    #[test]
    fn test_lazy_until_traversed() {
        let backend = fixture();
        let collection = FeatureCollection::new(backend.clone(), Query::ALL);
        assert_eq!(backend.opened.load(Ordering::SeqCst), 0);
        assert_eq!(collection.to_vec().unwrap().len(), 2);
        assert_eq!(backend.opened.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_count_and_bounds_fall_back_to_traversal() {
        let collection = FeatureCollection::new(fixture(), Query::ALL);
        assert_eq!(collection.count().unwrap(), 2);
        assert_eq!(
            collection.bounds().unwrap(),
            Some(Envelope::new(1.0, 1.0, 5.0, 5.0))
        );
    }

    #[test]
    fn test_subcollection_and_sorted() {
        let collection = FeatureCollection::new(fixture(), Query::ALL);
        let wide = collection.subcollection(Filter::compare(
            "lanes",
            crate::filter::CompareOp::Gt,
            3,
        ));
        assert_eq!(wide.count().unwrap(), 1);
        assert!(Query::ALL.filter().is_include());

        let ids: Vec<String> = collection
            .sorted(vec![SortBy::Natural])
            .iter()
            .unwrap()
            .map(|f| f.unwrap().id().to_string())
            .collect();
        assert_eq!(ids, vec!["road.1", "road.2"]);
        assert!(!collection.is_empty().unwrap());
    }
}
