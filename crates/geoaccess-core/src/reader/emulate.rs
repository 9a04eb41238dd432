use super::{read_all, BoxFeatureReader, FeatureReader, VecFeatureReader};
use crate::error::Result;
use crate::filter::Filter;
use crate::query::{compare_features, Hints, Properties, Query, QueryCapabilities};
use crate::types::{Feature, FeatureType};

/// Which parts of a query the backend already applied to a reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeSupport {
    pub filter: bool,
    pub sort: bool,
    pub offset: bool,
    pub limit: bool,
    pub retype: bool,
}

impl NativeSupport {
    /// Nothing done natively.
    pub const NONE: NativeSupport = NativeSupport {
        filter: false,
        sort: false,
        offset: false,
        limit: false,
        retype: false,
    };

    /// Derive support from advertised capabilities. Filtering and retyping
    /// are not capabilities, so the caller states them.
    pub fn from_capabilities(
        caps: &QueryCapabilities,
        query: &Query,
        filter: bool,
        retype: bool,
    ) -> Self {
        let sort = caps.supports_sorting(query.sort_by());
        let offset = caps.offset_supported;
        Self {
            filter,
            sort,
            offset,
            limit: offset,
            retype,
        }
    }
}

/// Wrap `reader` with client-side filtering, sorting, offset, limit and
/// retyping for whatever `native` says the backend did not do.
///
/// Steps run in that order. Once one step is emulated every later step is
/// emulated too, since a backend's native paging applies to its own
/// ordering. Paging without an explicit sort orders by feature id so that
/// pages are stable.
pub fn apply_query(
    mut reader: BoxFeatureReader,
    query: &Query,
    native: NativeSupport,
) -> Result<BoxFeatureReader> {
    let mut in_order = true;

    in_order &= native.filter;
    if !native.filter && !query.filter().is_include() {
        reader = Box::new(FilteringReader {
            inner: reader,
            filter: query.filter().clone(),
        });
    }

    let paging = query.start_index().is_some();
    in_order &= native.sort;
    if !in_order && (!query.sort_by().is_empty() || paging) {
        let keys = query.sort_by().to_vec();
        let schema = reader.schema().clone();
        let mut features = read_all(reader)?;
        features.sort_by(|a, b| compare_features(&keys, a, b, paging));
        reader = Box::new(VecFeatureReader::new(schema, features));
    }

    in_order &= native.offset;
    if let Some(start) = query.start_index() {
        if !in_order && start > 0 {
            reader = Box::new(OffsetReader {
                inner: reader,
                skip: start,
            });
        }
    }

    in_order &= native.limit;
    if let Some(max) = query.max_features() {
        if !in_order {
            reader = Box::new(LimitReader {
                inner: reader,
                remaining: max,
            });
        }
    }

    if !native.retype {
        if let Properties::Only(names) = query.properties() {
            let names = projected_names(reader.schema(), names, query.hints());
            let schema = reader.schema().retype(&names)?;
            reader = Box::new(RetypingReader {
                inner: reader,
                schema,
                names,
            });
        }
    }

    Ok(reader)
}

/// Requested names, plus the required attributes when the hint asks for them.
fn projected_names(schema: &FeatureType, requested: &[String], hints: &Hints) -> Vec<String> {
    let mut names = requested.to_vec();
    if hints.flag(Hints::INCLUDE_MANDATORY_PROPS) {
        for descriptor in schema.attributes().iter().filter(|a| !a.nillable) {
            if !names.contains(&descriptor.name) {
                names.push(descriptor.name.clone());
            }
        }
    }
    names
}

struct FilteringReader {
    inner: BoxFeatureReader,
    filter: Filter,
}

impl FeatureReader for FilteringReader {
    fn schema(&self) -> &FeatureType {
        self.inner.schema()
    }

    fn next_feature(&mut self) -> Result<Option<Feature>> {
        while let Some(feature) = self.inner.next_feature()? {
            if self.filter.evaluate(&feature) {
                return Ok(Some(feature));
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.inner.close()
    }
}

struct OffsetReader {
    inner: BoxFeatureReader,
    skip: usize,
}

impl FeatureReader for OffsetReader {
    fn schema(&self) -> &FeatureType {
        self.inner.schema()
    }

    fn next_feature(&mut self) -> Result<Option<Feature>> {
        while self.skip > 0 {
            self.skip -= 1;
            if self.inner.next_feature()?.is_none() {
                self.skip = 0;
                return Ok(None);
            }
        }
        self.inner.next_feature()
    }

    fn close(&mut self) {
        self.inner.close()
    }
}

struct LimitReader {
    inner: BoxFeatureReader,
    remaining: usize,
}

impl FeatureReader for LimitReader {
    fn schema(&self) -> &FeatureType {
        self.inner.schema()
    }

    fn next_feature(&mut self) -> Result<Option<Feature>> {
        if self.remaining == 0 {
            self.inner.close();
            return Ok(None);
        }
        let next = self.inner.next_feature()?;
        if next.is_some() {
            self.remaining -= 1;
        }
        Ok(next)
    }

    fn close(&mut self) {
        self.inner.close()
    }
}

struct RetypingReader {
    inner: BoxFeatureReader,
    schema: FeatureType,
    names: Vec<String>,
}

impl FeatureReader for RetypingReader {
    fn schema(&self) -> &FeatureType {
        &self.schema
    }

    fn next_feature(&mut self) -> Result<Option<Feature>> {
        Ok(self.inner.next_feature()?.map(|mut feature| {
            feature.retain_attributes(&self.names);
            feature
        }))
    }

    fn close(&mut self) {
        self.inner.close()
    }
}
