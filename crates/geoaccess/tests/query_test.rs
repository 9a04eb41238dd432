//! Query answering through the in-memory store: projection, filtering,
//! sorting and paging, native or emulated.

use geoaccess::prelude::*;
use geoaccess::{ReaderIter, SortOrder, Version};

fn store(query: QueryConfig) -> MemoryDataStore {
    let store = MemoryDataStore::with_config(DataStoreConfig::new().with_query(query));
    store
        .create_schema(
            FeatureType::new("road")
                .attribute("geom", AttributeType::Geometry)
                .with_attribute(AttributeDescriptor::new("name", AttributeType::Text).required())
                .attribute("lanes", AttributeType::Int)
                .with_crs(Crs::new("EPSG:4326")),
        )
        .unwrap();
    let roads = [
        ("road.1", "Main", 2, (0.0, 0.0)),
        ("road.2", "Elm", 1, (4.0, 4.0)),
        ("road.3", "Ash", 4, (8.0, 1.0)),
        ("road.4", "Birch", 2, (2.0, 9.0)),
        ("road.5", "Cedar", 3, (6.0, 6.0)),
    ];
    store
        .add_features(
            "road",
            roads
                .iter()
                .map(|(id, name, lanes, (x, y))| {
                    Feature::new(*id)
                        .with("name", *name)
                        .with("lanes", *lanes)
                        .with("geom", Geometry::point(*x, *y))
                        .with_provided_id()
                })
                .collect(),
        )
        .unwrap();
    store
}

fn names(source: &dyn FeatureSource, query: &Query) -> Vec<String> {
    source
        .features(query)
        .unwrap()
        .to_vec()
        .unwrap()
        .iter()
        .map(|f| match f.get("name") {
            Value::Text(s) => s.clone(),
            other => format!("{:?}", other),
        })
        .collect()
}

fn paged(offset: usize, max: usize) -> Query {
    Query::builder("road")
        .sort(SortBy::asc("name"))
        .start_index(offset)
        .max_features(max)
        .build()
}

#[test]
fn test_paging_same_with_native_and_emulated() {
    for config in [QueryConfig::default(), QueryConfig::minimal()] {
        let store = store(config);
        let source = store.feature_source_by_type("road").unwrap();
        assert_eq!(names(source.as_ref(), &paged(0, 2)), ["Ash", "Birch"]);
        assert_eq!(names(source.as_ref(), &paged(2, 2)), ["Cedar", "Elm"]);
        assert_eq!(names(source.as_ref(), &paged(4, 2)), ["Main"]);
        assert!(names(source.as_ref(), &paged(9, 2)).is_empty());
    }
}

#[test]
fn test_paging_without_sort_is_stable_by_id() {
    let store = store(QueryConfig::minimal());
    let source = store.feature_source_by_type("road").unwrap();
    let query = Query::builder("road").start_index(1).max_features(2).build();
    let ids: Vec<String> = source
        .features(&query)
        .unwrap()
        .to_vec()
        .unwrap()
        .iter()
        .map(|f| f.id().to_string())
        .collect();
    assert_eq!(ids, ["road.2", "road.3"]);
}

#[test]
fn test_sort_ties_and_direction() {
    let store = store(QueryConfig::default());
    let source = store.feature_source_by_type("road").unwrap();
    let query = Query::builder("road")
        .sort(SortBy::desc("lanes"))
        .sort(SortBy::asc("name"))
        .build();
    assert_eq!(
        names(source.as_ref(), &query),
        ["Ash", "Cedar", "Birch", "Main", "Elm"]
    );
    assert_eq!(
        SortBy::desc("lanes"),
        SortBy::Property {
            name: "lanes".into(),
            order: SortOrder::Descending
        }
    );
}

#[test]
fn test_filter_and_bbox() {
    let store = store(QueryConfig::default());
    let source = store.feature_source_by_type("road").unwrap();
    let filter = Filter::bbox(Envelope::new(3.0, 0.0, 9.0, 7.0))
        .and(Filter::compare("lanes", CompareOp::Gt, 1));
    let mut found = names(source.as_ref(), &Query::filtered("road", filter.clone()));
    found.sort();
    assert_eq!(found, ["Ash", "Cedar"]);
    assert_eq!(source.count(&Query::filtered("road", filter)).unwrap(), Some(2));
}

#[test]
fn test_projection_keeps_mandatory_on_hint() {
    let store = store(QueryConfig::default());
    let source = store.feature_source_by_type("road").unwrap();

    let plain = Query::builder("road").properties(["lanes"]).build();
    let collection = source.features(&plain).unwrap();
    let schema = collection.schema().unwrap();
    assert_eq!(schema.attributes().len(), 1);
    let first = collection.to_vec().unwrap().remove(0);
    assert!(first.contains("lanes"));
    assert!(!first.contains("name"));

    let mandatory = plain.to_builder().hint(Hints::INCLUDE_MANDATORY_PROPS, true).build();
    let first = source.features(&mandatory).unwrap().to_vec().unwrap().remove(0);
    assert!(first.contains("name"));
}

#[test]
fn test_fids_query_returns_ids_only() {
    let store = store(QueryConfig::default());
    let source = store.feature_source_by_type("road").unwrap();
    let features = source.features(&Query::FIDS).unwrap().to_vec().unwrap();
    assert_eq!(features.len(), 5);
    assert!(features.iter().all(|f| f.values().is_empty()));
}

#[test]
fn test_collection_count_bounds_and_subcollection() {
    let store = store(QueryConfig::default());
    let source = store.feature_source_by_type("road").unwrap();
    let all = source.all_features().unwrap();
    assert_eq!(all.count().unwrap(), 5);
    assert_eq!(all.bounds().unwrap(), Some(Envelope::new(0.0, 0.0, 8.0, 9.0)));

    let wide = all.subcollection(Filter::compare("lanes", CompareOp::Ge, 3));
    assert_eq!(wide.count().unwrap(), 2);
    let sorted: Vec<Feature> = wide.sorted(vec![SortBy::asc("name")]).to_vec().unwrap();
    assert_eq!(sorted[0].get("name"), &Value::from("Ash"));

    let iter = ReaderIter::new(source.reader(&Query::ALL).unwrap());
    assert_eq!(iter.filter_map(|f| f.ok()).count(), 5);
    assert!(source.features(&Query::filtered("road", Filter::Exclude)).unwrap().is_empty().unwrap());
}

#[test]
fn test_capabilities_follow_config() {
    let native = store(QueryConfig::default());
    let caps = native.feature_source_by_type("road").unwrap().query_capabilities();
    assert!(caps.is_offset_supported());
    assert!(caps.supports_sorting(&[SortBy::asc("name"), SortBy::Natural]));
    assert!(!caps.supports_sorting(&[SortBy::asc("width")]));
    assert!(caps.handles_natively(&paged(1, 1)));

    let minimal = store(QueryConfig::minimal());
    let caps = minimal.feature_source_by_type("road").unwrap().query_capabilities();
    assert!(!caps.is_offset_supported());
    assert!(!caps.supports_sorting(&[SortBy::asc("name")]));
    assert!(caps.supports_sorting(&[]));
    assert!(!caps.handles_natively(&paged(1, 1)));
    assert!(!caps.join_supported);
}

#[test]
fn test_unsupported_query_parts_are_capability_errors() {
    let store = store(QueryConfig::default());
    let source = store.feature_source_by_type("road").unwrap();

    let joined = Query::builder("road")
        .join(Join::inner("junction", JoinOn::new("name", "road_name")))
        .build();
    assert_eq!(source.reader(&joined).err().unwrap().kind(), ErrorKind::Capability);

    let reprojected = Query::builder("road").crs_reproject(Crs::new("EPSG:3857")).build();
    assert_eq!(source.reader(&reprojected).err().unwrap().kind(), ErrorKind::Capability);

    let same_crs = Query::builder("road").crs_reproject(Crs::new("EPSG:4326")).build();
    assert!(source.reader(&same_crs).is_ok());

    let latest = Query::builder("road").version(Version::Latest).build();
    assert!(source.reader(&latest).is_ok());
}

#[test]
fn test_crs_override_relabels_schema() {
    let store = store(QueryConfig::default());
    let source = store.feature_source_by_type("road").unwrap();
    let query = Query::builder("road").crs(Crs::new("EPSG:900913")).build();
    let reader = source.reader(&query).unwrap();
    assert_eq!(reader.schema().crs(), Some(&Crs::new("EPSG:900913")));
}

#[test]
fn test_query_for_other_type_rejected() {
    let store = store(QueryConfig::default());
    let source = store.feature_source_by_type("road").unwrap();
    let err = source.reader(&Query::builder("river").build()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(store
        .feature_reader(&Query::ALL, &Transaction::AUTO_COMMIT)
        .is_err());
}
