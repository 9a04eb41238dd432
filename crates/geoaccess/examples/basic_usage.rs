//! Basic GeoAccess Usage Example
//!
//! This example demonstrates:
//! - Creating an in-memory store from connection parameters
//! - Editing features inside a transaction
//! - Listening for change events
//! - Locking features and editing them under an authorization
//! - Paged, sorted queries
//!
//! Run with: cargo run --example basic_usage

use geoaccess::prelude::*;
use serde_json::json;

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("geoaccess=info,geoaccess_memory=debug")
        .init();

    println!("\n=== GeoAccess Basic Usage Example ===\n");

    // ========================================
    // 1. Create a store
    // ========================================
    println!("Step 1: Creating store");
    let registry = DataStoreRegistry::with_defaults();
    let params = json!({ "type": "memory", "namespace": "topo", "lock": { "default_duration_ms": 60000 } });
    let store = registry.create(params.as_object().cloned().unwrap_or_default())?;
    store.create_schema(
        FeatureType::new("road")
            .attribute("geom", AttributeType::Geometry)
            .attribute("name", AttributeType::Text)
            .attribute("lanes", AttributeType::Int)
            .with_crs(Crs::new("EPSG:4326")),
    )?;
    println!("   types: {:?}\n", store.type_names()?);

    // ========================================
    // 2. Listen for changes
    // ========================================
    let source = store.feature_source_by_type("road")?;
    let listener: Arc<dyn FeatureListener> = Arc::new(|event: &FeatureEvent| {
        println!("   event: {}", event);
    });
    source.add_feature_listener(listener.clone());

    // ========================================
    // 3. Edit inside a transaction
    // ========================================
    println!("Step 2: Adding roads in a transaction");
    let roads = require_store(source.as_ref())?;
    let txn = Transaction::with_handle("initial load");
    roads.set_transaction(txn.clone())?;
    roads.add_features(vec![
        Feature::new("r1")
            .with("name", "Main")
            .with("lanes", 2)
            .with("geom", Geometry::line(&[(0.0, 0.0), (10.0, 0.0)])),
        Feature::new("r2")
            .with("name", "Elm")
            .with("lanes", 1)
            .with("geom", Geometry::line(&[(0.0, 5.0), (10.0, 5.0)])),
        Feature::new("r3")
            .with("name", "Ash")
            .with("lanes", 4)
            .with("geom", Geometry::line(&[(5.0, -5.0), (5.0, 10.0)])),
    ])?;

    let outside = store.feature_source_by_type("road")?;
    println!("   visible inside: {:?}", roads.count(&Query::ALL)?);
    println!("   visible outside: {:?}", outside.count(&Query::ALL)?);
    txn.commit()?;
    println!("   visible outside after commit: {:?}\n", outside.count(&Query::ALL)?);
    txn.close()?;

    // ========================================
    // 4. Lock and edit under an authorization
    // ========================================
    println!("Step 3: Locking wide roads");
    let locking = require_locking(source.as_ref())?;
    let lock = locking.feature_lock();
    let locked = locking.lock_features_filtered(Filter::compare("lanes", CompareOp::Ge, 2))?;
    println!("   locked {} road(s) under {}", locked, lock);

    let edit = Transaction::with_handle("widen");
    edit.add_authorization(lock.authorization())?;
    locking.set_transaction(edit.clone())?;
    let changed = locking.modify_feature("lanes", Value::Int(6), &Filter::equals("name", "Main"))?;
    locking.unlock_features_filtered(Filter::Include)?;
    edit.commit()?;
    edit.close()?;
    locking.set_transaction(Transaction::AUTO_COMMIT)?;
    println!("   widened {} road(s)\n", changed);

    // ========================================
    // 5. Query
    // ========================================
    println!("Step 4: Sorted, paged query");
    let query = Query::builder("road")
        .properties(["name", "lanes"])
        .sort(SortBy::desc("lanes"))
        .start_index(0)
        .max_features(2)
        .build();
    println!("   {}", query);
    for feature in source.features(&query)?.to_vec()? {
        println!("   {} {:?} {:?}", feature.id(), feature.get("name"), feature.get("lanes"));
    }
    println!("   bounds: {:?}", source.bounds()?);

    source.remove_feature_listener(&listener);
    store.dispose();
    println!("\n=== Done ===");
    Ok(())
}
