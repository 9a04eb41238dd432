//! Feature locking through sources and the store's locking manager.

use geoaccess::prelude::*;
use geoaccess::{LockOutcome, SequentialAuthorizationGenerator};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

fn store() -> MemoryDataStore {
    let store = MemoryDataStore::new()
        .with_authorization_generator(Arc::new(SequentialAuthorizationGenerator::new("auth")));
    store
        .create_schema(
            FeatureType::new("road")
                .attribute("geom", AttributeType::Geometry)
                .attribute("name", AttributeType::Text)
                .attribute("lanes", AttributeType::Int),
        )
        .unwrap();
    store
        .add_features(
            "road",
            (1..=4)
                .map(|i| {
                    Feature::new(format!("road.{}", i))
                        .with("name", format!("Road {}", i))
                        .with("lanes", i)
                        .with_provided_id()
                })
                .collect(),
        )
        .unwrap();
    store
}

fn locking_source(store: &MemoryDataStore, lock: FeatureLock) -> Arc<dyn FeatureSource> {
    let source = store.feature_source_by_type("road").unwrap();
    require_locking(source.as_ref()).unwrap().set_feature_lock(lock);
    source
}

fn ids(list: &[&str]) -> Filter {
    Filter::ids(list.iter().copied())
}

#[test]
fn test_lock_counts_and_skips_foreign_locks() {
    let store = store();
    let alpha = locking_source(&store, FeatureLock::timed("alpha", 60_000));
    let beta = locking_source(&store, FeatureLock::timed("beta", 60_000));

    let alpha_locking = require_locking(alpha.as_ref()).unwrap();
    let beta_locking = require_locking(beta.as_ref()).unwrap();
    assert_eq!(alpha_locking.lock_features_filtered(ids(&["road.1", "road.2"])).unwrap(), 2);
    // Re-locking what we already hold still counts.
    assert_eq!(alpha_locking.lock_features_filtered(ids(&["road.1"])).unwrap(), 1);
    assert_eq!(beta_locking.lock_all_features().unwrap(), 2);

    let manager = store.locking_manager().unwrap();
    assert!(manager.exists("alpha"));
    assert!(manager.exists("beta"));
    let info = manager.lock_info("road", &FeatureId::from("road.3")).unwrap();
    assert_eq!(info.authorization.as_deref(), Some("beta"));
    assert!(info.expires_at.is_some());
}

#[test]
fn test_lock_does_not_authorize_transaction() {
    let store = store();
    let source = locking_source(&store, FeatureLock::timed("alpha", 60_000));
    let locking = require_locking(source.as_ref()).unwrap();
    let txn = Transaction::new();
    locking.set_transaction(txn.clone()).unwrap();
    locking.lock_features_filtered(ids(&["road.1"])).unwrap();
    assert!(!txn.has_authorization("alpha"));

    let err = locking.remove_features(&ids(&["road.1"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    txn.add_authorization("alpha").unwrap();
    assert_eq!(locking.remove_features(&ids(&["road.1"])).unwrap(), 1);
    txn.commit().unwrap();
    txn.close().unwrap();
}

#[test]
fn test_write_blocked_for_whole_batch() {
    let store = store();
    let source = locking_source(&store, FeatureLock::timed("alpha", 60_000));
    let locking = require_locking(source.as_ref()).unwrap();
    locking.lock_features_filtered(ids(&["road.2"])).unwrap();

    let err = locking
        .modify_feature("lanes", Value::Int(9), &Filter::Include)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    let untouched = source
        .features_filtered(Filter::equals("lanes", 9))
        .unwrap()
        .count()
        .unwrap();
    assert_eq!(untouched, 0);
}

#[test]
fn test_unlock_rules() {
    let store = store();
    let source = locking_source(&store, FeatureLock::timed("alpha", 60_000));
    let locking = require_locking(source.as_ref()).unwrap();
    locking.lock_features_filtered(ids(&["road.1"])).unwrap();

    // AUTO_COMMIT cannot carry the authorization.
    let err = locking.unlock_features_filtered(ids(&["road.1"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);

    let txn = Transaction::new();
    locking.set_transaction(txn.clone()).unwrap();
    let err = locking.unlock_features_filtered(ids(&["road.1"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    txn.add_authorization("alpha").unwrap();
    locking.unlock_features_filtered(ids(&["road.1"])).unwrap();
    // Not locked any more: a no-op.
    locking.unlock_features_filtered(ids(&["road.1", "road.4"])).unwrap();
    assert!(!store
        .locking_manager()
        .unwrap()
        .is_locked("road", &FeatureId::from("road.1")));
    txn.close().unwrap();
}

#[test]
fn test_unlock_is_all_or_nothing() {
    let store = store();
    let alpha = locking_source(&store, FeatureLock::timed("alpha", 60_000));
    let beta = locking_source(&store, FeatureLock::timed("beta", 60_000));
    require_locking(alpha.as_ref())
        .unwrap()
        .lock_features_filtered(ids(&["road.1"]))
        .unwrap();
    require_locking(beta.as_ref())
        .unwrap()
        .lock_features_filtered(ids(&["road.2"]))
        .unwrap();

    let txn = Transaction::new();
    txn.add_authorization("alpha").unwrap();
    let locking = require_locking(alpha.as_ref()).unwrap();
    locking.set_transaction(txn.clone()).unwrap();
    assert!(locking
        .unlock_features_filtered(ids(&["road.1", "road.2"]))
        .is_err());

    let manager = store.locking_manager().unwrap();
    assert!(manager.is_locked("road", &FeatureId::from("road.1")));
    assert!(manager.is_locked("road", &FeatureId::from("road.2")));
    txn.close().unwrap();
}

#[test]
fn test_transaction_lock_released_on_commit() {
    let store = store();
    let source = locking_source(&store, FeatureLock::TRANSACTION);
    let locking = require_locking(source.as_ref()).unwrap();

    let err = locking.lock_features_filtered(ids(&["road.1"])).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Usage);

    let txn = Transaction::new();
    locking.set_transaction(txn.clone()).unwrap();
    assert_eq!(locking.lock_features_filtered(ids(&["road.1"])).unwrap(), 1);

    let other = store.feature_source_by_type("road").unwrap();
    let blocked = require_store(other.as_ref())
        .unwrap()
        .remove_features(&ids(&["road.1"]))
        .unwrap_err();
    assert_eq!(blocked.kind(), ErrorKind::Authorization);

    locking
        .modify_feature("name", Value::from("Mine"), &ids(&["road.1"]))
        .unwrap();
    txn.commit().unwrap();

    let manager = store.locking_manager().unwrap();
    assert!(!manager.is_locked("road", &FeatureId::from("road.1")));
    assert_eq!(
        require_store(other.as_ref())
            .unwrap()
            .remove_features(&ids(&["road.1"]))
            .unwrap(),
        1
    );
    txn.close().unwrap();
}

#[test]
fn test_timed_lock_expires() {
    let store = store();
    let source = locking_source(&store, FeatureLock::timed("brief", 50));
    let locking = require_locking(source.as_ref()).unwrap();
    locking.lock_features_filtered(ids(&["road.3"])).unwrap();
    let manager = store.locking_manager().unwrap();
    assert!(manager.is_locked("road", &FeatureId::from("road.3")));

    thread::sleep(Duration::from_millis(120));
    assert!(!manager.is_locked("road", &FeatureId::from("road.3")));
    assert!(!manager.exists("brief"));
    assert_eq!(locking.remove_features(&ids(&["road.3"])).unwrap(), 1);
}

#[test]
fn test_release_and_refresh_by_authorization() {
    let store = store();
    let source = locking_source(&store, FeatureLock::timed("alpha", 60_000));
    require_locking(source.as_ref())
        .unwrap()
        .lock_all_features()
        .unwrap();
    let manager = store.locking_manager().unwrap();
    let txn = Transaction::new();
    assert!(manager.refresh("alpha", &txn).unwrap());
    assert!(!manager.refresh("nobody", &txn).unwrap());
    assert!(manager.release("alpha", &txn).unwrap());
    assert!(!manager.exists("alpha"));
    assert!(!manager.release("alpha", &txn).unwrap());
    txn.close().unwrap();
}

#[test]
fn test_generated_lock_used_by_default() {
    let store = store();
    let source = store.feature_source_by_type("road").unwrap();
    let locking = require_locking(source.as_ref()).unwrap();
    let lock = locking.feature_lock();
    assert_eq!(lock.authorization(), "auth-1");
    assert_eq!(lock.duration(), LockDuration::Millis(60 * 60 * 1000));
    assert_eq!(locking.lock_all_features().unwrap(), 4);
    assert!(store.locking_manager().unwrap().exists("auth-1"));
}

#[test]
fn test_concurrent_lockers_one_winner() {
    let store = store();
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let source = locking_source(&store, FeatureLock::timed(format!("t{}", i), 60_000));
                barrier.wait();
                require_locking(source.as_ref())
                    .unwrap()
                    .lock_features_filtered(Filter::ids(["road.4"]))
                    .unwrap()
            })
        })
        .collect();
    let won: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(won, 1);

    let manager = store.locking_manager().unwrap();
    let outcome = manager
        .lock_feature_id(
            "road",
            &FeatureId::from("road.1"),
            &Transaction::AUTO_COMMIT,
            &FeatureLock::timed("late", 1_000),
        )
        .unwrap();
    assert_eq!(outcome, LockOutcome::Acquired);
}

#[test]
fn test_commit_respects_lock_taken_after_write() {
    let store = store();
    let txn = Transaction::new();
    let editor = store.feature_source_by_type("road").unwrap();
    let editing = require_store(editor.as_ref()).unwrap();
    editing.set_transaction(txn.clone()).unwrap();
    editing
        .modify_feature("name", Value::from("Edited"), &ids(&["road.1"]))
        .unwrap();

    let locker = locking_source(&store, FeatureLock::timed("alpha", 60_000));
    assert_eq!(
        require_locking(locker.as_ref())
            .unwrap()
            .lock_features_filtered(ids(&["road.1"]))
            .unwrap(),
        1
    );

    assert!(txn.commit().is_err());
    let committed = locker
        .features_filtered(ids(&["road.1"]))
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(committed[0].get("name"), &Value::from("Road 1"));

    // The edit is still pending and goes through once authorized.
    txn.add_authorization("alpha").unwrap();
    txn.commit().unwrap();
    let committed = locker
        .features_filtered(ids(&["road.1"]))
        .unwrap()
        .to_vec()
        .unwrap();
    assert_eq!(committed[0].get("name"), &Value::from("Edited"));
    txn.close().unwrap();
}
