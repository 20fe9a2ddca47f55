//! Integration tests for background document migrations.

mod common;

use common::{vehicles, TestContext};
use docrow_core::{
    Configuration, DocumentStore, DocumentTransform, Error, RunnerConfig, SqliteStore,
    StoreConfig,
};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

/// `vehicles()` with one migration doubling every wheel count.
fn doubled() -> Configuration {
    let mut config = vehicles();
    config
        .register_migration(
            0,
            1,
            DocumentTransform::all(|doc| {
                let wheels = doc["wheels"].as_i64().unwrap_or(0);
                doc["wheels"] = json!(wheels * 2);
                Ok(())
            }),
        )
        .unwrap();
    config
}

/// `doubled()` followed by a second migration adding one wheel.
fn doubled_plus_one() -> Configuration {
    let mut config = doubled();
    config
        .register_migration(
            1,
            2,
            DocumentTransform::all(|doc| {
                let wheels = doc["wheels"].as_i64().unwrap_or(0);
                doc["wheels"] = json!(wheels + 1);
                Ok(())
            }),
        )
        .unwrap();
    config
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_runner_advances_documents() {
    let ctx = TestContext::new();
    let old = ctx.initialized(vehicles());
    old.insert("Car", "c1", &json!({"wheels": 4})).unwrap();
    old.insert("Vehicle", "v1", &json!({"wheels": 2})).unwrap();

    let store = ctx.initialized(doubled());
    let report = store.run_background_migrations().unwrap();

    assert_eq!(report.migrated, 2);
    assert_eq!(report.skipped, 0);

    let car = store.load("Car", "c1").unwrap();
    assert_eq!(car.version, 1);
    assert_eq!(car.document, json!({"wheels": 8}));
    assert_eq!(ctx.raw_row("Vehicles", "c1").unwrap().get_i64("Wheels"), Some(8));
    assert_eq!(store.load("Vehicle", "v1").unwrap().document, json!({"wheels": 4}));

    assert!(store.run_background_migrations().unwrap().is_empty());
    assert_eq!(store.stats().migrated, 2);
}

#[test]
fn test_new_writes_use_current_version() {
    let ctx = TestContext::new();
    let store = ctx.initialized(doubled());

    store.insert("Car", "c1", &json!({"wheels": 4})).unwrap();

    assert_eq!(store.load("Car", "c1").unwrap().version, 1);
    assert!(store.run_background_migrations().unwrap().is_empty());
    assert_eq!(store.load("Car", "c1").unwrap().document, json!({"wheels": 4}));
}

#[test]
fn test_runner_pages_through_table() {
    let ctx = TestContext::new();
    let old = ctx.initialized(vehicles());
    for i in 0..7 {
        old.insert("Vehicle", format!("v{i}"), &json!({"wheels": i}))
            .unwrap();
    }

    let store = ctx.store_with(
        doubled(),
        StoreConfig::default().with_runner(RunnerConfig::default().with_page_size(2)),
    );
    store.initialize().unwrap();

    assert_eq!(store.run_background_migrations().unwrap().migrated, 7);
    for i in 0..7 {
        let doc = store.load("Vehicle", &format!("v{i}")).unwrap();
        assert_eq!(doc.version, 1);
        assert_eq!(doc.document, json!({"wheels": i * 2}));
    }
}

#[test]
fn test_runner_skips_deleted_rows() {
    let ctx = TestContext::new();
    let old = ctx.initialized(vehicles());
    let etag = old.insert("Car", "c1", &json!({"wheels": 4})).unwrap();
    let delete = old.delete_command("Car", "c1", etag).unwrap();
    old.execute(&[delete.into()]).unwrap();

    let store = ctx.initialized(doubled());

    assert!(store.run_background_migrations().unwrap().is_empty());
}

#[test]
fn test_version_gap_stops_runner() {
    let ctx = TestContext::new();
    let old = ctx.initialized(vehicles());
    old.insert("Car", "c1", &json!({"wheels": 4})).unwrap();

    let mut config = vehicles();
    config
        .register_migration(1, 2, DocumentTransform::all(|_| Ok(())))
        .unwrap();
    let store = ctx.initialized(config);

    let err = store.run_background_migrations().unwrap_err();
    assert!(matches!(
        err,
        Error::VersionGap { ref id, found: 0, expected: 1, .. } if id == "c1"
    ));
    assert_eq!(store.load("Car", "c1").unwrap().version, 0);
}

#[test]
fn test_transform_scoped_to_design() {
    let ctx = TestContext::new();
    let old = ctx.initialized(vehicles());
    old.insert("Car", "c1", &json!({"wheels": 4, "brand": "volvo"}))
        .unwrap();
    old.insert("Vehicle", "v1", &json!({"wheels": 2, "brand": "none"}))
        .unwrap();

    let mut config = vehicles();
    config
        .register_migration(
            0,
            1,
            DocumentTransform::for_design("Car", |doc| {
                let brand = doc["brand"].as_str().unwrap_or_default().to_uppercase();
                doc["brand"] = json!(brand);
                Ok(())
            }),
        )
        .unwrap();
    let store = ctx.initialized(config);

    assert_eq!(store.run_background_migrations().unwrap().migrated, 2);

    assert_eq!(store.load("Car", "c1").unwrap().document["brand"], "VOLVO");
    assert_eq!(ctx.raw_row("Vehicles", "c1").unwrap().get_str("Brand"), Some("VOLVO"));

    let vehicle = store.load("Vehicle", "v1").unwrap();
    assert_eq!(vehicle.version, 1);
    assert_eq!(vehicle.document["brand"], "none");
}

#[test]
fn test_concurrent_write_wins_over_runner() {
    let ctx = TestContext::new();
    let old = ctx.initialized(vehicles());
    old.insert("Car", "c1", &json!({"wheels": 4})).unwrap();

    let live: Arc<OnceLock<Arc<DocumentStore>>> = Arc::new(OnceLock::new());
    let fired = Arc::new(AtomicBool::new(false));

    let mut config = vehicles();
    {
        let live = Arc::clone(&live);
        let fired = Arc::clone(&fired);
        config
            .register_migration(
                0,
                1,
                DocumentTransform::all(move |doc| {
                    doc["wheels"] = json!(100);
                    if fired.swap(true, Ordering::SeqCst) {
                        return Ok(());
                    }

                    // A live writer updates the row while the runner holds it.
                    let store = live.get().expect("store registered");
                    let current = store.load("Car", "c1")?;
                    let update =
                        store.update_command("Car", "c1", current.etag, &json!({"wheels": 6}))?;
                    store.execute(&[update.into()])?;
                    Ok(())
                }),
            )
            .unwrap();
    }

    let store = Arc::new(ctx.initialized(config));
    assert!(live.set(Arc::clone(&store)).is_ok());

    let report = store.run_background_migrations().unwrap();
    assert_eq!(report.migrated, 0);
    assert_eq!(report.skipped, 1);

    let car = store.load("Car", "c1").unwrap();
    assert_eq!(car.version, 1);
    assert_eq!(car.document, json!({"wheels": 6}));
    assert_eq!(store.stats().skipped, 1);
    assert_eq!(store.stats().conflicts, 1);

    assert!(store.run_background_migrations().unwrap().is_empty());
}

#[test]
fn test_skipped_row_does_not_block_later_migrations() {
    let ctx = TestContext::new();
    let old = ctx.initialized(vehicles());
    old.insert("Car", "c1", &json!({"wheels": 4})).unwrap();
    old.insert("Car", "c2", &json!({"wheels": 4})).unwrap();

    let live: Arc<OnceLock<Arc<DocumentStore>>> = Arc::new(OnceLock::new());
    let fired = Arc::new(AtomicBool::new(false));

    let mut config = vehicles();
    {
        let live = Arc::clone(&live);
        let fired = Arc::clone(&fired);
        config
            .register_migration(
                0,
                1,
                DocumentTransform::all(move |doc| {
                    doc["step"] = json!(1);
                    if fired.swap(true, Ordering::SeqCst) {
                        return Ok(());
                    }

                    let store = live.get().expect("store registered");
                    let current = store.load("Car", "c1")?;
                    let update =
                        store.update_command("Car", "c1", current.etag, &json!({"wheels": 6}))?;
                    store.execute(&[update.into()])?;
                    Ok(())
                }),
            )
            .unwrap();
    }
    config
        .register_migration(
            1,
            2,
            DocumentTransform::all(|doc| {
                doc["step"] = json!(2);
                Ok(())
            }),
        )
        .unwrap();

    let store = Arc::new(ctx.store_with(
        config,
        StoreConfig::default().with_runner(RunnerConfig::default().with_page_size(1)),
    ));
    store.initialize().unwrap();
    assert!(live.set(Arc::clone(&store)).is_ok());

    let report = store.run_background_migrations().unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.migrated, 2);

    let c1 = store.load("Car", "c1").unwrap();
    assert_eq!(c1.version, 2);
    assert_eq!(c1.document, json!({"wheels": 6}));

    let c2 = store.load("Car", "c2").unwrap();
    assert_eq!(c2.version, 2);
    assert_eq!(c2.document, json!({"wheels": 4, "step": 2}));

    assert!(store.run_background_migrations().unwrap().is_empty());
}

#[test]
fn test_two_runners_share_one_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("docrow.db");

    let old = DocumentStore::new(
        Arc::new(SqliteStore::open(&path).unwrap()),
        vehicles().build().unwrap(),
        StoreConfig::default(),
    );
    old.initialize().unwrap();
    for i in 0..20 {
        old.insert("Vehicle", format!("v{i:02}"), &json!({"wheels": i}))
            .unwrap();
    }

    let open = || {
        DocumentStore::new(
            Arc::new(SqliteStore::open(&path).unwrap()),
            doubled_plus_one().build().unwrap(),
            StoreConfig::default().with_runner(RunnerConfig::default().with_page_size(3)),
        )
    };
    open().initialize().unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let store = open();
            thread::spawn(move || store.run_background_migrations().unwrap())
        })
        .collect();
    let reports: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let store = open();
    let last = store.run_background_migrations().unwrap();

    // Each row advances through each version exactly once between them.
    let migrated: u64 = reports.iter().map(|r| r.migrated).sum::<u64>() + last.migrated;
    assert_eq!(migrated, 40);

    for i in 0..20 {
        let doc = store.load("Vehicle", &format!("v{i:02}")).unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.document, json!({"wheels": i * 2 + 1}));
    }
}

#[test]
fn test_background_runner_stops_cleanly() {
    let ctx = TestContext::new();
    let old = ctx.initialized(vehicles());
    old.insert("Car", "c1", &json!({"wheels": 4})).unwrap();

    let store = ctx.store_with(
        doubled(),
        StoreConfig::default()
            .with_runner(RunnerConfig::default().with_interval(Duration::from_millis(10))),
    );
    store.initialize().unwrap();

    let background = store.start_background_migrations().unwrap();
    wait_until(|| store.load("Car", "c1").unwrap().version == 1);

    assert!(background.is_running());
    background.stop().unwrap();
    assert_eq!(store.load("Car", "c1").unwrap().document, json!({"wheels": 8}));
}

#[test]
fn test_background_runner_reports_version_gap() {
    let ctx = TestContext::new();
    let old = ctx.initialized(vehicles());
    old.insert("Car", "c1", &json!({"wheels": 4})).unwrap();

    let mut config = vehicles();
    config
        .register_migration(1, 2, DocumentTransform::all(|_| Ok(())))
        .unwrap();
    let store = ctx.store_with(
        config,
        StoreConfig::default()
            .with_runner(RunnerConfig::default().with_interval(Duration::from_millis(10))),
    );
    store.initialize().unwrap();

    let background = store.start_background_migrations().unwrap();
    wait_until(|| !background.is_running());

    assert!(matches!(background.stop(), Err(Error::VersionGap { .. })));
}
