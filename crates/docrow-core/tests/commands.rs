//! Integration tests for batch execution and optimistic concurrency.

mod common;

use common::{vehicles, TestContext};
use docrow_core::store::{Parameter, StoreTransaction};
use docrow_core::{
    BackingStore, Command, DocumentStore, Error, Isolation, SqlCommand, StoreConfig, StoreError,
    MAX_PARAMETERS,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[test]
fn test_insert_and_get() {
    let ctx = TestContext::new();
    let store = ctx.initialized(vehicles());

    let etag = store
        .insert("Car", "c1", &json!({"wheels": 4, "brand": "Volvo"}))
        .unwrap();

    let car = store.load("Car", "c1").unwrap();
    assert_eq!(car.etag, etag);
    assert_eq!(car.design, "Car");
    assert_eq!(car.discriminator, "Car");
    assert_eq!(car.version, 0);
    assert_eq!(car.document, json!({"wheels": 4, "brand": "Volvo"}));
    assert!(car.created_at.is_some());

    let row = ctx.raw_row("Vehicles", "c1").unwrap();
    assert_eq!(row.get_i64("Wheels"), Some(4));
    assert_eq!(row.get_str("Brand"), Some("Volvo"));
    assert_eq!(row.get_i64("LastOperation"), Some(1));
}

#[test]
fn test_get_is_polymorphic() {
    let ctx = TestContext::new();
    let store = ctx.initialized(vehicles());
    store.insert("Car", "c1", &json!({"wheels": 4})).unwrap();
    store.insert("Vehicle", "v1", &json!({"wheels": 2})).unwrap();

    assert_eq!(store.get("Vehicle", "c1").unwrap().unwrap().design, "Car");
    assert!(store.get("Car", "v1").unwrap().is_none());
    assert!(store.get("Car", "missing").unwrap().is_none());
    assert!(matches!(
        store.load("Car", "v1"),
        Err(Error::NotFound { ref table, ref id }) if table == "Vehicles" && id == "v1"
    ));
    assert!(matches!(store.get("Plane", "p1"), Err(Error::UnknownDesign(_))));
}

#[test]
fn test_typed_deserialize() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Car {
        wheels: i64,
        brand: String,
    }

    let ctx = TestContext::new();
    let store = ctx.initialized(vehicles());
    store
        .insert("Car", "c1", &json!({"wheels": 4, "brand": "Saab"}))
        .unwrap();

    let car: Car = store.load("Car", "c1").unwrap().deserialize().unwrap();
    assert_eq!(
        car,
        Car {
            wheels: 4,
            brand: "Saab".to_string()
        }
    );
}

#[test]
fn test_batch_is_atomic() {
    let ctx = TestContext::new();
    let store = ctx.initialized(vehicles());

    let batch: Vec<Command> = vec![
        store
            .insert_command("Car", "c1", &json!({"wheels": 4}))
            .unwrap()
            .into(),
        store
            .insert_command("Car", "c2", &json!({"wheels": 4}))
            .unwrap()
            .into(),
        store
            .update_command("Car", "c3", Uuid::new_v4(), &json!({"wheels": 4}))
            .unwrap()
            .into(),
    ];

    let err = store.execute(&batch).unwrap_err();
    assert!(matches!(
        err,
        Error::ConcurrencyConflict {
            index: 2,
            expected: 1,
            actual: 0
        }
    ));

    assert!(ctx.raw_row("Vehicles", "c1").is_none());
    assert!(ctx.raw_row("Vehicles", "c2").is_none());
    assert_eq!(store.stats().conflicts, 1);
    assert_eq!(store.stats().batches, 0);
    assert_eq!(store.last_written_etag(), None);
}

#[test]
fn test_batch_shares_one_etag() {
    let ctx = TestContext::new();
    let store = ctx.initialized(vehicles());

    let batch: Vec<Command> = vec![
        store
            .insert_command("Car", "c1", &json!({"wheels": 4}))
            .unwrap()
            .into(),
        store
            .insert_command("Vehicle", "v1", &json!({"wheels": 2}))
            .unwrap()
            .into(),
    ];
    let etag = store.execute(&batch).unwrap();

    assert_eq!(store.load("Car", "c1").unwrap().etag, etag);
    assert_eq!(store.load("Vehicle", "v1").unwrap().etag, etag);
    assert_eq!(store.last_written_etag(), Some(etag));

    let car = ctx.raw_row("Vehicles", "c1").unwrap();
    let vehicle = ctx.raw_row("Vehicles", "v1").unwrap();
    assert_eq!(car.get("CreatedAt"), vehicle.get("CreatedAt"));
    assert_eq!(car.get("ModifiedAt"), vehicle.get("ModifiedAt"));

    let stats = store.stats();
    assert_eq!(stats.batches, 1);
    assert_eq!(stats.commands, 2);
}

#[test]
fn test_stale_update_conflicts_and_leaves_row_untouched() {
    let ctx = TestContext::new();
    let store = ctx.initialized(vehicles());

    let first = store.insert("Car", "c1", &json!({"wheels": 4})).unwrap();
    let update = store
        .update_command("Car", "c1", first, &json!({"wheels": 6}))
        .unwrap();
    let second = store.execute(&[update.into()]).unwrap();
    assert_ne!(first, second);

    let before = ctx.raw_row("Vehicles", "c1").unwrap();

    let stale = store
        .update_command("Car", "c1", first, &json!({"wheels": 8}))
        .unwrap();
    let err = store.execute(&[stale.into()]).unwrap_err();
    assert!(err.is_concurrency_conflict());

    assert_eq!(ctx.raw_row("Vehicles", "c1").unwrap(), before);
    assert_eq!(before.get_i64("Wheels"), Some(6));
    assert_eq!(before.get_i64("LastOperation"), Some(2));
}

#[test]
fn test_last_write_wins_skips_etag_check() {
    let ctx = TestContext::new();
    let store = ctx.initialized(vehicles());
    store.insert("Car", "c1", &json!({"wheels": 4})).unwrap();

    let update = store
        .update_command("Car", "c1", Uuid::new_v4(), &json!({"wheels": 3}))
        .unwrap()
        .last_write_wins();
    let etag = store.execute(&[update.into()]).unwrap();

    let car = store.load("Car", "c1").unwrap();
    assert_eq!(car.etag, etag);
    assert_eq!(car.document, json!({"wheels": 3}));
}

#[test]
fn test_last_write_wins_never_touches_tombstones() {
    let ctx = TestContext::new();
    let store = ctx.initialized(vehicles());
    let etag = store.insert("Car", "c1", &json!({"wheels": 4})).unwrap();
    let delete = store.delete_command("Car", "c1", etag).unwrap();
    store.execute(&[delete.into()]).unwrap();

    let update = store
        .update_command("Car", "c1", Uuid::new_v4(), &json!({"wheels": 3}))
        .unwrap()
        .last_write_wins();
    assert!(store
        .execute(&[update.into()])
        .unwrap_err()
        .is_concurrency_conflict());

    let delete = store
        .delete_command("Car", "c1", Uuid::new_v4())
        .unwrap()
        .last_write_wins();
    assert!(store
        .execute(&[delete.into()])
        .unwrap_err()
        .is_concurrency_conflict());

    // Addressing the tombstone by its renamed id does not revive it either.
    let tombstones = ctx
        .backing
        .query(
            "SELECT * FROM \"Vehicles\" WHERE \"Id\" LIKE 'c1/%'",
            &[],
        )
        .unwrap();
    assert_eq!(tombstones.len(), 1);
    let tombstone = tombstones[0].clone();
    let tombstone_id = tombstone.get_str("Id").unwrap().to_string();

    let update = store
        .update_command("Car", &tombstone_id, Uuid::new_v4(), &json!({"wheels": 3}))
        .unwrap()
        .last_write_wins();
    assert!(store
        .execute(&[update.into()])
        .unwrap_err()
        .is_concurrency_conflict());

    let delete = store
        .delete_command("Car", &tombstone_id, Uuid::new_v4())
        .unwrap()
        .last_write_wins();
    assert!(store
        .execute(&[delete.into()])
        .unwrap_err()
        .is_concurrency_conflict());

    assert_eq!(ctx.raw_row("Vehicles", &tombstone_id).unwrap(), tombstone);
    assert!(store.get("Car", "c1").unwrap().is_none());
}

#[test]
fn test_delete_leaves_tombstone() {
    let ctx = TestContext::new();
    let store = ctx.initialized(vehicles());
    let etag = store.insert("Car", "c1", &json!({"wheels": 4})).unwrap();

    let stale = store.delete_command("Car", "c1", Uuid::new_v4()).unwrap();
    assert!(store
        .execute(&[stale.into()])
        .unwrap_err()
        .is_concurrency_conflict());

    let delete = store.delete_command("Car", "c1", etag).unwrap();
    store.execute(&[delete.into()]).unwrap();

    assert!(store.get("Car", "c1").unwrap().is_none());
    assert!(ctx.raw_row("Vehicles", "c1").is_none());

    let tombstones = ctx
        .backing
        .query(
            "SELECT \"Id\", \"LastOperation\" FROM \"Vehicles\" WHERE \"Id\" LIKE 'c1/%'",
            &[],
        )
        .unwrap();
    assert_eq!(tombstones.len(), 1);
    assert_eq!(tombstones[0].get_i64("LastOperation"), Some(3));

    // The original id is free again.
    store.insert("Car", "c1", &json!({"wheels": 2})).unwrap();
    assert_eq!(store.load("Car", "c1").unwrap().document, json!({"wheels": 2}));
}

#[test]
fn test_upsert_inserts_then_updates() {
    let ctx = TestContext::new();
    let store = ctx.initialized(vehicles());

    let upsert = store
        .upsert_command("Car", "c1", &json!({"wheels": 4}))
        .unwrap();
    store.execute(&[upsert.into()]).unwrap();

    let row = ctx.raw_row("Vehicles", "c1").unwrap();
    assert_eq!(row.get_i64("LastOperation"), Some(1));
    let created = row.get("CreatedAt").cloned();

    let upsert = store
        .upsert_command("Car", "c1", &json!({"wheels": 5}))
        .unwrap();
    let etag = store.execute(&[upsert.into()]).unwrap();

    let row = ctx.raw_row("Vehicles", "c1").unwrap();
    assert_eq!(row.get_i64("LastOperation"), Some(2));
    assert_eq!(row.get_i64("Wheels"), Some(5));
    assert_eq!(row.get("CreatedAt").cloned(), created);
    assert_eq!(store.load("Car", "c1").unwrap().etag, etag);
}

#[test]
fn test_duplicate_insert_fails() {
    let ctx = TestContext::new();
    let store = ctx.initialized(vehicles());
    let etag = store.insert("Car", "c1", &json!({"wheels": 4})).unwrap();

    let err = store
        .insert("Car", "c1", &json!({"wheels": 6}))
        .unwrap_err();
    assert!(matches!(err, Error::Store(_)));

    assert_eq!(store.load("Car", "c1").unwrap().etag, etag);
    assert_eq!(store.last_written_etag(), Some(etag));
}

#[test]
fn test_raw_sql_command_in_batch() {
    let ctx = TestContext::new();
    let store = ctx.initialized(vehicles());
    store.insert("Car", "c1", &json!({"wheels": 4})).unwrap();

    let bump = SqlCommand::new("UPDATE \"Vehicles\" SET \"Wheels\" = @Wheels WHERE \"Id\" = @Id")
        .bind("Wheels", 9i64)
        .bind("Id", "c1")
        .expect_rows(1);
    let insert = store
        .insert_command("Car", "c2", &json!({"wheels": 1}))
        .unwrap();
    store.execute(&[insert.into(), bump.into()]).unwrap();

    assert_eq!(ctx.raw_row("Vehicles", "c1").unwrap().get_i64("Wheels"), Some(9));

    let miss = SqlCommand::new("UPDATE \"Vehicles\" SET \"Wheels\" = 0 WHERE \"Id\" = @Id")
        .bind("Id", "nope")
        .expect_rows(1);
    assert!(store
        .execute(&[miss.into()])
        .unwrap_err()
        .is_concurrency_conflict());
}

#[test]
fn test_empty_batch_is_noop() {
    let ctx = TestContext::new();
    let store = ctx.initialized(vehicles());

    assert_eq!(store.execute(&[]).unwrap(), Uuid::nil());
    assert_eq!(store.last_written_etag(), None);
    assert_eq!(store.stats().batches, 0);
}

/// A store that counts `begin` calls and refuses every transaction.
#[derive(Default)]
struct CountingStore {
    begins: AtomicUsize,
}

impl BackingStore for CountingStore {
    fn begin(&self, _: Isolation) -> Result<Box<dyn StoreTransaction + '_>, StoreError> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Other("unavailable".to_string()))
    }
}

fn binding(count: usize) -> SqlCommand {
    (0..count).fold(SqlCommand::new("SELECT 1"), |command, i| {
        command.bind(format!("P{i}"), i as i64)
    })
}

#[test]
fn test_parameter_ceiling_rejects_before_store() {
    let backing = Arc::new(CountingStore::default());
    let store = DocumentStore::new(
        backing.clone(),
        vehicles().build().unwrap(),
        StoreConfig::default(),
    );

    let err = store.execute(&[binding(MAX_PARAMETERS).into()]).unwrap_err();
    assert!(matches!(
        err,
        Error::ParameterLimitExceeded { count: 2000, limit: 2000 }
    ));
    assert_eq!(backing.begins.load(Ordering::SeqCst), 0);

    let split: Vec<Command> = vec![binding(1000).into(), binding(1000).into()];
    assert!(matches!(
        store.execute(&split),
        Err(Error::ParameterLimitExceeded { count: 2000, .. })
    ));
    assert_eq!(backing.begins.load(Ordering::SeqCst), 0);

    let err = store
        .execute(&[binding(MAX_PARAMETERS - 1).into()])
        .unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::Other(_))));
    assert_eq!(backing.begins.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unbound_parameter_rejected_by_store() {
    let ctx = TestContext::new();
    let mut tx = ctx.backing.begin(Isolation::ReadCommitted).unwrap();

    let err = tx
        .query("SELECT @Missing", &[Parameter::new("Other", 1i64)])
        .unwrap_err();
    assert!(matches!(err, StoreError::UnknownParameter(_)));
}
