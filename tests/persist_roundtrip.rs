mod common;

use common::{MONDAY_9AM, init_test_tracing, utc_calendar};
use proteinlog::{
    core::{goal::Goal, store::MealStore},
    meal::{MealDraft, MealPatch},
    persist::{
        KvStore, StorageKeys, load_state,
        memory::MemoryKvStore,
        snapshot::{decode_meals, encode_goal, encode_meals},
        sqlite::SqliteKvStore,
    },
    types::Category,
};

fn seeded_store() -> MealStore {
    let mut store = MealStore::with_calendar(utc_calendar(MONDAY_9AM).0);
    let eggs = store
        .create(MealDraft::new("Eggs", 18).category(Category::Breakfast))
        .unwrap();
    store
        .create(MealDraft::new("Salmon", 40).image_url("data:image/jpeg;base64,/9j/"))
        .unwrap();
    store
        .update(
            eggs.id,
            MealPatch {
                protein_grams: Some(19),
                ..MealPatch::default()
            },
        )
        .unwrap();
    store
}

fn save(kv: &mut dyn KvStore, keys: &StorageKeys, store: &MealStore, goal: Goal) {
    kv.set(&keys.meals, &encode_meals(&store.export_snapshot()).unwrap())
        .unwrap();
    kv.set(&keys.goal, &encode_goal(goal).unwrap()).unwrap();
}

#[test]
fn sqlite_file_round_trip() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meals.db");
    let keys = StorageKeys::default();
    let store = seeded_store();

    {
        let mut kv = SqliteKvStore::open(&path).unwrap();
        save(&mut kv, &keys, &store, Goal::new(135).unwrap());
        kv.flush().unwrap();
    }

    let kv = SqliteKvStore::open(&path).unwrap();
    let loaded = load_state(&kv, &keys, utc_calendar(MONDAY_9AM).0, Goal::default());
    assert!(!loaded.degraded);
    assert_eq!(loaded.store.export_snapshot(), store.export_snapshot());
    assert_eq!(loaded.goals.goal().grams(), 135);
    assert_eq!(loaded.store.undo_len(), 0);
}

#[test]
fn empty_storage_uses_defaults() {
    let kv = MemoryKvStore::new();
    let loaded = load_state(
        &kv,
        &StorageKeys::default(),
        utc_calendar(MONDAY_9AM).0,
        Goal::new(150).unwrap(),
    );
    assert!(!loaded.degraded);
    assert!(loaded.store.is_empty());
    assert_eq!(loaded.goals.goal().grams(), 150);
    assert!(kv.is_empty());
}

#[test]
fn corrupt_values_degrade_without_losing_the_other() {
    init_test_tracing();
    let keys = StorageKeys::default();
    let mut kv = MemoryKvStore::new();
    save(&mut kv, &keys, &seeded_store(), Goal::new(90).unwrap());
    kv.set(&keys.goal, b"0").unwrap();

    let loaded = load_state(&kv, &keys, utc_calendar(MONDAY_9AM).0, Goal::default());
    assert!(loaded.degraded);
    assert_eq!(loaded.store.len(), 2);
    assert_eq!(loaded.goals.goal(), Goal::default());

    kv.set(&keys.meals, b"{not json").unwrap();
    kv.set(&keys.goal, b"120").unwrap();
    let loaded = load_state(&kv, &keys, utc_calendar(MONDAY_9AM).0, Goal::default());
    assert!(loaded.degraded);
    assert!(loaded.store.is_empty());
    assert_eq!(loaded.goals.goal().grams(), 120);
    // The damaged value is still there for a later session.
    assert_eq!(kv.get(&keys.meals).unwrap().as_deref(), Some(&b"{not json"[..]));
}

#[test]
fn legacy_bare_array_loads() {
    let store = seeded_store();
    let legacy = serde_json::to_vec(&store.export_snapshot()).unwrap();
    assert_eq!(decode_meals(&legacy).unwrap(), store.export_snapshot());

    let keys = StorageKeys {
        meals: "custom.meals".to_string(),
        goal: "custom.goal".to_string(),
    };
    let mut kv = SqliteKvStore::open_in_memory().unwrap();
    kv.set(&keys.meals, &legacy).unwrap();
    let loaded = load_state(&kv, &keys, utc_calendar(MONDAY_9AM).0, Goal::default());
    assert!(!loaded.degraded);
    assert_eq!(loaded.store.len(), 2);
    assert_eq!(loaded.goals.goal(), Goal::default());
}

#[test]
fn serialized_record_shape_is_camel_case() {
    let store = seeded_store();
    let text = String::from_utf8(encode_meals(&store.export_snapshot()).unwrap()).unwrap();
    assert!(text.contains("\"foodName\":\"Eggs\""));
    assert!(text.contains("\"proteinGrams\":19"));
    assert!(text.contains("\"category\":\"Breakfast\""));
    assert!(text.contains("\"imageUrl\":\"data:image/jpeg;base64,/9j/\""));
    assert_eq!(text.matches("imageUrl").count(), 1);
}

#[test]
fn blank_stored_name_degrades_the_load() {
    init_test_tracing();
    let keys = StorageKeys::default();
    let mut kv = MemoryKvStore::new();
    let store = seeded_store();
    save(&mut kv, &keys, &store, Goal::new(90).unwrap());

    let text = String::from_utf8(kv.get(&keys.meals).unwrap().unwrap()).unwrap();
    let damaged = text.replace("\"foodName\":\"Eggs\"", "\"foodName\":\"  \"");
    kv.set(&keys.meals, damaged.as_bytes()).unwrap();

    let loaded = load_state(&kv, &keys, utc_calendar(MONDAY_9AM).0, Goal::default());
    assert!(loaded.degraded);
    assert!(loaded.store.is_empty());
    assert_eq!(loaded.goals.goal().grams(), 90);
    assert_eq!(kv.get(&keys.meals).unwrap().as_deref(), Some(damaged.as_bytes()));
}
