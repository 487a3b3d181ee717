mod common;

use common::{DAY_MS, HOUR_MS, MONDAY_9AM, date, init_test_tracing, utc_calendar};
use proteinlog::{
    calendar::{DayKey, MonthKey},
    core::store::{MealStore, StoreError},
    error::ValidationError,
    meal::{MealDraft, MealPatch, MealRecord},
    op::Op,
    types::{Category, MealId},
};

fn store_at(now_ms: i64) -> MealStore {
    init_test_tracing();
    MealStore::with_calendar(utc_calendar(now_ms).0)
}

#[test]
fn create_assigns_unique_ids_and_now() {
    let mut store = store_at(MONDAY_9AM);
    let a = store.create(MealDraft::new("  Eggs ", 18)).unwrap();
    let b = store.create(MealDraft::new("Eggs", 18)).unwrap();

    assert_ne!(a.id, b.id);
    assert!(a.id < b.id, "ids from one clock tick stay ordered");
    assert_eq!(a.food_name, "Eggs");
    assert_eq!(a.timestamp, MONDAY_9AM);
    assert_eq!(a.category, Category::Other);
    assert_eq!(store.len(), 2);
    assert_eq!(store.revision(), 2);
}

#[test]
fn create_rejects_blank_name_without_side_effects() {
    let mut store = store_at(MONDAY_9AM);
    let err = store.create(MealDraft::new("   ", 10)).unwrap_err();
    assert_eq!(err, StoreError::Invalid(ValidationError::EmptyFoodName));
    assert!(store.is_empty());
    assert_eq!(store.undo_len(), 0);
}

#[test]
fn create_on_past_date_keeps_time_of_day() {
    let mut store = store_at(MONDAY_9AM);
    let meal = store
        .create(MealDraft::new("Steak", 60).on_date(date(2024, 3, 8)))
        .unwrap();
    assert_eq!(meal.timestamp, MONDAY_9AM - 3 * DAY_MS);
    assert_eq!(store.on_day("2024-03-08".parse().unwrap()).len(), 1);
    assert!(store.on_day("2024-03-11".parse().unwrap()).is_empty());

    let today = store
        .create(MealDraft::new("Tuna", 25).on_date(date(2024, 3, 11)))
        .unwrap();
    assert_eq!(today.timestamp, MONDAY_9AM);
}

#[test]
fn update_changes_fields_but_never_id_or_timestamp() {
    let mut store = store_at(MONDAY_9AM);
    let meal = store
        .create(MealDraft::new("Toast", 8).image_url("data:image/png;base64,AA=="))
        .unwrap();

    let updated = store
        .update(
            meal.id,
            MealPatch {
                food_name: Some(" Peanut toast ".to_string()),
                protein_grams: Some(14),
                category: Some(Category::Snack),
                image_url: Some(None),
            },
        )
        .unwrap();

    assert_eq!(updated.id, meal.id);
    assert_eq!(updated.timestamp, meal.timestamp);
    assert_eq!(updated.food_name, "Peanut toast");
    assert_eq!(updated.protein_grams, 14);
    assert_eq!(updated.category, Category::Snack);
    assert_eq!(updated.image_url, None);
}

#[test]
fn update_with_empty_name_leaves_record_unchanged() {
    let mut store = store_at(MONDAY_9AM);
    let meal = store.create(MealDraft::new("Toast", 8)).unwrap();
    let err = store
        .update(
            meal.id,
            MealPatch {
                food_name: Some("  ".to_string()),
                protein_grams: Some(99),
                ..MealPatch::default()
            },
        )
        .unwrap_err();

    assert_eq!(err, StoreError::Invalid(ValidationError::EmptyFoodName));
    assert_eq!(store.get(meal.id), Some(&meal));
    assert_eq!(store.undo_len(), 1);
}

#[test]
fn missing_id_is_not_found_and_store_unchanged() {
    let mut store = store_at(MONDAY_9AM);
    store.create(MealDraft::new("Toast", 8)).unwrap();
    let ghost: MealId = "01HZX3M8Q5T9V2K7N4B6C1D0EF".parse().unwrap();

    let patch = MealPatch {
        protein_grams: Some(1),
        ..MealPatch::default()
    };
    assert_eq!(store.update(ghost, patch), Err(StoreError::NotFound(ghost)));
    assert_eq!(store.delete(ghost), Err(StoreError::NotFound(ghost)));
    assert_eq!(
        store.reschedule(ghost, date(2024, 3, 1)),
        Err(StoreError::NotFound(ghost))
    );
    assert_eq!(store.len(), 1);
    assert_eq!(store.revision(), 1);
}

#[test]
fn delete_returns_record_and_removes_it() {
    let mut store = store_at(MONDAY_9AM);
    let keep = store.create(MealDraft::new("Milk", 8)).unwrap();
    let gone = store.create(MealDraft::new("Cheese", 7)).unwrap();

    assert_eq!(store.delete(gone.id).unwrap(), gone);
    assert!(store.get(gone.id).is_none());
    let ids: Vec<MealId> = store.records().map(|r| r.id).collect();
    assert_eq!(ids, vec![keep.id]);
}

#[test]
fn reschedule_moves_day_and_undo_restores_it() {
    let mut store = store_at(MONDAY_9AM);
    let meal = store.create(MealDraft::new("Chili", 35)).unwrap();

    let moved = store.reschedule(meal.id, date(2024, 2, 29)).unwrap();
    assert_eq!(moved.food_name, meal.food_name);
    assert_eq!(store.in_month(MonthKey::new(2024, 2).unwrap()).len(), 1);
    assert!(store.in_month(MonthKey::new(2024, 3).unwrap()).is_empty());

    store.undo().unwrap();
    assert_eq!(store.get(meal.id).unwrap().timestamp, MONDAY_9AM);

    // Same day is a no-op and records nothing.
    let before = store.undo_len();
    store.reschedule(meal.id, date(2024, 3, 11)).unwrap();
    assert_eq!(store.undo_len(), before);
}

#[test]
fn undo_redo_round_trip_restores_exact_records() {
    let mut store = store_at(MONDAY_9AM);
    let a = store.create(MealDraft::new("Oats", 10)).unwrap();
    let b = store.create(MealDraft::new("Whey", 24)).unwrap();
    store
        .update(
            a.id,
            MealPatch {
                protein_grams: Some(12),
                ..MealPatch::default()
            },
        )
        .unwrap();
    store.delete(b.id).unwrap();
    let end: Vec<MealRecord> = store.export_snapshot();

    // Delete, update, create, create.
    let undone: Vec<Op> = (0..4).map(|_| store.undo().unwrap().op).collect();
    assert!(matches!(undone[0], Op::Create { ref meal } if meal.id == b.id));
    assert!(matches!(undone[1], Op::Update { id, .. } if id == a.id));
    assert!(store.is_empty());
    assert_eq!(store.undo(), Err(StoreError::NothingToUndo));

    for _ in 0..4 {
        store.redo().unwrap();
    }
    assert_eq!(store.export_snapshot(), end);
    assert_eq!(store.redo(), Err(StoreError::NothingToRedo));
}

#[test]
fn undo_of_delete_restores_same_id_and_timestamp() {
    let mut store = store_at(MONDAY_9AM);
    let meal = store.create(MealDraft::new("Lentils", 18)).unwrap();
    store.delete(meal.id).unwrap();
    store.undo().unwrap();
    assert_eq!(store.get(meal.id), Some(&meal));
}

#[test]
fn new_mutation_clears_redo() {
    let mut store = store_at(MONDAY_9AM);
    store.create(MealDraft::new("Tofu", 20)).unwrap();
    store.undo().unwrap();
    assert_eq!(store.redo_len(), 1);
    store.create(MealDraft::new("Tempeh", 19)).unwrap();
    assert_eq!(store.redo_len(), 0);
}

#[test]
fn query_has_no_implicit_filter() {
    let (calendar, clock) = utc_calendar(MONDAY_9AM);
    let mut store = MealStore::with_calendar(calendar);
    store.create(MealDraft::new("Eggs", 18)).unwrap();
    clock.advance(2 * DAY_MS + HOUR_MS);
    store.create(MealDraft::new("Fish", 30)).unwrap();

    assert_eq!(store.query(|_| true).len(), 2);
    let heavy = store.query_cloned(|m| m.protein_grams >= 20);
    assert_eq!(heavy.len(), 1);
    assert_eq!(heavy[0].food_name, "Fish");

    let wednesday: DayKey = "2024-03-13".parse().unwrap();
    assert_eq!(store.on_day(wednesday).len(), 1);
}

#[test]
fn snapshot_rejects_duplicate_ids() {
    let mut store = store_at(MONDAY_9AM);
    let meal = store.create(MealDraft::new("Eggs", 18)).unwrap();
    let err = MealStore::from_snapshot(vec![meal.clone(), meal.clone()], utc_calendar(MONDAY_9AM).0)
        .unwrap_err();
    assert_eq!(err, StoreError::AlreadyExists(meal.id));

    let rebuilt = MealStore::from_snapshot(store.export_snapshot(), utc_calendar(MONDAY_9AM).0).unwrap();
    assert_eq!(rebuilt.export_snapshot(), vec![meal]);
    assert_eq!(rebuilt.undo_len(), 0);
}

#[test]
fn snapshot_normalizes_names_and_rejects_blank_ones() {
    let mut store = store_at(MONDAY_9AM);
    let meal = store.create(MealDraft::new("Eggs", 18)).unwrap();

    let padded = MealRecord {
        food_name: "  Eggs \t".to_string(),
        ..meal.clone()
    };
    let rebuilt = MealStore::from_snapshot(vec![padded], utc_calendar(MONDAY_9AM).0).unwrap();
    assert_eq!(rebuilt.get(meal.id), Some(&meal));

    let blank = MealRecord {
        food_name: "   ".to_string(),
        ..meal
    };
    let err = MealStore::from_snapshot(vec![blank], utc_calendar(MONDAY_9AM).0).unwrap_err();
    assert_eq!(err, StoreError::Invalid(ValidationError::EmptyFoodName));
}

#[test]
fn edit_with_new_date_is_one_undo_step() {
    let mut store = store_at(MONDAY_9AM);
    let meal = store.create(MealDraft::new("Pasta", 22)).unwrap();
    let patch = MealPatch {
        protein_grams: Some(26),
        ..MealPatch::default()
    };

    let edited = store.edit(meal.id, patch, Some(date(2024, 3, 9))).unwrap();
    assert_eq!(edited.protein_grams, 26);
    assert_eq!(edited.timestamp, MONDAY_9AM - 2 * DAY_MS);
    assert_eq!(store.undo_len(), 2);

    let undone = store.undo().unwrap();
    assert!(matches!(undone.op, Op::Edit { id, .. } if id == meal.id));
    assert_eq!(store.get(meal.id), Some(&meal));
    assert_eq!(store.undo_len(), 1);

    store.redo().unwrap();
    assert_eq!(store.get(meal.id), Some(&edited));
}

#[test]
fn edit_on_same_day_is_a_plain_update() {
    let mut store = store_at(MONDAY_9AM);
    let meal = store.create(MealDraft::new("Pasta", 22)).unwrap();

    let unchanged = store
        .edit(meal.id, MealPatch::default(), Some(date(2024, 3, 11)))
        .unwrap();
    assert_eq!(unchanged, meal);
    assert_eq!(store.undo_len(), 1);

    let renamed = store
        .edit(
            meal.id,
            MealPatch {
                food_name: Some(" Penne ".to_string()),
                ..MealPatch::default()
            },
            Some(date(2024, 3, 11)),
        )
        .unwrap();
    assert_eq!(renamed.food_name, "Penne");
    assert_eq!(renamed.timestamp, meal.timestamp);
    assert!(matches!(store.undo().unwrap().op, Op::Update { .. }));

    assert_eq!(
        store.edit(MealId::from_ulid(ulid::Ulid::nil()), MealPatch::default(), None),
        Err(StoreError::NotFound(MealId::from_ulid(ulid::Ulid::nil())))
    );
}
