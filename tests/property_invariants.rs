mod common;

use std::collections::BTreeMap;

use proptest::prelude::*;

use common::{DAY_MS, MONDAY_9AM, utc_calendar};
use proteinlog::{
    aggregate::{progress_percent, remaining, select_day, today_total, weekly_summaries},
    calendar::{bucket::day_key, Zone},
    core::{goal::Goal, store::{MealStore, StoreError}},
    meal::{MealDraft, MealPatch, MealRecord},
    types::{Category, MealId},
};

#[derive(Debug, Clone)]
enum Action {
    Create { name_idx: u8, grams: u16, days_back: u8 },
    Update { target: u8, grams: u16 },
    Rename { target: u8, blank: bool },
    Delete { target: u8 },
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => (0u8..16, 0u16..200, 0u8..10)
            .prop_map(|(name_idx, grams, days_back)| Action::Create { name_idx, grams, days_back }),
        1 => (0u8..32, 0u16..200).prop_map(|(target, grams)| Action::Update { target, grams }),
        1 => (0u8..32, any::<bool>()).prop_map(|(target, blank)| Action::Rename { target, blank }),
        1 => (0u8..32).prop_map(|target| Action::Delete { target }),
    ]
}

fn pick(model: &BTreeMap<MealId, MealRecord>, target: u8) -> Option<MealId> {
    if model.is_empty() {
        return None;
    }
    model.keys().nth(usize::from(target) % model.len()).copied()
}

fn sorted(mut meals: Vec<MealRecord>) -> Vec<MealRecord> {
    meals.sort_by_key(|m| m.id);
    meals
}

fn run(actions: &[Action]) -> (MealStore, BTreeMap<MealId, MealRecord>, BTreeMap<MealId, i64>) {
    let (calendar, _) = utc_calendar(MONDAY_9AM);
    let zone = calendar.zone();
    let today = calendar.today();
    let mut store = MealStore::with_calendar(calendar);
    let mut model = BTreeMap::new();
    let mut stamps = BTreeMap::new();

    for action in actions {
        match *action {
            Action::Create { name_idx, grams, days_back } => {
                let date = today - chrono::Days::new(u64::from(days_back));
                let meal = store
                    .create(
                        MealDraft::new(format!("food {name_idx}"), u32::from(grams))
                            .category(Category::ALL[usize::from(name_idx) % Category::ALL.len()])
                            .on_date(date),
                    )
                    .expect("create");
                assert_eq!(zone.local_date(meal.timestamp), date);
                stamps.insert(meal.id, meal.timestamp);
                model.insert(meal.id, meal);
            }
            Action::Update { target, grams } => {
                let Some(id) = pick(&model, target) else { continue };
                let patch = MealPatch {
                    protein_grams: Some(u32::from(grams)),
                    ..MealPatch::default()
                };
                let updated = store.update(id, patch).expect("update");
                model.insert(id, updated);
            }
            Action::Rename { target, blank } => {
                let Some(id) = pick(&model, target) else { continue };
                let patch = MealPatch {
                    food_name: Some(if blank { " ".to_string() } else { format!("renamed {target}") }),
                    ..MealPatch::default()
                };
                match store.update(id, patch) {
                    Ok(updated) => {
                        assert!(!blank);
                        model.insert(id, updated);
                    }
                    Err(err) => {
                        assert!(blank);
                        assert!(matches!(err, StoreError::Invalid(_)));
                    }
                }
            }
            Action::Delete { target } => {
                let Some(id) = pick(&model, target) else { continue };
                let removed = store.delete(id).expect("delete");
                assert_eq!(model.remove(&id), Some(removed));
            }
        }
    }

    (store, model, stamps)
}

proptest! {
    #[test]
    fn store_matches_model_and_keeps_identity(actions in prop::collection::vec(action_strategy(), 1..80)) {
        let (store, model, stamps) = run(&actions);
        let zone = store.calendar().zone();

        prop_assert_eq!(store.len(), model.len());
        prop_assert_eq!(sorted(store.export_snapshot()), model.values().cloned().collect::<Vec<_>>());

        for meal in model.values() {
            // Identity and creation instant survive every update.
            prop_assert_eq!(stamps.get(&meal.id), Some(&meal.timestamp));
            prop_assert!(!meal.food_name.trim().is_empty());

            let day = day_key(meal.timestamp, &zone);
            let hits = select_day(store.records(), day, &zone)
                .into_iter()
                .filter(|m| m.id == meal.id)
                .count();
            prop_assert_eq!(hits, 1);
        }

        for id in stamps.keys().filter(|id| !model.contains_key(*id)) {
            prop_assert!(store.get(*id).is_none());
        }
    }

    #[test]
    fn undo_all_then_redo_all_round_trips(actions in prop::collection::vec(action_strategy(), 1..60)) {
        let (mut store, model, _) = run(&actions);
        let end = sorted(store.export_snapshot());

        let steps = store.undo_len();
        for _ in 0..steps {
            store.undo().expect("undo");
        }
        prop_assert!(store.is_empty());

        for _ in 0..steps {
            store.redo().expect("redo");
        }
        prop_assert_eq!(sorted(store.export_snapshot()), end);
        prop_assert_eq!(store.len(), model.len());
    }

    #[test]
    fn weekly_totals_are_bounded_by_overall_total(actions in prop::collection::vec(action_strategy(), 1..60), goal in 1u32..400) {
        let (store, model, _) = run(&actions);
        let zone = store.calendar().zone();
        let goal = Goal::new(goal).unwrap();

        let week = weekly_summaries(store.records(), goal, MONDAY_9AM, &zone);
        prop_assert_eq!(week.len(), 7);
        let weekly: u64 = week.iter().map(|s| s.total_protein).sum();
        let overall: u64 = model.values().map(|m| u64::from(m.protein_grams)).sum();
        prop_assert!(weekly <= overall);
        prop_assert_eq!(week[0].total_protein, today_total(store.records(), store.calendar().today_key(), &zone));

        // Nothing is logged in the future.
        let later = weekly_summaries(store.records(), goal, MONDAY_9AM + 7 * DAY_MS, &Zone::utc());
        prop_assert!(later.iter().all(|s| s.total_protein == 0));
    }

    #[test]
    fn progress_is_monotone_and_clamped(a in 0u64..10_000, b in 0u64..10_000, goal in 1u32..5_000) {
        let goal = Goal::new(goal).unwrap();
        let (lo, hi) = (a.min(b), a.max(b));

        let p_lo = progress_percent(lo, goal);
        let p_hi = progress_percent(hi, goal);
        prop_assert!(p_lo <= p_hi);
        prop_assert!((0.0..=100.0).contains(&p_lo));
        prop_assert!((0.0..=100.0).contains(&p_hi));

        let left = remaining(hi, goal);
        if hi >= u64::from(goal.grams()) {
            prop_assert_eq!(left, 0);
            prop_assert_eq!(p_hi, 100.0);
        } else {
            prop_assert_eq!(left + hi, u64::from(goal.grams()));
        }
    }
}
