//! Pure aggregation over meal records.
//!
//! Every function here takes the records and the goal it needs as arguments
//! and reads nothing else, so repeated calls with the same inputs return the
//! same values and never touch the store. Results are recomputed on each call
//! and must not be cached across mutations.

/// Summary value types.
pub mod summary;

use std::cmp::Reverse;

use hashbrown::HashMap;

use crate::{
    calendar::{
        BucketKey, DayKey, MonthKey, Zone,
        bucket::{day_key, month_key, month_window, week_of},
    },
    core::goal::Goal,
    meal::MealRecord,
    types::Category,
};

pub use summary::{DailyProgress, DailySummary};

/// Sum of protein over meals bucketed on `today`.
pub fn today_total<'a, I>(meals: I, today: DayKey, zone: &Zone) -> u64
where
    I: IntoIterator<Item = &'a MealRecord>,
{
    meals
        .into_iter()
        .filter(|m| day_key(m.timestamp, zone) == today)
        .map(|m| u64::from(m.protein_grams))
        .sum()
}

/// `min(100, total / goal * 100)`.
pub fn progress_percent(total: u64, goal: Goal) -> f64 {
    summary::clamped_percent(total, u64::from(goal.grams()))
}

/// Grams still missing to reach `goal`, never negative.
pub fn remaining(total: u64, goal: Goal) -> u64 {
    u64::from(goal.grams()).saturating_sub(total)
}

/// One summary per day, Monday through Sunday of the week containing `now_ms`.
pub fn weekly_summaries<'a, I>(meals: I, goal: Goal, now_ms: i64, zone: &Zone) -> Vec<DailySummary>
where
    I: IntoIterator<Item = &'a MealRecord>,
{
    let week = week_of(zone.local_date(now_ms));
    let totals = totals_by(meals, |m| day_key(m.timestamp, zone));
    week.into_iter()
        .map(|day| DailySummary {
            bucket: BucketKey::Day(day),
            total_protein: totals.get(&day).copied().unwrap_or(0),
            goal_for_bucket: u64::from(goal.grams()),
        })
        .collect()
}

/// One summary per month for the current month and the five before it,
/// oldest first. Each month's goal is the daily goal times its real length.
pub fn monthly_summaries<'a, I>(meals: I, goal: Goal, now_ms: i64, zone: &Zone) -> Vec<DailySummary>
where
    I: IntoIterator<Item = &'a MealRecord>,
{
    let window = month_window(zone.local_date(now_ms));
    let totals = totals_by(meals, |m| month_key(m.timestamp, zone));
    window
        .into_iter()
        .map(|month| month_summary(month, totals.get(&month).copied().unwrap_or(0), goal))
        .collect()
}

fn month_summary(month: MonthKey, total_protein: u64, goal: Goal) -> DailySummary {
    DailySummary {
        bucket: BucketKey::Month(month),
        total_protein,
        goal_for_bucket: u64::from(goal.grams()) * u64::from(month.days()),
    }
}

/// Meals bucketed on `day`, newest first. Equal timestamps order by id,
/// newest id first.
pub fn select_day<'a, I>(meals: I, day: DayKey, zone: &Zone) -> Vec<MealRecord>
where
    I: IntoIterator<Item = &'a MealRecord>,
{
    let mut out: Vec<MealRecord> = meals
        .into_iter()
        .filter(|m| day_key(m.timestamp, zone) == day)
        .cloned()
        .collect();
    out.sort_by_key(|m| Reverse((m.timestamp, m.id)));
    out
}

/// Today's total, progress, remaining grams and meals in one pass.
pub fn daily_progress<'a, I>(meals: I, goal: Goal, now_ms: i64, zone: &Zone) -> DailyProgress
where
    I: IntoIterator<Item = &'a MealRecord>,
{
    let day = day_key(now_ms, zone);
    let meals = select_day(meals, day, zone);
    let total = meals.iter().map(|m| u64::from(m.protein_grams)).sum();
    DailyProgress {
        day,
        total,
        goal: goal.grams(),
        percent: progress_percent(total, goal),
        remaining: remaining(total, goal),
        meals,
    }
}

/// Protein per category, in [`Category::ALL`] order, zeros included.
pub fn by_category<'a, I>(meals: I) -> Vec<(Category, u64)>
where
    I: IntoIterator<Item = &'a MealRecord>,
{
    let totals = totals_by(meals, |m| m.category);
    Category::ALL
        .into_iter()
        .map(|c| (c, totals.get(&c).copied().unwrap_or(0)))
        .collect()
}

/// Consecutive days on which `goal` was met, ending today. A day still in
/// progress does not break the streak: if today's goal is not met yet the
/// count ends yesterday.
pub fn streak<'a, I>(meals: I, goal: Goal, now_ms: i64, zone: &Zone) -> u32
where
    I: IntoIterator<Item = &'a MealRecord>,
{
    let totals = totals_by(meals, |m| day_key(m.timestamp, zone));
    let met = |day: &DayKey| totals.get(day).copied().unwrap_or(0) >= u64::from(goal.grams());

    let today = day_key(now_ms, zone);
    let mut cursor = if met(&today) { Some(today) } else { today.pred() };
    let mut count = 0;
    while let Some(day) = cursor {
        if !met(&day) {
            break;
        }
        count += 1;
        cursor = day.pred();
    }
    count
}

fn totals_by<'a, I, K, F>(meals: I, mut key: F) -> HashMap<K, u64>
where
    I: IntoIterator<Item = &'a MealRecord>,
    K: Eq + std::hash::Hash,
    F: FnMut(&MealRecord) -> K,
{
    let mut totals = HashMap::new();
    for meal in meals {
        *totals.entry(key(meal)).or_insert(0) += u64::from(meal.protein_grams);
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_clamps_and_remaining_floors() {
        let goal = Goal::new(120).unwrap();
        assert_eq!(progress_percent(0, goal), 0.0);
        assert_eq!(progress_percent(60, goal), 50.0);
        assert_eq!(progress_percent(125, goal), 100.0);
        assert_eq!(remaining(125, goal), 0);
        assert_eq!(remaining(100, goal), 20);
        assert_eq!(remaining(120, goal), 0);
    }

    #[test]
    fn empty_input_yields_zero_summaries() {
        let goal = Goal::new(100).unwrap();
        let zone = Zone::utc();
        let none: Vec<MealRecord> = Vec::new();
        let weekly = weekly_summaries(&none, goal, 0, &zone);
        assert_eq!(weekly.len(), 7);
        assert!(weekly.iter().all(|s| s.total_protein == 0 && s.goal_for_bucket == 100));
        let monthly = monthly_summaries(&none, goal, 0, &zone);
        assert_eq!(monthly.len(), 6);
        assert_eq!(streak(&none, goal, 0, &zone), 0);
        assert_eq!(by_category(&none).len(), 5);
    }
}
