use serde::Serialize;

use crate::{
    calendar::{BucketKey, DayKey},
    meal::MealRecord,
};

/// Protein total of one day or month against the goal for that span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailySummary {
    /// Day or month this summary covers.
    pub bucket: BucketKey,
    /// Sum of protein logged in the bucket.
    pub total_protein: u64,
    /// Daily goal for a day bucket, daily goal times month length for a month.
    pub goal_for_bucket: u64,
}

impl DailySummary {
    /// Progress in `[0, 100]`.
    pub fn percent(&self) -> f64 {
        clamped_percent(self.total_protein, self.goal_for_bucket)
    }

    /// True once the bucket's goal is reached.
    pub fn met(&self) -> bool {
        self.goal_for_bucket > 0 && self.total_protein >= self.goal_for_bucket
    }
}

/// Everything a "today" view shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyProgress {
    /// Local day shown.
    pub day: DayKey,
    /// Grams logged today.
    pub total: u64,
    /// Current daily goal in grams.
    pub goal: u32,
    /// Progress in `[0, 100]`.
    pub percent: f64,
    /// Grams still needed, never negative.
    pub remaining: u64,
    /// Newest first.
    pub meals: Vec<MealRecord>,
}

pub(crate) fn clamped_percent(total: u64, goal: u64) -> f64 {
    if goal == 0 {
        return 0.0;
    }
    (total as f64 / goal as f64 * 100.0).min(100.0)
}
