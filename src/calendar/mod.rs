//! Local-time bucketing of instants into day, week and month keys.

/// Day/month keys and window helpers.
pub mod bucket;
/// Timezone, clock and calendar.
pub mod clock;

pub use bucket::{BucketKey, DayKey, MonthKey};
pub use clock::{Calendar, Clock, ManualClock, SystemClock, Zone};
