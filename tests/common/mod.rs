#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use proteinlog::calendar::{Calendar, ManualClock, Zone};
use tracing_subscriber::EnvFilter;

/// Monday 2024-03-11, 09:00 UTC.
pub const MONDAY_9AM: i64 = 1_710_147_600_000;
pub const HOUR_MS: i64 = 3_600_000;
pub const DAY_MS: i64 = 24 * HOUR_MS;

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// UTC calendar frozen at `now_ms`, plus the clock to move it.
pub fn utc_calendar(now_ms: i64) -> (Calendar, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now_ms));
    (Calendar::new(Zone::utc(), clock.clone()), clock)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}
