use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use chrono::{
    DateTime, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, Offset, TimeDelta,
    TimeZone, Utc,
};

use super::bucket::{DayKey, MonthKey};

/// Timezone used to decide which calendar day an instant belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zone {
    /// Operating system local zone, DST-aware.
    #[default]
    System,
    /// A fixed UTC offset.
    Fixed(FixedOffset),
}

impl Zone {
    /// UTC as a fixed zone.
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Fixed zone `hours` east of UTC; `None` when out of range.
    pub fn fixed_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours.checked_mul(3600)?).map(Self::Fixed)
    }

    /// Local wall-clock time of `ts_ms`. Out-of-range instants clamp to the
    /// representable bounds.
    pub fn local_datetime(&self, ts_ms: i64) -> NaiveDateTime {
        let utc = DateTime::<Utc>::from_timestamp_millis(ts_ms).unwrap_or(if ts_ms < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });
        match self {
            Self::System => utc.with_timezone(&Local).naive_local(),
            Self::Fixed(offset) => utc.with_timezone(offset).naive_local(),
        }
    }

    /// Local calendar date of `ts_ms`.
    pub fn local_date(&self, ts_ms: i64) -> NaiveDate {
        self.local_datetime(ts_ms).date()
    }

    /// Instant of a local wall-clock time.
    ///
    /// Ambiguous times (DST fall-back) resolve to the earliest instant; times
    /// inside a DST gap move forward by one hour.
    pub fn timestamp_of(&self, local: NaiveDateTime) -> Option<i64> {
        match self {
            Self::System => resolve_local(&Local, local),
            Self::Fixed(offset) => resolve_local(offset, local),
        }
    }
}

fn resolve_local<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Option<i64> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.timestamp_millis()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.timestamp_millis()),
        LocalResult::None => {
            let shifted = local.checked_add_signed(TimeDelta::hours(1))?;
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.timestamp_millis())
        }
    }
}

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant.
    fn now_ms(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Settable clock for tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Clock frozen at `now_ms`.
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(now_ms),
        }
    }

    /// Moves the clock to `now_ms`.
    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    /// Moves the clock forward by `delta_ms`.
    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A [`Zone`] paired with a [`Clock`].
#[derive(Debug, Clone)]
pub struct Calendar {
    zone: Zone,
    clock: Arc<dyn Clock>,
}

impl Default for Calendar {
    fn default() -> Self {
        Self::system()
    }
}

impl Calendar {
    /// Calendar over `zone` reading time from `clock`.
    pub fn new(zone: Zone, clock: Arc<dyn Clock>) -> Self {
        Self { zone, clock }
    }

    /// System zone and wall clock.
    pub fn system() -> Self {
        Self::new(Zone::System, Arc::new(SystemClock))
    }

    /// Zone used for bucketing.
    pub fn zone(&self) -> Zone {
        self.zone
    }

    /// Current instant from the clock.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Local date of now.
    pub fn today(&self) -> NaiveDate {
        self.zone.local_date(self.now_ms())
    }

    /// Day key of now.
    pub fn today_key(&self) -> DayKey {
        DayKey::from_date(self.today())
    }

    /// Day key of `ts_ms` in this calendar's zone.
    pub fn day_key(&self, ts_ms: i64) -> DayKey {
        DayKey::from_date(self.zone.local_date(ts_ms))
    }

    /// Month key of `ts_ms` in this calendar's zone.
    pub fn month_key(&self, ts_ms: i64) -> MonthKey {
        MonthKey::of(self.zone.local_date(ts_ms))
    }
}
