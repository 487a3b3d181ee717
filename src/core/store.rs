use std::{
    fmt,
    time::{Duration, UNIX_EPOCH},
};

use chrono::NaiveDate;
use hashbrown::HashMap;
use thiserror::Error;
use tracing::debug;
use ulid::{Generator, Ulid};

use crate::{
    calendar::{
        Calendar, DayKey, MonthKey,
        bucket::{backfill_timestamp, day_key, month_key},
    },
    error::ValidationError,
    meal::{MealDraft, MealPatch, MealRecord, normalize_food_name},
    op::{AppliedOp, Op},
    types::{MealId, Revision},
};

/// Why a store operation was refused. The store is unchanged after any of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No record with this id.
    #[error("meal not found: {0}")]
    NotFound(MealId),
    /// A record with this id is already present.
    #[error("meal already exists: {0}")]
    AlreadyExists(MealId),
    /// Input failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// Undo stack is empty.
    #[error("nothing to undo")]
    NothingToUndo,
    /// Redo stack is empty.
    #[error("nothing to redo")]
    NothingToRedo,
}

/// Monotonic ULID source. Ids are strictly increasing even when the clock
/// stalls or steps backwards.
struct IdGenerator {
    inner: Generator,
}

impl IdGenerator {
    fn new() -> Self {
        Self {
            inner: Generator::new(),
        }
    }

    fn next(&mut self, now_ms: i64) -> MealId {
        let at = UNIX_EPOCH + Duration::from_millis(u64::try_from(now_ms).unwrap_or(0));
        match self.inner.generate_from_datetime(at) {
            Ok(ulid) => MealId::from_ulid(ulid),
            // Overflow of the random part within one millisecond.
            Err(_) => MealId::from_ulid(Ulid::new()),
        }
    }
}

impl fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}

/// Authoritative meal collection with undo/redo.
#[derive(Debug)]
pub struct MealStore {
    records: HashMap<MealId, MealRecord>,
    order: Vec<MealId>,
    undo: Vec<Op>,
    redo: Vec<Op>,
    ids: IdGenerator,
    calendar: Calendar,
    revision: Revision,
}

impl Default for MealStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MealStore {
    /// Empty store on the system calendar.
    pub fn new() -> Self {
        Self::with_calendar(Calendar::system())
    }

    /// Empty store bucketing and timestamping with `calendar`.
    pub fn with_calendar(calendar: Calendar) -> Self {
        Self {
            records: HashMap::new(),
            order: Vec::new(),
            undo: Vec::new(),
            redo: Vec::new(),
            ids: IdGenerator::new(),
            calendar,
            revision: 0,
        }
    }

    /// Rebuilds a store from persisted records. Undo history starts empty.
    ///
    /// Names are re-normalized; a blank name or a duplicate id fails the
    /// whole load.
    pub fn from_snapshot(meals: Vec<MealRecord>, calendar: Calendar) -> Result<Self, StoreError> {
        let mut store = Self::with_calendar(calendar);
        for mut meal in meals {
            meal.food_name = normalize_food_name(&meal.food_name)?;
            store.apply_create(meal)?;
        }
        Ok(store)
    }

    /// All records in insertion order.
    pub fn export_snapshot(&self) -> Vec<MealRecord> {
        self.records().cloned().collect()
    }

    /// Validates `draft` and inserts it with a fresh id. A target date other than today backfills the timestamp.
    pub fn create(&mut self, draft: MealDraft) -> Result<MealRecord, StoreError> {
        let food_name = normalize_food_name(&draft.food_name)?;
        let now = self.calendar.now_ms();
        let timestamp = match draft.target_date {
            Some(date) => backfill_timestamp(date, now, &self.calendar.zone()),
            None => now,
        };

        let meal = MealRecord {
            id: self.ids.next(now),
            timestamp,
            food_name,
            protein_grams: draft.protein_grams,
            category: draft.category,
            image_url: draft.image_url,
        };

        let inverse = self.apply_create(meal.clone())?;
        self.commit(inverse);
        debug!(id = %meal.id, grams = meal.protein_grams, "meal created");
        Ok(meal)
    }

    /// Replaces mutable fields. `id` and `timestamp` are never touched.
    pub fn update(&mut self, id: MealId, patch: MealPatch) -> Result<MealRecord, StoreError> {
        let patch = patch.validated()?;
        if patch.is_empty() {
            return self.get_cloned(id).ok_or(StoreError::NotFound(id));
        }
        let inverse = self.apply_update(id, patch)?;
        self.commit(inverse);
        debug!(%id, "meal updated");
        self.get_cloned(id).ok_or(StoreError::NotFound(id))
    }

    /// Moves a record onto `target` keeping the current local time-of-day.
    pub fn reschedule(&mut self, id: MealId, target: NaiveDate) -> Result<MealRecord, StoreError> {
        let current = self.records.get(&id).ok_or(StoreError::NotFound(id))?;
        let zone = self.calendar.zone();
        if zone.local_date(current.timestamp) == target {
            return Ok(current.clone());
        }
        let timestamp = backfill_timestamp(target, self.calendar.now_ms(), &zone);
        let inverse = self.apply_reschedule(id, timestamp)?;
        self.commit(inverse);
        debug!(%id, %target, "meal rescheduled");
        self.get_cloned(id).ok_or(StoreError::NotFound(id))
    }

    /// Applies `patch` and, when `target` names a different local day, moves
    /// the record there. Both changes form a single undo step.
    pub fn edit(
        &mut self,
        id: MealId,
        patch: MealPatch,
        target: Option<NaiveDate>,
    ) -> Result<MealRecord, StoreError> {
        let patch = patch.validated()?;
        let zone = self.calendar.zone();
        let current_date = self
            .records
            .get(&id)
            .map(|rec| zone.local_date(rec.timestamp))
            .ok_or(StoreError::NotFound(id))?;
        let timestamp = target
            .filter(|date| *date != current_date)
            .map(|date| backfill_timestamp(date, self.calendar.now_ms(), &zone));

        let inverse = match timestamp {
            None if patch.is_empty() => return self.get_cloned(id).ok_or(StoreError::NotFound(id)),
            None => self.apply_update(id, patch)?,
            Some(timestamp) => self.apply_edit(id, patch, timestamp)?,
        };
        self.commit(inverse);
        debug!(%id, moved = timestamp.is_some(), "meal edited");
        self.get_cloned(id).ok_or(StoreError::NotFound(id))
    }

    /// Removes a record atomically, returning it.
    pub fn delete(&mut self, id: MealId) -> Result<MealRecord, StoreError> {
        let meal = self.remove_record(id)?;
        self.commit(Op::Create { meal: meal.clone() });
        debug!(%id, "meal deleted");
        Ok(meal)
    }

    /// Reverts the latest mutation.
    pub fn undo(&mut self) -> Result<AppliedOp, StoreError> {
        let op = self.undo.pop().ok_or(StoreError::NothingToUndo)?;
        let inverse = self.apply_op(op.clone())?;
        self.redo.push(inverse);
        self.revision += 1;
        Ok(AppliedOp {
            revision: self.revision,
            op,
        })
    }

    /// Reapplies the latest undone mutation.
    pub fn redo(&mut self) -> Result<AppliedOp, StoreError> {
        let op = self.redo.pop().ok_or(StoreError::NothingToRedo)?;
        let inverse = self.apply_op(op.clone())?;
        self.undo.push(inverse);
        self.revision += 1;
        Ok(AppliedOp {
            revision: self.revision,
            op,
        })
    }

    /// Record by id.
    pub fn get(&self, id: MealId) -> Option<&MealRecord> {
        self.records.get(&id)
    }

    /// Owned copy of a record.
    pub fn get_cloned(&self, id: MealId) -> Option<MealRecord> {
        self.get(id).cloned()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &MealRecord> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    /// Records matching `pred`. No implicit filtering.
    pub fn query<F>(&self, mut pred: F) -> Vec<&MealRecord>
    where
        F: FnMut(&MealRecord) -> bool,
    {
        self.records().filter(|rec| pred(rec)).collect()
    }

    /// Owned variant of [`MealStore::query`].
    pub fn query_cloned<F>(&self, pred: F) -> Vec<MealRecord>
    where
        F: FnMut(&MealRecord) -> bool,
    {
        self.query(pred).into_iter().cloned().collect()
    }

    /// Records whose local day is `day`.
    pub fn on_day(&self, day: DayKey) -> Vec<&MealRecord> {
        let zone = self.calendar.zone();
        self.query(|rec| day_key(rec.timestamp, &zone) == day)
    }

    /// Records whose local month is `month`.
    pub fn in_month(&self, month: MonthKey) -> Vec<&MealRecord> {
        let zone = self.calendar.zone();
        self.query(|rec| month_key(rec.timestamp, &zone) == month)
    }

    /// Calendar used for timestamps and bucketing.
    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    /// Count of mutations applied since this store was built.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Depth of the undo stack.
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Depth of the redo stack.
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    fn commit(&mut self, inverse: Op) {
        self.undo.push(inverse);
        self.redo.clear();
        self.revision += 1;
    }

    fn apply_op(&mut self, op: Op) -> Result<Op, StoreError> {
        match op {
            Op::Create { meal } => self.apply_create(meal),
            Op::Update { id, patch, .. } => self.apply_update(id, patch),
            Op::Reschedule { id, timestamp, .. } => self.apply_reschedule(id, timestamp),
            Op::Edit {
                id,
                patch,
                timestamp,
                ..
            } => self.apply_edit(id, patch, timestamp),
            Op::Delete { meal } => self.apply_delete(meal.id),
        }
    }

    fn apply_create(&mut self, meal: MealRecord) -> Result<Op, StoreError> {
        if self.records.contains_key(&meal.id) {
            return Err(StoreError::AlreadyExists(meal.id));
        }
        self.order.push(meal.id);
        self.records.insert(meal.id, meal.clone());
        Ok(Op::Delete { meal })
    }

    fn apply_update(&mut self, id: MealId, patch: MealPatch) -> Result<Op, StoreError> {
        let rec = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let prev = patch.capture_inverse_for(rec);
        patch.apply_to(rec);
        Ok(Op::Update {
            id,
            patch: prev,
            prev: patch,
        })
    }

    fn apply_reschedule(&mut self, id: MealId, timestamp: i64) -> Result<Op, StoreError> {
        let rec = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let prev_timestamp = rec.timestamp;
        rec.timestamp = timestamp;
        Ok(Op::Reschedule {
            id,
            timestamp: prev_timestamp,
            prev_timestamp: timestamp,
        })
    }

    fn apply_edit(&mut self, id: MealId, patch: MealPatch, timestamp: i64) -> Result<Op, StoreError> {
        let rec = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let prev = patch.capture_inverse_for(rec);
        let prev_timestamp = rec.timestamp;
        patch.apply_to(rec);
        rec.timestamp = timestamp;
        Ok(Op::Edit {
            id,
            patch: prev,
            prev: patch,
            timestamp: prev_timestamp,
            prev_timestamp: timestamp,
        })
    }

    fn apply_delete(&mut self, id: MealId) -> Result<Op, StoreError> {
        self.remove_record(id).map(|meal| Op::Create { meal })
    }

    fn remove_record(&mut self, id: MealId) -> Result<MealRecord, StoreError> {
        let meal = self.records.remove(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(pos) = self.order.iter().position(|x| *x == id) {
            self.order.remove(pos);
        }
        Ok(meal)
    }
}
