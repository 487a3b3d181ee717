//! Runtime event stream payloads.

use crate::{core::goal::Goal, types::{MealId, Revision}};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// A meal was logged.
    MealCreated {
        /// New meal id.
        id: MealId,
    },
    /// A meal was edited or moved to another day.
    MealUpdated {
        /// Edited meal id.
        id: MealId,
    },
    /// A meal was removed.
    MealDeleted {
        /// Removed meal id.
        id: MealId,
    },
    /// The daily goal changed.
    GoalChanged {
        /// New goal.
        goal: Goal,
    },
    /// One undo step was applied to this meal.
    UndoApplied {
        /// Affected meal id.
        id: MealId,
    },
    /// One redo step was applied to this meal.
    RedoApplied {
        /// Affected meal id.
        id: MealId,
    },
    /// Storage holds every change up to this tracker revision.
    PersistedUpTo {
        /// Highest revision known written.
        revision: Revision,
    },
    /// Storage failed; the rest of the session is in memory only.
    PersistenceDegraded {
        /// Failure description.
        reason: String,
    },
}
