//! Mutation operation model used for undo/redo.

use crate::{
    meal::{MealPatch, MealRecord},
    types::{MealId, Revision},
};

/// A reversible store mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Insert a fully materialized record.
    Create {
        /// Inserted record.
        meal: MealRecord,
    },
    /// Patch mutable fields, including the precomputed inverse patch.
    Update {
        /// Record to mutate.
        id: MealId,
        /// Forward patch.
        patch: MealPatch,
        /// Inverse patch that restores prior state.
        prev: MealPatch,
    },
    /// Move a record to another instant.
    Reschedule {
        /// Record to move.
        id: MealId,
        /// New timestamp.
        timestamp: i64,
        /// Timestamp before the move.
        prev_timestamp: i64,
    },
    /// Patch fields and move the record in one step.
    Edit {
        /// Record to mutate.
        id: MealId,
        /// Forward patch.
        patch: MealPatch,
        /// Inverse patch that restores prior state.
        prev: MealPatch,
        /// New timestamp.
        timestamp: i64,
        /// Timestamp before the edit.
        prev_timestamp: i64,
    },
    /// Remove a record, keeping it for the inverse.
    Delete {
        /// Removed record.
        meal: MealRecord,
    },
}

impl Op {
    /// Id of the record this op touches.
    pub fn meal_id(&self) -> MealId {
        match self {
            Op::Create { meal } | Op::Delete { meal } => meal.id,
            Op::Update { id, .. } | Op::Reschedule { id, .. } | Op::Edit { id, .. } => *id,
        }
    }
}

/// An op as applied, tagged with the store revision it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOp {
    /// Revision after this op.
    pub revision: Revision,
    /// Operation body.
    pub op: Op,
}
