//! Key-value persistence of the meal collection and the goal.
//!
//! Both values are read once at startup and rewritten in full after every
//! mutation. Nothing here is fatal: a value that cannot be read or decoded
//! leaves the session running in memory only, so a damaged snapshot is never
//! overwritten with an empty one.

/// In-process store.
pub mod memory;
/// Snapshot encodings.
pub mod snapshot;
/// SQLite-backed store.
pub mod sqlite;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    calendar::Calendar,
    core::{
        goal::{Goal, GoalManager},
        store::{MealStore, StoreError},
    },
};

/// Storage or encoding failure.
#[derive(Debug, Error)]
pub enum PersistError {
    /// SQLite call failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Snapshot written by an unknown format version.
    #[error("unsupported snapshot format version {0}")]
    UnsupportedFormat(u16),
    /// Any other failure.
    #[error("{0}")]
    Message(String),
}

impl From<StoreError> for PersistError {
    fn from(value: StoreError) -> Self {
        Self::Message(format!("store error: {value}"))
    }
}

/// Result alias for persistence calls.
pub type PersistResult<T> = Result<T, PersistError>;

/// Opaque byte store keyed by name.
pub trait KvStore: Send {
    /// Value under `key`, `None` if absent.
    fn get(&self, key: &str) -> PersistResult<Option<Vec<u8>>>;
    /// Replaces the value under `key`.
    fn set(&mut self, key: &str, value: &[u8]) -> PersistResult<()>;
    /// Makes earlier writes durable.
    fn flush(&mut self) -> PersistResult<()> {
        Ok(())
    }
}

/// Names under which the two persisted values live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    /// Key of the meal collection.
    pub meals: String,
    /// Key of the goal.
    pub goal: String,
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            meals: "proteinlog.meals".to_string(),
            goal: "proteinlog.goal".to_string(),
        }
    }
}

/// Session state rebuilt from storage.
#[derive(Debug)]
pub struct LoadedState {
    /// Loaded meals.
    pub store: MealStore,
    /// Loaded or default goal.
    pub goals: GoalManager,
    /// True when anything failed to load; the session must not write back.
    pub degraded: bool,
}

/// Reads the meal collection and goal, falling back to an empty store and
/// `default_goal` for anything missing or unreadable.
pub fn load_state(
    kv: &dyn KvStore,
    keys: &StorageKeys,
    calendar: Calendar,
    default_goal: Goal,
) -> LoadedState {
    let mut degraded = false;

    let store = match read_meals(kv, &keys.meals, calendar.clone()) {
        Ok(store) => store,
        Err(err) => {
            warn!(error = %err, key = %keys.meals, "could not load meals; continuing in memory only");
            degraded = true;
            MealStore::with_calendar(calendar)
        }
    };

    let goal = match kv.get(&keys.goal).and_then(|raw| raw.map(|b| snapshot::decode_goal(&b)).transpose()) {
        Ok(goal) => goal.unwrap_or(default_goal),
        Err(err) => {
            warn!(error = %err, key = %keys.goal, "could not load goal; continuing in memory only");
            degraded = true;
            default_goal
        }
    };

    info!(meals = store.len(), goal = goal.grams(), degraded, "state loaded");
    LoadedState {
        store,
        goals: GoalManager::new(goal),
        degraded,
    }
}

fn read_meals(kv: &dyn KvStore, key: &str, calendar: Calendar) -> PersistResult<MealStore> {
    let meals = match kv.get(key)? {
        Some(bytes) => snapshot::decode_meals(&bytes)?,
        None => Vec::new(),
    };
    Ok(MealStore::from_snapshot(meals, calendar)?)
}
