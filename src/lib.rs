//! Protein intake tracking: an authoritative meal log, local-time day and
//! month bucketing, goal progress, and a single-writer async runtime that
//! persists to a key-value store.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::MealStore`]:
//! ```
//! use std::sync::Arc;
//!
//! use proteinlog::{
//!     aggregate,
//!     calendar::{Calendar, ManualClock, Zone},
//!     core::{goal::Goal, store::MealStore},
//!     meal::MealDraft,
//!     types::Category,
//! };
//!
//! // Monday 2024-03-11, 09:00 UTC.
//! let calendar = Calendar::new(Zone::utc(), Arc::new(ManualClock::new(1_710_147_600_000)));
//! let mut store = MealStore::with_calendar(calendar.clone());
//! store.create(MealDraft::new("Greek yogurt", 30).category(Category::Breakfast))?;
//! store.create(MealDraft::new("Chicken salad", 45))?;
//! store.create(MealDraft::new("Salmon", 50))?;
//!
//! let goal = Goal::new(120)?;
//! let total = aggregate::today_total(store.records(), calendar.today_key(), &calendar.zone());
//! assert_eq!(total, 125);
//! assert_eq!(aggregate::progress_percent(total, goal), 100.0);
//! assert_eq!(aggregate::remaining(total, goal), 0);
//! # Ok::<(), proteinlog::Error>(())
//! ```
//!
//! Runtime usage with SQLite storage:
//! ```no_run
//! use proteinlog::{
//!     calendar::Calendar,
//!     config::TrackerConfig,
//!     meal::MealDraft,
//!     persist::sqlite::SqliteKvStore,
//!     runtime::open_tracker,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> proteinlog::Result<()> {
//! let kv = SqliteKvStore::open("proteinlog.db")?;
//! let handle = open_tracker(Box::new(kv), Calendar::system(), &TrackerConfig::default())?;
//! handle.create(MealDraft::new("Eggs", 18)).await?;
//! let today = handle.today().await?;
//! println!("{}g of {}g", today.total, today.goal);
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]

/// Pure aggregation over meal records.
pub mod aggregate;
/// Local-time day and month bucketing.
pub mod calendar;
/// Tracker settings.
pub mod config;
/// Core in-memory store and goal manager.
pub mod core;
/// Photo, text and manual entry flow.
pub mod entry;
/// Error types.
pub mod error;
/// Meal records, drafts and patches.
pub mod meal;
/// Mutation op model used by undo/redo.
pub mod op;
/// Key-value persistence and snapshot encoding.
pub mod persist;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Shared primitive types and enums.
pub mod types;

pub use error::{Error, Result, ValidationError};
