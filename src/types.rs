//! Shared primitive IDs and meal-related enums.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Protein amount in whole grams.
pub type ProteinGrams = u32;
/// Monotonic mutation counter.
pub type Revision = u64;

/// Opaque, immutable meal identifier.
///
/// Backed by a ULID: a millisecond timestamp prefix followed by 80 random
/// bits. Ids handed out by one [`crate::core::store::MealStore`] are strictly
/// increasing, and the store refuses to hold two records with the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MealId(Ulid);

impl MealId {
    /// Wraps an existing ULID.
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Underlying ULID.
    pub fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for MealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for MealId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// Meal category bucket.
///
/// Unknown serialized values decode as [`Category::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum Category {
    /// Morning meal.
    Breakfast,
    /// Midday meal.
    Lunch,
    /// Evening meal.
    Dinner,
    /// Anything between meals.
    Snack,
    /// Fallback for anything unrecognized.
    #[default]
    #[serde(other)]
    Other,
}

impl Category {
    /// All categories in display order.
    pub const ALL: [Category; 5] = [
        Category::Breakfast,
        Category::Lunch,
        Category::Dinner,
        Category::Snack,
        Category::Other,
    ];

    /// Lenient, case-insensitive parse. Never fails: unknown input maps to
    /// [`Category::Other`].
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "breakfast" => Self::Breakfast,
            "lunch" => Self::Lunch,
            "dinner" => Self::Dinner,
            "snack" | "snacks" => Self::Snack,
            _ => Self::Other,
        }
    }

    /// Canonical display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breakfast => "Breakfast",
            Self::Lunch => "Lunch",
            Self::Dinner => "Dinner",
            Self::Snack => "Snack",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
