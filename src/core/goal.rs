use std::{fmt, num::NonZeroU32, str::FromStr};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ValidationError;

/// Goal used when nothing has been persisted yet.
pub const DEFAULT_GOAL_GRAMS: u32 = 150;

/// Daily protein target in grams. Positive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Goal(NonZeroU32);

impl Goal {
    /// Rejects zero.
    pub fn new(grams: u32) -> Result<Self, ValidationError> {
        NonZeroU32::new(grams)
            .map(Self)
            .ok_or(ValidationError::GoalNotPositive)
    }

    /// Accepts only finite, integral, positive values within `u32`.
    pub fn from_f64(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::GoalNotNumeric(value.to_string()));
        }
        if value <= 0.0 {
            return Err(ValidationError::GoalNotPositive);
        }
        if value.fract() != 0.0 {
            return Err(ValidationError::GoalNotInteger);
        }
        if value > f64::from(u32::MAX) {
            return Err(ValidationError::GoalOutOfRange);
        }
        Self::new(value as u32)
    }

    /// Goal in whole grams.
    pub fn grams(&self) -> u32 {
        self.0.get()
    }
}

impl Default for Goal {
    fn default() -> Self {
        Self(NonZeroU32::MIN.saturating_add(DEFAULT_GOAL_GRAMS - 1))
    }
}

impl TryFrom<u32> for Goal {
    type Error = ValidationError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Goal> for u32 {
    fn from(goal: Goal) -> Self {
        goal.grams()
    }
}

impl FromStr for Goal {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<f64>()
            .map_err(|_| ValidationError::GoalNotNumeric(s.to_string()))?;
        Self::from_f64(value)
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}g", self.0)
    }
}

/// Owner of the current daily goal.
#[derive(Debug, Clone, Default)]
pub struct GoalManager {
    goal: Goal,
}

impl GoalManager {
    /// Manager starting at `goal`.
    pub fn new(goal: Goal) -> Self {
        Self { goal }
    }

    /// Current goal, read live by every aggregation.
    pub fn goal(&self) -> Goal {
        self.goal
    }

    /// Validates and applies a numeric goal. On error the previous goal stays.
    pub fn set_goal(&mut self, value: f64) -> Result<Goal, ValidationError> {
        let goal = Goal::from_f64(value)?;
        self.replace(goal);
        Ok(goal)
    }

    /// Same as [`GoalManager::set_goal`] for user-typed text.
    pub fn set_goal_str(&mut self, raw: &str) -> Result<Goal, ValidationError> {
        let goal = raw.parse::<Goal>()?;
        self.replace(goal);
        Ok(goal)
    }

    fn replace(&mut self, goal: Goal) {
        if goal != self.goal {
            info!(from = self.goal.grams(), to = goal.grams(), "goal changed");
        }
        self.goal = goal;
    }
}
