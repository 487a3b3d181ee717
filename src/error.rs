//! Validation errors and the crate-wide error type.

use thiserror::Error;

use crate::{
    config::ConfigError,
    core::store::StoreError,
    entry::{EntryError, RecognitionFailure},
    persist::PersistError,
    runtime::handle::RuntimeError,
};

/// Bad user input rejected at the boundary. The previous state is always
/// left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Zero or negative goal.
    #[error("goal must be greater than zero")]
    GoalNotPositive,
    /// Goal with a fractional part.
    #[error("goal must be a whole number of grams")]
    GoalNotInteger,
    /// Goal above `u32::MAX` grams.
    #[error("goal is too large")]
    GoalOutOfRange,
    /// Goal text that is not a finite number.
    #[error("goal is not a number: {0:?}")]
    GoalNotNumeric(String),
    /// Blank food name after trimming.
    #[error("food name must not be empty")]
    EmptyFoodName,
    /// Protein text that is not a finite number.
    #[error("protein is not a number: {0:?}")]
    ProteinNotNumeric(String),
    /// Protein below zero.
    #[error("protein must not be negative")]
    ProteinNegative,
    /// Protein too large to store.
    #[error("protein amount is too large")]
    ProteinOutOfRange,
    /// Photo mode without a photo.
    #[error("photo entry requires an image")]
    MissingImage,
    /// Text mode with blank text.
    #[error("text entry requires a description")]
    MissingText,
}

/// Any error produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected input.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Store refusal.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Recognition or image failure.
    #[error(transparent)]
    Recognition(#[from] RecognitionFailure),
    /// Entry pipeline refusal.
    #[error(transparent)]
    Entry(#[from] EntryError),
    /// Storage failure.
    #[error(transparent)]
    Persist(#[from] PersistError),
    /// Runtime handle failure.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    /// Config loading failure.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, Error>;
