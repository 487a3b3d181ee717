//! Meal domain record, draft, and patch types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    error::ValidationError,
    types::{Category, MealId, ProteinGrams},
};

/// Fully materialized, authoritative meal record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MealRecord {
    /// Stable meal identifier.
    pub id: MealId,
    /// Milliseconds since epoch. Fixed at creation.
    pub timestamp: i64,
    /// Trimmed, non-empty display name.
    pub food_name: String,
    /// Whole grams of protein.
    pub protein_grams: ProteinGrams,
    /// Meal category.
    #[serde(default)]
    pub category: Category,
    /// Embedded image reference, when a photo was attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Create payload used to build a new [`MealRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MealDraft {
    /// Untrimmed name; normalized on create.
    pub food_name: String,
    /// Whole grams of protein.
    pub protein_grams: ProteinGrams,
    /// Meal category.
    pub category: Category,
    /// Embedded image reference.
    pub image_url: Option<String>,
    /// Calendar day the meal belongs to; `None` means today.
    pub target_date: Option<NaiveDate>,
}

impl MealDraft {
    /// Draft for today in [`Category::Other`] with no image.
    pub fn new(food_name: impl Into<String>, protein_grams: ProteinGrams) -> Self {
        Self {
            food_name: food_name.into(),
            protein_grams,
            category: Category::Other,
            image_url: None,
            target_date: None,
        }
    }

    /// Sets the category.
    pub fn category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }

    /// Attaches an image reference.
    pub fn image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }

    /// Logs the meal on `date` instead of today.
    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.target_date = Some(date);
        self
    }
}

/// Sparse patch where each `Some` field overwrites the record value.
///
/// `image_url: Some(None)` clears the image.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MealPatch {
    /// Optional replacement for the food name.
    pub food_name: Option<String>,
    /// Optional replacement for protein grams.
    pub protein_grams: Option<ProteinGrams>,
    /// Optional replacement for the category.
    pub category: Option<Category>,
    /// Optional replacement for the image reference.
    pub image_url: Option<Option<String>>,
}

impl MealPatch {
    /// Returns true when no fields are set.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Trims the food name and rejects an empty one.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        if let Some(name) = self.food_name.take() {
            self.food_name = Some(normalize_food_name(&name)?);
        }
        Ok(self)
    }

    /// Captures an inverse patch for all fields present in `self`.
    pub fn capture_inverse_for(&self, rec: &MealRecord) -> Self {
        Self {
            food_name: self.food_name.as_ref().map(|_| rec.food_name.clone()),
            protein_grams: self.protein_grams.map(|_| rec.protein_grams),
            category: self.category.map(|_| rec.category),
            image_url: self.image_url.as_ref().map(|_| rec.image_url.clone()),
        }
    }

    /// Applies this patch in place to `rec`.
    pub fn apply_to(&self, rec: &mut MealRecord) {
        if let Some(v) = &self.food_name {
            rec.food_name = v.clone();
        }
        if let Some(v) = self.protein_grams {
            rec.protein_grams = v;
        }
        if let Some(v) = self.category {
            rec.category = v;
        }
        if let Some(v) = &self.image_url {
            rec.image_url = v.clone();
        }
    }
}

/// Trimmed food name, or [`ValidationError::EmptyFoodName`].
pub fn normalize_food_name(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyFoodName);
    }
    Ok(trimmed.to_string())
}

/// Rounds a possibly fractional protein estimate to whole grams.
pub fn round_protein(grams: f64) -> Result<ProteinGrams, ValidationError> {
    if !grams.is_finite() {
        return Err(ValidationError::ProteinNotNumeric(grams.to_string()));
    }
    if grams < 0.0 {
        return Err(ValidationError::ProteinNegative);
    }
    let rounded = grams.round();
    if rounded > f64::from(ProteinGrams::MAX) {
        return Err(ValidationError::ProteinOutOfRange);
    }
    Ok(rounded as ProteinGrams)
}

/// Parses user-typed protein text such as `"32"`, `" 27.6 "` or `"40g"`.
pub fn parse_protein(raw: &str) -> Result<ProteinGrams, ValidationError> {
    let trimmed = raw.trim();
    let number = trimmed
        .strip_suffix('g')
        .or_else(|| trimmed.strip_suffix('G'))
        .unwrap_or(trimmed)
        .trim_end();
    let value = number
        .parse::<f64>()
        .map_err(|_| ValidationError::ProteinNotNumeric(raw.to_string()))?;
    if !value.is_finite() {
        return Err(ValidationError::ProteinNotNumeric(raw.to_string()));
    }
    round_protein(value)
}
