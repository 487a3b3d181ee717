//! Recognition service boundary and payload validation.

use std::future::Future;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::{
    entry::image::PreparedImage,
    meal::{normalize_food_name, parse_protein, round_protein},
    types::{Category, ProteinGrams},
};

/// Why a recognition attempt produced no usable result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecognitionFailure {
    /// The service call itself failed.
    #[error("recognition service failed: {0}")]
    Service(String),
    /// The payload was not a JSON object or a field had the wrong shape.
    #[error("malformed recognition payload: {0}")]
    Malformed(String),
    /// A required field was absent.
    #[error("recognition payload is missing `{0}`")]
    MissingField(&'static str),
    /// The image could not be prepared for upload.
    #[error("image preprocessing failed: {0}")]
    Preprocess(String),
}

/// What gets sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecognitionRequest {
    /// Prepared photo, when the capture had one.
    pub image: Option<PreparedImage>,
    /// Trimmed, non-blank description.
    pub text: Option<String>,
}

/// A validated recognition result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    /// Trimmed food name.
    pub food_name: String,
    /// Estimate rounded to whole grams.
    pub protein_grams: ProteinGrams,
    /// Recognized category, `Other` when unknown.
    pub category: Category,
}

/// External content-recognition service.
///
/// Implementations return the raw response body; validation happens in
/// [`parse_recognition`] so a misbehaving service can never crash the caller.
pub trait Recognizer: Send + Sync {
    /// Sends `request` and returns the raw response body.
    fn recognize(
        &self,
        request: &RecognitionRequest,
    ) -> impl Future<Output = Result<String, RecognitionFailure>> + Send;
}

/// Validates a raw service payload.
///
/// Accepts a bare JSON object or one embedded in surrounding prose or a fenced
/// code block. Requires `foodName` (non-empty string), `proteinGrams` (a
/// non-negative number or numeric string) and `category` (unknown values map
/// to [`Category::Other`]).
pub fn parse_recognition(payload: &str) -> Result<Recognition, RecognitionFailure> {
    let body = extract_object(payload)
        .ok_or_else(|| RecognitionFailure::Malformed("no JSON object found".to_string()))?;
    let value: Value = serde_json::from_str(body).map_err(|e| {
        warn!(error = %e, "unparseable recognition payload");
        RecognitionFailure::Malformed(e.to_string())
    })?;
    let obj = value
        .as_object()
        .ok_or_else(|| RecognitionFailure::Malformed("payload is not an object".to_string()))?;

    let food_name = match obj.get("foodName") {
        None | Some(Value::Null) => return Err(RecognitionFailure::MissingField("foodName")),
        Some(Value::String(s)) => normalize_food_name(s)
            .map_err(|_| RecognitionFailure::MissingField("foodName"))?,
        Some(other) => {
            return Err(RecognitionFailure::Malformed(format!(
                "foodName is not a string: {other}"
            )));
        }
    };

    let protein_grams = match obj.get("proteinGrams") {
        None | Some(Value::Null) => return Err(RecognitionFailure::MissingField("proteinGrams")),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| RecognitionFailure::Malformed(format!("proteinGrams out of range: {n}")))
            .and_then(|g| {
                round_protein(g).map_err(|e| RecognitionFailure::Malformed(e.to_string()))
            })?,
        Some(Value::String(s)) => {
            parse_protein(s).map_err(|e| RecognitionFailure::Malformed(e.to_string()))?
        }
        Some(other) => {
            return Err(RecognitionFailure::Malformed(format!(
                "proteinGrams is not a number: {other}"
            )));
        }
    };

    let category = match obj.get("category") {
        None => return Err(RecognitionFailure::MissingField("category")),
        Some(Value::String(s)) => Category::parse_lenient(s),
        Some(_) => Category::Other,
    };

    Ok(Recognition {
        food_name,
        protein_grams,
        category,
    })
}

fn extract_object(payload: &str) -> Option<&str> {
    let start = payload.find('{')?;
    let end = payload.rfind('}')?;
    (start < end).then(|| &payload[start..=end])
}
