//! Versioned encodings of the persisted values.

use serde::{Deserialize, Serialize};

use crate::{core::goal::Goal, meal::MealRecord};

use super::{PersistError, PersistResult};

/// Version written into every meal snapshot.
pub const MEALS_FORMAT_VERSION: u16 = 1;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MealsEnvelopeRef<'a> {
    format_version: u16,
    meals: &'a [MealRecord],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MealsEnvelope {
    format_version: u16,
    meals: Vec<MealRecord>,
}

/// Meal collection in the current versioned envelope.
pub fn encode_meals(meals: &[MealRecord]) -> PersistResult<Vec<u8>> {
    Ok(serde_json::to_vec(&MealsEnvelopeRef {
        format_version: MEALS_FORMAT_VERSION,
        meals,
    })?)
}

/// Accepts the versioned envelope or a bare array.
pub fn decode_meals(bytes: &[u8]) -> PersistResult<Vec<MealRecord>> {
    if let Ok(envelope) = serde_json::from_slice::<MealsEnvelope>(bytes) {
        if envelope.format_version != MEALS_FORMAT_VERSION {
            return Err(PersistError::UnsupportedFormat(envelope.format_version));
        }
        return Ok(envelope.meals);
    }

    // Unversioned snapshots are a bare array of records.
    Ok(serde_json::from_slice::<Vec<MealRecord>>(bytes)?)
}

/// Goal as a JSON integer.
pub fn encode_goal(goal: Goal) -> PersistResult<Vec<u8>> {
    Ok(serde_json::to_vec(&goal)?)
}

/// Goal from a JSON integer; zero and negatives are rejected.
pub fn decode_goal(bytes: &[u8]) -> PersistResult<Goal> {
    Ok(serde_json::from_slice::<Goal>(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BARE: &str = r#"[{"id":"01HZX3M8Q5T9V2K7N4B6C1D0EF","timestamp":1718900000000,"foodName":"Eggs","proteinGrams":18,"category":"Breakfast"},
        {"id":"01HZX3M8Q5T9V2K7N4B6C1D0EG","timestamp":1718910000000,"foodName":"Shake","proteinGrams":30,"category":"Pre-workout","imageUrl":"data:image/png;base64,AA=="}]"#;

    #[test]
    fn bare_array_is_accepted() {
        let meals = decode_meals(BARE.as_bytes()).unwrap();
        assert_eq!(meals.len(), 2);
        assert_eq!(meals[1].category, crate::types::Category::Other);
        assert!(meals[1].image_url.is_some());
        assert!(meals[0].image_url.is_none());
    }

    #[test]
    fn envelope_carries_version() {
        let meals = decode_meals(BARE.as_bytes()).unwrap();
        let bytes = encode_meals(&meals).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.starts_with(r#"{"formatVersion":1,"meals":["#));
        assert_eq!(decode_meals(&bytes).unwrap(), meals);
    }

    #[test]
    fn future_version_is_rejected() {
        let err = decode_meals(br#"{"formatVersion":9,"meals":[]}"#).unwrap_err();
        assert!(matches!(err, PersistError::UnsupportedFormat(9)));
    }

    #[test]
    fn goal_must_be_positive() {
        assert_eq!(decode_goal(b"120").unwrap().grams(), 120);
        assert!(decode_goal(b"0").is_err());
        assert!(decode_goal(b"-5").is_err());
        assert!(decode_goal(b"\"many\"").is_err());
    }
}
