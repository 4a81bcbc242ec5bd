//! hand.landmarks.v1 schema definition
//!
//! One event carries the landmark set the tracker produced for a single
//! camera frame, plus the pixel width of that frame when it is known.

use crate::types::Landmark;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version
pub const SCHEMA_VERSION: &str = "hand.landmarks.v1";

fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

/// One tracker observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkEvent {
    /// Schema version (defaults to the current one when omitted)
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Capture time of the camera frame
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Pixel width of the image the landmarks are relative to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_width: Option<f32>,
    /// Landmarks of the first detected hand, in tracker order
    pub landmarks: Vec<Landmark>,
}

impl LandmarkEvent {
    /// Create an event stamped with the current time
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        LandmarkEvent {
            schema_version: SCHEMA_VERSION.to_string(),
            event_id: Some(uuid::Uuid::new_v4().to_string()),
            timestamp: Some(Utc::now()),
            image_width: None,
            landmarks,
        }
    }

    pub fn with_image_width(mut self, image_width: f32) -> Self {
        self.image_width = Some(image_width);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Build an event from a flat `[x, y, z, x, y, z, ...]` array
    pub fn from_flat(values: &[f32], image_width: Option<f32>) -> Self {
        let landmarks = values
            .chunks_exact(3)
            .map(|c| Landmark::new(c[0], c[1], c[2]))
            .collect();
        LandmarkEvent {
            image_width,
            ..Self::new(landmarks)
        }
    }

    /// Validate the event schema.
    ///
    /// `expected_count` checks the number of landmarks when set.
    pub fn validate(&self, expected_count: Option<usize>) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        if let Some(width) = self.image_width {
            if !(width.is_finite() && width > 0.0) {
                return Err(ValidationError::InvalidImageWidth { width });
            }
        }

        if let Some(expected) = expected_count {
            if self.landmarks.len() != expected {
                return Err(ValidationError::LandmarkCountMismatch {
                    expected,
                    actual: self.landmarks.len(),
                });
            }
        }

        for (index, lm) in self.landmarks.iter().enumerate() {
            for (axis, value) in [("x", lm.x), ("y", lm.y), ("z", lm.z)] {
                if !value.is_finite() {
                    return Err(ValidationError::NonFiniteCoordinate { index, axis });
                }
            }
        }

        Ok(())
    }
}

/// Validation errors for landmark events
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Invalid image width: {width}")]
    InvalidImageWidth { width: f32 },

    #[error("Expected {expected} landmarks, got {actual}")]
    LandmarkCountMismatch { expected: usize, actual: usize },

    #[error("Landmark {index} has a non-finite {axis} coordinate")]
    NonFiniteCoordinate { index: usize, axis: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hand(count: usize) -> Vec<Landmark> {
        vec![Landmark::new(0.4, 0.5, 0.1); count]
    }

    #[test]
    fn test_minimal_event_parses() {
        let json = r#"{"landmarks": [{"x": 0.1, "y": 0.2}]}"#;
        let event: LandmarkEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.schema_version, SCHEMA_VERSION);
        assert_eq!(event.landmarks, vec![Landmark::new(0.1, 0.2, 0.0)]);
        assert!(event.image_width.is_none());
        assert!(event.validate(None).is_ok());
    }

    #[test]
    fn test_serialize_skips_missing_fields() {
        let mut event = LandmarkEvent::new(hand(1));
        event.event_id = None;
        event.timestamp = None;
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("hand.landmarks.v1"));
        assert!(!json.contains("image_width"));
        assert!(!json.contains("timestamp"));
    }

    #[test]
    fn test_from_flat_ignores_trailing_values() {
        let event = LandmarkEvent::from_flat(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7], Some(640.0));
        assert_eq!(event.landmarks.len(), 2);
        assert_eq!(event.landmarks[1], Landmark::new(0.4, 0.5, 0.6));
        assert_eq!(event.image_width, Some(640.0));
    }

    #[test]
    fn test_validate_landmark_count() {
        let event = LandmarkEvent::new(hand(20));
        assert_eq!(
            event.validate(Some(21)),
            Err(ValidationError::LandmarkCountMismatch {
                expected: 21,
                actual: 20
            })
        );
        assert!(LandmarkEvent::new(hand(21)).validate(Some(21)).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut landmarks = hand(3);
        landmarks[2].y = f32::NAN;
        assert_eq!(
            LandmarkEvent::new(landmarks).validate(None),
            Err(ValidationError::NonFiniteCoordinate { index: 2, axis: "y" })
        );

        let event = LandmarkEvent::new(hand(3)).with_image_width(0.0);
        assert!(matches!(
            event.validate(None),
            Err(ValidationError::InvalidImageWidth { .. })
        ));

        let mut event = LandmarkEvent::new(hand(3));
        event.schema_version = "hand.landmarks.v0".to_string();
        assert!(matches!(
            event.validate(None),
            Err(ValidationError::InvalidSchemaVersion { .. })
        ));
    }
}
