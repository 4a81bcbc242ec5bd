//! Core types for the handframe pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: tracker landmarks, encoded frames, dataframes, session progress and
//! the capture payload handed to the uploader.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One encoded, fixed-width numeric vector derived from a single landmark set
pub type Frame = Vec<f32>;

/// An ordered, fixed-length sequence of frames
pub type Dataframe = Vec<Frame>;

/// A single tracked point on a hand
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    /// Horizontal position, relative to image width (0-1)
    pub x: f32,
    /// Vertical position, relative to image height (0-1)
    pub y: f32,
    /// Depth estimate
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Transform policy applied to each landmark set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMode {
    /// Pass-through with optional horizontal mirroring
    Default,
    /// Bounding-box relative rescale with quantization
    #[default]
    ScaleAndTranslate,
}

impl NormalizationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NormalizationMode::Default => "default",
            NormalizationMode::ScaleAndTranslate => "scale_and_translate",
        }
    }
}

/// Read model of a capture session, used for progress display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    /// Completed dataframes so far
    pub dataframe_count: usize,
    /// Dataframes required to complete the session
    pub target_sample_count: usize,
    /// Whether the target has been reached
    pub is_complete: bool,
}

impl SessionProgress {
    pub fn new(dataframe_count: usize, target_sample_count: usize) -> Self {
        Self {
            dataframe_count,
            target_sample_count,
            is_complete: dataframe_count >= target_sample_count,
        }
    }
}

/// Classifier output for one sliding window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// Probability of `label` (0-1)
    pub confidence: f64,
}

/// Completed capture session as handed to the uploader.
///
/// Serializes to `{ "<label>": [dataframe, ...] }`, which is the body the
/// collection server's `/save` route expects.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturePayload {
    pub label: String,
    pub dataframes: Vec<Dataframe>,
}

impl CapturePayload {
    pub fn new(label: impl Into<String>, dataframes: Vec<Dataframe>) -> Self {
        Self {
            label: label.into(),
            dataframes,
        }
    }

    /// Serialize to the upload wire format
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse the upload wire format
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Serialize for CapturePayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.label, &self.dataframes)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for CapturePayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<String, Vec<Dataframe>>::deserialize(deserializer)?;
        let mut entries = entries.into_iter();
        match (entries.next(), entries.next()) {
            (Some((label, dataframes)), None) => Ok(Self { label, dataframes }),
            _ => Err(de::Error::custom(
                "capture payload must contain exactly one label",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_wire_shape() {
        let payload = CapturePayload::new("A", vec![vec![vec![0.5, 0.25], vec![0.0, 1.0]]]);
        let value: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();

        assert_eq!(value["A"][0][0][0], 0.5);
        assert_eq!(value["A"][0][1][1], 1.0);
        assert_eq!(value.as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_payload_requires_single_label() {
        assert!(CapturePayload::from_json(r#"{"A": [], "B": []}"#).is_err());
        assert!(CapturePayload::from_json(r#"{}"#).is_err());

        let parsed = CapturePayload::from_json(r#"{"Heart": [[[1.0, 2.0]]]}"#).unwrap();
        assert_eq!(parsed.label, "Heart");
        assert_eq!(parsed.dataframes, vec![vec![vec![1.0, 2.0]]]);
    }

    #[test]
    fn test_progress_completion_boundary() {
        assert!(!SessionProgress::new(1, 2).is_complete);
        assert!(SessionProgress::new(2, 2).is_complete);
    }

    #[test]
    fn test_mode_serialization() {
        let json = serde_json::to_string(&NormalizationMode::ScaleAndTranslate).unwrap();
        assert_eq!(json, "\"scale_and_translate\"");
        assert_eq!(NormalizationMode::default(), NormalizationMode::ScaleAndTranslate);
    }
}
