//! Parsing and validation of recorded landmark streams
//!
//! Recorded sessions are stored either as a JSON array of events or as NDJSON
//! with one event per line.

use crate::error::ComputeError;
use crate::schema::landmark_event::*;

/// Adapter for reading landmark events from JSON input
pub struct LandmarkEventAdapter;

impl LandmarkEventAdapter {
    /// Parse a JSON string containing an array of LandmarkEvents
    pub fn parse_array(json: &str) -> Result<Vec<LandmarkEvent>, ComputeError> {
        let events: Vec<LandmarkEvent> = serde_json::from_str(json)?;
        Ok(events)
    }

    /// Parse NDJSON (newline-delimited JSON) containing LandmarkEvents
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<LandmarkEvent>, ComputeError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<LandmarkEvent>(trimmed) {
                Ok(event) => events.push(event),
                Err(e) => {
                    return Err(ComputeError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(events)
    }

    /// Parse either format, picking by the first non-blank character
    pub fn parse(input: &str) -> Result<Vec<LandmarkEvent>, ComputeError> {
        if input.trim_start().starts_with('[') {
            Self::parse_array(input)
        } else {
            Self::parse_ndjson(input)
        }
    }

    /// Validate a batch of events, returning only the failures
    pub fn validate_events(
        events: &[LandmarkEvent],
        expected_count: Option<usize>,
    ) -> Vec<ValidationResult> {
        events
            .iter()
            .enumerate()
            .filter_map(|(idx, event)| {
                event
                    .validate(expected_count)
                    .err()
                    .map(|error| ValidationResult {
                        index: idx,
                        event_id: event.event_id.clone(),
                        error,
                    })
            })
            .collect()
    }
}

/// A single failed event
#[derive(Debug)]
pub struct ValidationResult {
    pub index: usize,
    pub event_id: Option<String>,
    pub error: ValidationError,
}
