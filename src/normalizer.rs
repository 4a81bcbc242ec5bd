//! Landmark normalization
//!
//! This module turns one tracker landmark set into the raw (unpadded) vector
//! for a single hand.
//! - `Default`: coordinates passed through, x optionally mirrored
//! - `ScaleAndTranslate`: landmarks moved to the bounding box origin and scaled
//!   so the hand spans a fixed width, quantized to `1 / rounding_scale`
//!
//! A rejected landmark set is reported as a [`Rejection`], never as an empty or
//! all-zero vector.

use crate::config::CaptureSessionConfig;
use crate::types::{Landmark, NormalizationMode};
use thiserror::Error;

/// Bounding box edges at or below this value mean the hand was not reliably detected
pub const DETECTION_THRESHOLD: f32 = 0.001;

/// Width the hand is rescaled to in `ScaleAndTranslate` mode
pub const SCALED_HAND_WIDTH: f32 = 400.0;

/// Why a landmark set produced no frame
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum Rejection {
    #[error("no reference image width available")]
    MissingReferenceWidth,

    #[error("hand too close to the image edge (left={left}, right={right}, top={top})")]
    NearOrigin { left: f32, right: f32, top: f32 },

    #[error("non-positive hand width in image: {width_in_image}")]
    DegenerateWidth { width_in_image: f32 },
}

/// Normalizer for converting tracker landmarks into raw frame vectors
pub struct Normalizer;

impl Normalizer {
    /// Normalize one landmark set according to the session configuration.
    ///
    /// `reference_width` is the pixel width of the image the landmarks are
    /// relative to; only `ScaleAndTranslate` needs it.
    pub fn normalize(
        landmarks: &[Landmark],
        config: &CaptureSessionConfig,
        reference_width: Option<f32>,
    ) -> Result<Vec<f32>, Rejection> {
        match config.mode {
            NormalizationMode::Default => {
                Ok(pass_through(landmarks, config.mirror_x, config.is_3d))
            }
            NormalizationMode::ScaleAndTranslate => scale_and_translate(
                landmarks,
                reference_width,
                config.is_3d,
                config.rounding_scale,
            ),
        }
    }
}

fn pass_through(landmarks: &[Landmark], mirror_x: bool, is_3d: bool) -> Vec<f32> {
    let components = if is_3d { 3 } else { 2 };
    let mut data = Vec::with_capacity(landmarks.len() * components);

    for lm in landmarks {
        let x = if mirror_x { 1.0 - lm.x } else { lm.x };
        data.push(x);
        data.push(lm.y);
        if is_3d {
            data.push(lm.z);
        }
    }

    data
}

fn scale_and_translate(
    landmarks: &[Landmark],
    reference_width: Option<f32>,
    is_3d: bool,
    rounding_scale: f32,
) -> Result<Vec<f32>, Rejection> {
    let image_width = reference_width.ok_or(Rejection::MissingReferenceWidth)?;

    let (left, right, top) = bounds(landmarks);
    if left <= DETECTION_THRESHOLD || right <= DETECTION_THRESHOLD || top <= DETECTION_THRESHOLD {
        return Err(Rejection::NearOrigin { left, right, top });
    }

    let width_in_image = image_width * (right - left);
    // Negated comparison so a NaN width is rejected too
    if !(width_in_image > 0.0) {
        return Err(Rejection::DegenerateWidth { width_in_image });
    }

    let scale = SCALED_HAND_WIDTH / width_in_image;
    let components = if is_3d { 3 } else { 2 };
    let mut data = Vec::with_capacity(landmarks.len() * components);

    for lm in landmarks {
        data.push(quantize(rounding_scale * scale * (lm.x - left), rounding_scale));
        data.push(quantize(rounding_scale * scale * (lm.y - top), rounding_scale));
        // Depth is not scaled in this mode; the slot is kept for layout only
        if is_3d {
            data.push(0.0);
        }
    }

    Ok(data)
}

/// `(left, right, top)` of the landmark set; all zero when it is empty
fn bounds(landmarks: &[Landmark]) -> (f32, f32, f32) {
    if landmarks.is_empty() {
        return (0.0, 0.0, 0.0);
    }

    landmarks.iter().fold(
        (f32::INFINITY, f32::NEG_INFINITY, f32::INFINITY),
        |(left, right, top), lm| (left.min(lm.x), right.max(lm.x), top.min(lm.y)),
    )
}

/// Round half away from zero, then divide back down
fn quantize(scaled: f32, rounding_scale: f32) -> f32 {
    scaled.round() / rounding_scale
}
