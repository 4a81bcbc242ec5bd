//! Frame encoding
//!
//! This module lays raw hand vectors out as fixed-width frames. Every frame is
//! the hand's landmark block followed by an equally sized zero block: the
//! stored dataframes and the classifier input are shaped for two hands, and
//! only the first slot is ever filled.

use crate::config::CaptureSessionConfig;
use crate::error::ComputeError;
use crate::normalizer::{Normalizer, Rejection};
use crate::types::{Dataframe, Frame, Landmark};

/// Frame encoder for producing fixed-width frames
pub struct FrameEncoder;

impl FrameEncoder {
    /// Components per landmark (3 in 3D mode, 2 otherwise)
    pub fn components_per_landmark(is_3d: bool) -> usize {
        if is_3d {
            3
        } else {
            2
        }
    }

    /// Width of one hand slot
    pub fn hand_width(is_3d: bool, landmark_count: usize) -> usize {
        landmark_count * Self::components_per_landmark(is_3d)
    }

    /// Width of an encoded frame (two hand slots)
    pub fn frame_width(is_3d: bool, landmark_count: usize) -> usize {
        2 * Self::hand_width(is_3d, landmark_count)
    }

    /// The zero block appended after the real landmark data
    pub fn empty_frame(is_3d: bool, landmark_count: usize) -> Frame {
        vec![0.0; Self::hand_width(is_3d, landmark_count)]
    }

    /// Encode a raw hand vector into a fixed-width frame.
    ///
    /// The raw vector is fitted to exactly one hand slot (zero-filled or cut)
    /// before the empty second slot is appended.
    pub fn encode(raw: Vec<f32>, is_3d: bool, landmark_count: usize) -> Frame {
        let hand_width = Self::hand_width(is_3d, landmark_count);
        let mut frame = raw;

        if frame.len() != hand_width {
            log::debug!(
                "fitting raw vector of {} values to hand slot of {}",
                frame.len(),
                hand_width
            );
            frame.resize(hand_width, 0.0);
        }

        frame.extend(Self::empty_frame(is_3d, landmark_count));
        frame
    }

    /// Normalize and encode one landmark set using a session configuration
    pub fn prepare(
        landmarks: &[Landmark],
        config: &CaptureSessionConfig,
        reference_width: Option<f32>,
    ) -> Result<Frame, Rejection> {
        let raw = Normalizer::normalize(landmarks, config, reference_width)?;
        Ok(Self::encode(raw, config.is_3d, config.landmark_count))
    }

    /// Recover the first hand's landmarks from an encoded frame.
    ///
    /// In 2D mode the depth of every recovered landmark is 0.
    pub fn decode(
        frame: &[f32],
        is_3d: bool,
        landmark_count: usize,
    ) -> Result<Vec<Landmark>, ComputeError> {
        let expected = Self::frame_width(is_3d, landmark_count);
        if frame.len() != expected {
            return Err(ComputeError::EncodingError(format!(
                "expected frame of {} values, got {}",
                expected,
                frame.len()
            )));
        }

        let components = Self::components_per_landmark(is_3d);
        let hand_width = Self::hand_width(is_3d, landmark_count);

        Ok(frame[..hand_width]
            .chunks_exact(components)
            .map(|c| Landmark::new(c[0], c[1], if is_3d { c[2] } else { 0.0 }))
            .collect())
    }

    /// Flatten a dataframe row-major, as `[frame][component]`
    pub fn flatten(dataframe: &[Frame]) -> Vec<f32> {
        dataframe.iter().flatten().copied().collect()
    }

    /// Stack frames into a dataframe, checking every frame has the expected width
    pub fn stack(frames: Vec<Frame>, frame_width: usize) -> Result<Dataframe, ComputeError> {
        if let Some((idx, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.len() != frame_width)
        {
            return Err(ComputeError::EncodingError(format!(
                "frame {} has {} values, expected {}",
                idx,
                frame.len(),
                frame_width
            )));
        }
        Ok(frames)
    }
}
