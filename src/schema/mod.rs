//! hand.landmarks.v1 input schema
//!
//! This module defines the recorded form of tracker output, used when landmark
//! streams are replayed from files or handed across process boundaries.

mod landmark_event;
mod adapter;

pub use landmark_event::*;
pub use adapter::*;
