//! handframe - hand landmark frame pipeline
//!
//! handframe turns per-frame hand landmarks from a tracker into fixed-shape
//! numeric samples through a deterministic pipeline: normalization → frame
//! encoding → dataframe accumulation → session delivery.
//!
//! ## Modes
//!
//! - **Capture**: collect labeled, non-overlapping dataframes until a target
//!   count is reached, then hand the payload to a [`upload::SessionSink`]
//! - **Classify**: feed an overlapping window of recent frames to a
//!   [`session::Classifier`] after every new frame

pub mod accumulator;
pub mod config;
pub mod encoder;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod scheduler;
pub mod schema;
pub mod session;
pub mod types;
pub mod upload;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use config::{CaptureSessionConfig, PipelineOptions, UploadConfig};
pub use error::ComputeError;
pub use normalizer::{Normalizer, Rejection};
pub use pipeline::{capture_events, sliding_windows, FramePipeline, PipelineEvent, SubmitOutcome};
pub use session::{CaptureSession, ClassifySession, Classifier, FrameOutcome};
pub use types::{CapturePayload, Dataframe, Frame, Landmark, NormalizationMode, Prediction, SessionProgress};

// Schema exports
pub use schema::{LandmarkEvent, LandmarkEventAdapter, SCHEMA_VERSION};

/// Library version
pub const HANDFRAME_VERSION: &str = env!("CARGO_PKG_VERSION");
