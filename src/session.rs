//! Capture and classify sessions
//!
//! A session owns the accumulation state for one capture or classify flow.
//! Each `ingest` call runs one landmark set through normalization, encoding
//! and accumulation. Sessions are not thread-safe; the pipeline gives each one
//! a single owning worker.

use crate::accumulator::DataframeAccumulator;
use crate::config::CaptureSessionConfig;
use crate::encoder::FrameEncoder;
use crate::error::ComputeError;
use crate::normalizer::Rejection;
use crate::scheduler::CollectionGate;
use crate::types::{CapturePayload, Dataframe, Frame, Landmark, Prediction, SessionProgress};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Result of feeding one landmark set to a capture session
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Landmarks were unusable; nothing was buffered
    Rejected(Rejection),
    /// Collection is paused (warmup or cooldown)
    Paused,
    /// Frame buffered towards the current dataframe
    Buffered { buffered: usize },
    /// A dataframe was completed and the session continues
    DataframeCompleted { progress: SessionProgress },
    /// The final dataframe was completed
    SessionCompleted { progress: SessionProgress },
    /// The session had already reached its target
    AlreadyComplete,
}

/// Accumulates labeled dataframes until the target sample count is reached
pub struct CaptureSession {
    id: Uuid,
    config: CaptureSessionConfig,
    dataframes: Vec<Dataframe>,
    accumulator: DataframeAccumulator,
    gate: CollectionGate,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl CaptureSession {
    /// Start a session; the collection gate starts open
    pub fn new(config: CaptureSessionConfig) -> Result<Self, ComputeError> {
        config.validate()?;

        let id = Uuid::new_v4();
        log::info!(
            "capture session {} started: label={}, target={}, mode={}",
            id,
            config.label,
            config.target_sample_count,
            config.mode.as_str()
        );

        Ok(Self {
            id,
            accumulator: DataframeAccumulator::batch(config.dataframe_size),
            dataframes: Vec::with_capacity(config.target_sample_count),
            config,
            gate: CollectionGate::new(),
            started_at: Utc::now(),
            completed_at: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.config.label
    }

    pub fn config(&self) -> &CaptureSessionConfig {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Gate controlling whether frames are collected
    pub fn gate(&self) -> &CollectionGate {
        &self.gate
    }

    /// Completed dataframes
    pub fn dataframes(&self) -> &[Dataframe] {
        &self.dataframes
    }

    /// Frames collected towards the next dataframe
    pub fn buffered_frames(&self) -> usize {
        self.accumulator.len()
    }

    pub fn progress(&self) -> SessionProgress {
        SessionProgress::new(self.dataframes.len(), self.config.target_sample_count)
    }

    pub fn is_complete(&self) -> bool {
        self.dataframes.len() >= self.config.target_sample_count
    }

    /// Feed one landmark set from the tracker
    pub fn ingest(&mut self, landmarks: &[Landmark], reference_width: Option<f32>) -> FrameOutcome {
        if self.is_complete() {
            return FrameOutcome::AlreadyComplete;
        }
        if !self.gate.is_open() {
            return FrameOutcome::Paused;
        }

        match FrameEncoder::prepare(landmarks, &self.config, reference_width) {
            Ok(frame) => self.append(frame),
            Err(rejection) => {
                log::debug!("session {}: frame rejected: {}", self.id, rejection);
                FrameOutcome::Rejected(rejection)
            }
        }
    }

    fn append(&mut self, frame: Frame) -> FrameOutcome {
        let Some(dataframe) = self.accumulator.push(frame) else {
            return FrameOutcome::Buffered {
                buffered: self.accumulator.len(),
            };
        };

        self.dataframes.push(dataframe);
        let progress = self.progress();

        if progress.is_complete {
            self.completed_at = Some(Utc::now());
            self.gate.finish();
            log::info!(
                "capture session {} complete: {} dataframes for '{}'",
                self.id,
                progress.dataframe_count,
                self.config.label
            );
            FrameOutcome::SessionCompleted { progress }
        } else {
            log::info!(
                "capture session {}: {} out of {}",
                self.id,
                progress.dataframe_count,
                progress.target_sample_count
            );
            FrameOutcome::DataframeCompleted { progress }
        }
    }

    /// Copy of the collected data in upload form
    pub fn payload(&self) -> CapturePayload {
        CapturePayload::new(self.config.label.clone(), self.dataframes.clone())
    }

    /// Move the collected data out, leaving the session empty
    pub fn take_payload(&mut self) -> CapturePayload {
        CapturePayload::new(
            self.config.label.clone(),
            std::mem::take(&mut self.dataframes),
        )
    }

    pub fn into_payload(self) -> CapturePayload {
        CapturePayload::new(self.config.label, self.dataframes)
    }
}

/// External model that labels one sliding window
pub trait Classifier {
    /// Classify a window of `dataframe_size` frames, oldest first
    fn classify(&mut self, window: &[Frame]) -> Result<Prediction, ComputeError>;
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
    fn classify(&mut self, window: &[Frame]) -> Result<Prediction, ComputeError> {
        (**self).classify(window)
    }
}

/// Result of feeding one landmark set to a classify session
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifyOutcome {
    /// Landmarks were unusable; the window is unchanged
    Rejected(Rejection),
    /// Frame buffered; the window is not yet full
    Buffered { buffered: usize },
    /// The full window was classified
    Prediction(Prediction),
}

/// Runs a classifier over an overlapping window of recent frames
pub struct ClassifySession<C> {
    config: CaptureSessionConfig,
    accumulator: DataframeAccumulator,
    classifier: C,
    inferences: usize,
}

impl<C: Classifier> ClassifySession<C> {
    pub fn new(config: CaptureSessionConfig, classifier: C) -> Result<Self, ComputeError> {
        config.validate_layout()?;
        Ok(Self {
            accumulator: DataframeAccumulator::sliding(config.dataframe_size),
            config,
            classifier,
            inferences: 0,
        })
    }

    pub fn config(&self) -> &CaptureSessionConfig {
        &self.config
    }

    /// Number of classifier invocations so far
    pub fn inference_count(&self) -> usize {
        self.inferences
    }

    pub fn buffered_frames(&self) -> usize {
        self.accumulator.len()
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Feed one landmark set; classifies whenever the window is full
    pub fn ingest(
        &mut self,
        landmarks: &[Landmark],
        reference_width: Option<f32>,
    ) -> Result<ClassifyOutcome, ComputeError> {
        let frame = match FrameEncoder::prepare(landmarks, &self.config, reference_width) {
            Ok(frame) => frame,
            Err(rejection) => {
                log::debug!("classify: frame rejected: {}", rejection);
                return Ok(ClassifyOutcome::Rejected(rejection));
            }
        };

        match self.accumulator.push(frame) {
            None => Ok(ClassifyOutcome::Buffered {
                buffered: self.accumulator.len(),
            }),
            Some(window) => {
                self.inferences += 1;
                let prediction = self.classifier.classify(&window)?;
                log::debug!(
                    "classify: {} ({:.2})",
                    prediction.label,
                    prediction.confidence
                );
                Ok(ClassifyOutcome::Prediction(prediction))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NormalizationMode;
    use pretty_assertions::assert_eq;

    fn flat_hand(value: f32) -> Vec<Landmark> {
        vec![Landmark::new(value, value, value); 21]
    }

    fn spread_hand(x0: f32) -> Vec<Landmark> {
        (0..21)
            .map(|i| Landmark::new(x0 + 0.01 * i as f32, 0.3 + 0.01 * i as f32, 0.1))
            .collect()
    }

    /// Records every window it is given
    struct RecordingClassifier {
        windows: Vec<Vec<Frame>>,
    }

    impl Classifier for RecordingClassifier {
        fn classify(&mut self, window: &[Frame]) -> Result<Prediction, ComputeError> {
            self.windows.push(window.to_vec());
            Ok(Prediction {
                label: "A".to_string(),
                confidence: 0.9,
            })
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn classify(&mut self, _window: &[Frame]) -> Result<Prediction, ComputeError> {
            Err(ComputeError::ClassifierError("model unavailable".to_string()))
        }
    }

    #[test]
    fn test_default_mode_session_scenario() {
        let config = CaptureSessionConfig::new("A", 2)
            .with_mode(NormalizationMode::Default)
            .with_dataframe_size(10);
        let mut session = CaptureSession::new(config).unwrap();

        for i in 1..=20 {
            let outcome = session.ingest(&flat_hand(0.5), None);
            match i {
                10 => assert!(matches!(outcome, FrameOutcome::DataframeCompleted { .. })),
                20 => assert!(matches!(outcome, FrameOutcome::SessionCompleted { .. })),
                _ => assert!(matches!(outcome, FrameOutcome::Buffered { .. })),
            }
        }

        assert!(session.is_complete());
        assert!(session.completed_at().is_some());

        let payload = session.into_payload();
        assert_eq!(payload.label, "A");
        assert_eq!(payload.dataframes.len(), 2);
        for dataframe in &payload.dataframes {
            assert_eq!(dataframe.len(), 10);
            for frame in dataframe {
                assert_eq!(frame.len(), 126);
                assert!(frame[..63].iter().all(|&v| v == 0.5));
                assert!(frame[63..].iter().all(|&v| v == 0.0));
            }
        }
    }

    #[test]
    fn test_completion_boundary() {
        let config = CaptureSessionConfig::new("B", 3)
            .with_mode(NormalizationMode::Default)
            .with_dataframe_size(2);
        let mut session = CaptureSession::new(config).unwrap();

        for _ in 0..4 {
            session.ingest(&flat_hand(0.4), None);
        }
        assert_eq!(session.progress(), SessionProgress::new(2, 3));
        assert!(!session.is_complete());

        session.ingest(&flat_hand(0.4), None);
        assert!(!session.is_complete());
        let outcome = session.ingest(&flat_hand(0.4), None);
        assert_eq!(
            outcome,
            FrameOutcome::SessionCompleted {
                progress: SessionProgress::new(3, 3)
            }
        );

        assert_eq!(session.ingest(&flat_hand(0.4), None), FrameOutcome::AlreadyComplete);
        assert_eq!(session.dataframes().len(), 3);
        assert_eq!(session.buffered_frames(), 0);
        assert!(session.gate().is_finished());
    }

    #[test]
    fn test_rejection_leaves_state_unchanged() {
        let config = CaptureSessionConfig::new("C", 1).with_dataframe_size(3);
        let mut session = CaptureSession::new(config).unwrap();

        assert!(matches!(
            session.ingest(&spread_hand(0.2), Some(400.0)),
            FrameOutcome::Buffered { buffered: 1 }
        ));

        let mut near_edge = spread_hand(0.2);
        near_edge[0].x = 0.0005;
        let outcome = session.ingest(&near_edge, Some(400.0));

        assert!(matches!(
            outcome,
            FrameOutcome::Rejected(Rejection::NearOrigin { .. })
        ));
        assert_eq!(session.buffered_frames(), 1);
        assert!(session.dataframes().is_empty());
    }

    #[test]
    fn test_closed_gate_pauses_collection() {
        let config = CaptureSessionConfig::new("D", 1)
            .with_mode(NormalizationMode::Default)
            .with_dataframe_size(2);
        let mut session = CaptureSession::new(config).unwrap();

        session.gate().close();
        assert_eq!(session.ingest(&flat_hand(0.5), None), FrameOutcome::Paused);
        assert_eq!(session.buffered_frames(), 0);

        session.gate().open();
        assert!(matches!(
            session.ingest(&flat_hand(0.5), None),
            FrameOutcome::Buffered { buffered: 1 }
        ));
    }

    #[test]
    fn test_take_payload_empties_session() {
        let config = CaptureSessionConfig::new("E", 1)
            .with_mode(NormalizationMode::Default)
            .with_dataframe_size(1);
        let mut session = CaptureSession::new(config).unwrap();
        session.ingest(&flat_hand(0.2), None);

        let payload = session.take_payload();
        assert_eq!(payload.dataframes.len(), 1);
        assert!(session.dataframes().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(CaptureSession::new(CaptureSessionConfig::new("", 1)).is_err());
    }

    #[test]
    fn test_classify_sliding_window() {
        let config = CaptureSessionConfig::new("", 0)
            .with_mode(NormalizationMode::Default)
            .with_dataframe_size(10);
        let classifier = RecordingClassifier {
            windows: Vec::new(),
        };
        let mut session = ClassifySession::new(config, classifier).unwrap();

        for i in 1..=9 {
            let outcome = session.ingest(&flat_hand(i as f32 / 100.0), None).unwrap();
            assert!(matches!(outcome, ClassifyOutcome::Buffered { .. }));
        }
        assert_eq!(session.inference_count(), 0);

        let outcome = session.ingest(&flat_hand(0.10), None).unwrap();
        assert!(matches!(outcome, ClassifyOutcome::Prediction(_)));
        session.ingest(&flat_hand(0.11), None).unwrap();

        let windows = &session.classifier().windows;
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].len(), 10);
        assert_eq!(windows[1].len(), 10);

        let first_tags: Vec<f32> = windows[0].iter().map(|f| f[0]).collect();
        let second_tags: Vec<f32> = windows[1].iter().map(|f| f[0]).collect();
        assert_eq!(first_tags[0], 0.01);
        assert_eq!(second_tags[0], 0.02);
        assert_eq!(second_tags[9], 0.11);
        assert_eq!(&first_tags[1..], &second_tags[..9]);
    }

    #[test]
    fn test_classify_rejection_does_not_slide() {
        let config = CaptureSessionConfig::new("", 0).with_dataframe_size(2);
        let classifier = RecordingClassifier {
            windows: Vec::new(),
        };
        let mut session = ClassifySession::new(config, classifier).unwrap();

        session.ingest(&spread_hand(0.2), Some(640.0)).unwrap();
        let outcome = session.ingest(&spread_hand(0.2), None).unwrap();
        assert_eq!(
            outcome,
            ClassifyOutcome::Rejected(Rejection::MissingReferenceWidth)
        );
        assert_eq!(session.buffered_frames(), 1);
        assert_eq!(session.inference_count(), 0);
    }

    #[test]
    fn test_classifier_errors_propagate() {
        let config = CaptureSessionConfig::new("", 0)
            .with_mode(NormalizationMode::Default)
            .with_dataframe_size(1);
        let mut session = ClassifySession::new(config, FailingClassifier).unwrap();

        let result = session.ingest(&flat_hand(0.5), None);
        assert!(matches!(result, Err(ComputeError::ClassifierError(_))));
    }
}
