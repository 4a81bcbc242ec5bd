//! Pipeline orchestration
//!
//! Two ways to drive a session:
//! - [`capture_events`] and [`sliding_windows`] replay recorded landmark
//!   events synchronously, ignoring warmup and cooldown
//! - [`FramePipeline`] runs one session on a dedicated worker thread fed by a
//!   live tracker. Submission never blocks: a landmark set is handed over
//!   only while the worker waits for one, and dropped otherwise. Undelivered
//!   notifications are capped; the oldest are discarded first.

use crate::accumulator::DataframeAccumulator;
use crate::config::{CaptureSessionConfig, PipelineOptions};
use crate::encoder::FrameEncoder;
use crate::error::ComputeError;
use crate::normalizer::Rejection;
use crate::scheduler::{CollectionGate, CooldownScheduler};
use crate::schema::LandmarkEvent;
use crate::session::{
    CaptureSession, ClassifyOutcome, ClassifySession, Classifier, FrameOutcome,
};
use crate::types::{CapturePayload, Dataframe, Prediction, SessionProgress};
use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Run recorded events through a capture session until it completes.
///
/// Events after completion are ignored. The returned session may be
/// incomplete if the events ran out first.
pub fn capture_events(
    events: &[LandmarkEvent],
    config: CaptureSessionConfig,
) -> Result<CaptureSession, ComputeError> {
    let mut session = CaptureSession::new(config)?;

    for event in events {
        if let FrameOutcome::SessionCompleted { .. } =
            session.ingest(&event.landmarks, event.image_width)
        {
            break;
        }
    }

    Ok(session)
}

/// Every classify-mode window the events produce, oldest first
pub fn sliding_windows(
    events: &[LandmarkEvent],
    config: &CaptureSessionConfig,
) -> Result<Vec<Dataframe>, ComputeError> {
    config.validate_layout()?;
    let mut accumulator = DataframeAccumulator::sliding(config.dataframe_size);

    let windows = events
        .iter()
        .filter_map(|event| FrameEncoder::prepare(&event.landmarks, config, event.image_width).ok())
        .filter_map(|frame| accumulator.push(frame))
        .collect();

    Ok(windows)
}

/// Result of a non-blocking submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Handed to the worker
    Accepted,
    /// Worker busy; the landmark set was discarded
    Dropped,
    /// Discarded, and the worker has been busy longer than the stall timeout
    Stalled,
}

/// Notification from the worker thread
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A landmark set produced no frame
    Rejected(Rejection),
    /// A capture dataframe was completed
    Progress(SessionProgress),
    /// The capture session reached its target
    Completed(CapturePayload),
    /// A classify window was labeled
    Prediction(Prediction),
    /// The classifier failed on a window
    Error(String),
}

const IDLE: u64 = u64::MAX;

/// Records when the worker started on its current landmark set
#[derive(Clone)]
struct BusyClock {
    origin: Instant,
    since_ms: Arc<AtomicU64>,
}

impl BusyClock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
            since_ms: Arc::new(AtomicU64::new(IDLE)),
        }
    }

    fn begin(&self) {
        let now = self.origin.elapsed().as_millis() as u64;
        self.since_ms.store(now, Ordering::Release);
    }

    fn end(&self) {
        self.since_ms.store(IDLE, Ordering::Release);
    }

    fn busy_for(&self) -> Option<Duration> {
        match self.since_ms.load(Ordering::Acquire) {
            IDLE => None,
            since => Some(
                self.origin
                    .elapsed()
                    .saturating_sub(Duration::from_millis(since)),
            ),
        }
    }
}

enum Engine {
    Capture {
        session: CaptureSession,
        cooldown: CooldownScheduler,
    },
    Classify {
        session: ClassifySession<Box<dyn Classifier + Send>>,
    },
}

/// Bounded notification queue where the newest event always gets in
#[derive(Clone)]
struct EventSink {
    tx: Sender<PipelineEvent>,
    oldest: Receiver<PipelineEvent>,
    missed: Arc<AtomicUsize>,
}

impl EventSink {
    fn new(capacity: usize) -> (Self, Receiver<PipelineEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        let sink = Self {
            tx,
            oldest: rx.clone(),
            missed: Arc::new(AtomicUsize::new(0)),
        };
        (sink, rx)
    }

    fn publish(&self, event: PipelineEvent) {
        let mut event = event;
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    event = back;
                    if self.oldest.try_recv().is_ok() {
                        let missed = self.missed.fetch_add(1, Ordering::Relaxed) + 1;
                        log::debug!("event queue full; {} notifications discarded", missed);
                    }
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

impl Engine {
    fn handle(&mut self, event: &LandmarkEvent, events: &EventSink) {
        match self {
            Engine::Capture { session, cooldown } => {
                match session.ingest(&event.landmarks, event.image_width) {
                    FrameOutcome::Rejected(rejection) => {
                        events.publish(PipelineEvent::Rejected(rejection));
                    }
                    FrameOutcome::DataframeCompleted { progress } => {
                        let delay = session.config().cooldown();
                        if !delay.is_zero() {
                            cooldown.pause(session.gate(), delay);
                        }
                        events.publish(PipelineEvent::Progress(progress));
                    }
                    FrameOutcome::SessionCompleted { progress } => {
                        cooldown.cancel();
                        events.publish(PipelineEvent::Progress(progress));
                        events.publish(PipelineEvent::Completed(session.payload()));
                    }
                    FrameOutcome::Paused
                    | FrameOutcome::Buffered { .. }
                    | FrameOutcome::AlreadyComplete => {}
                }
            }
            Engine::Classify { session } => {
                match session.ingest(&event.landmarks, event.image_width) {
                    Ok(ClassifyOutcome::Rejected(rejection)) => {
                        events.publish(PipelineEvent::Rejected(rejection));
                    }
                    Ok(ClassifyOutcome::Prediction(prediction)) => {
                        events.publish(PipelineEvent::Prediction(prediction));
                    }
                    Ok(ClassifyOutcome::Buffered { .. }) => {}
                    Err(e) => {
                        log::warn!("classifier failed: {}", e);
                        events.publish(PipelineEvent::Error(e.to_string()));
                    }
                }
            }
        }
    }

    fn stop(&mut self) {
        if let Engine::Capture { cooldown, .. } = self {
            cooldown.cancel();
        }
    }
}

/// One session running on its own worker thread
pub struct FramePipeline {
    frames: Sender<LandmarkEvent>,
    events: Receiver<PipelineEvent>,
    shutdown: Sender<()>,
    done: Receiver<()>,
    handle: Option<JoinHandle<()>>,
    gate: Option<CollectionGate>,
    busy: BusyClock,
    dropped: Arc<AtomicUsize>,
    missed: Arc<AtomicUsize>,
    stall_timeout: Duration,
}

impl FramePipeline {
    /// Start a capture session worker.
    ///
    /// Collection stays paused for `warmup_ms` after spawning.
    pub fn spawn_capture(
        config: CaptureSessionConfig,
        options: PipelineOptions,
    ) -> Result<Self, ComputeError> {
        let session = CaptureSession::new(config)?;
        let gate = session.gate().clone();

        let mut cooldown = CooldownScheduler::default();
        let warmup = session.config().warmup();
        if !warmup.is_zero() {
            log::info!("collection starts in {:?}", warmup);
            cooldown.pause(&gate, warmup);
        }

        Ok(Self::spawn(
            Engine::Capture { session, cooldown },
            Some(gate),
            options,
        ))
    }

    /// Start a classify session worker
    pub fn spawn_classify(
        config: CaptureSessionConfig,
        classifier: Box<dyn Classifier + Send>,
        options: PipelineOptions,
    ) -> Result<Self, ComputeError> {
        let session = ClassifySession::new(config, classifier)?;
        Ok(Self::spawn(Engine::Classify { session }, None, options))
    }

    fn spawn(engine: Engine, gate: Option<CollectionGate>, options: PipelineOptions) -> Self {
        let (frames_tx, frames_rx) = bounded::<LandmarkEvent>(options.queue_capacity);
        let (sink, events_rx) = EventSink::new(options.event_capacity);
        let missed = Arc::clone(&sink.missed);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let busy = BusyClock::new();

        let worker_busy = busy.clone();
        let handle = thread::spawn(move || {
            run_worker(engine, frames_rx, shutdown_rx, sink, worker_busy);
            let _ = done_tx.send(());
        });

        Self {
            frames: frames_tx,
            events: events_rx,
            shutdown: shutdown_tx,
            done: done_rx,
            handle: Some(handle),
            gate,
            busy,
            dropped: Arc::new(AtomicUsize::new(0)),
            missed,
            stall_timeout: options.stall_timeout(),
        }
    }

    /// Hand a landmark set to the worker without blocking
    pub fn submit(&self, event: LandmarkEvent) -> Result<SubmitOutcome, ComputeError> {
        match self.frames.try_send(event) {
            Ok(()) => Ok(SubmitOutcome::Accepted),
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if self.is_stalled() {
                    log::warn!(
                        "worker stalled for over {:?}; {} landmark sets dropped",
                        self.stall_timeout,
                        dropped
                    );
                    Ok(SubmitOutcome::Stalled)
                } else {
                    log::debug!("worker busy; {} landmark sets dropped", dropped);
                    Ok(SubmitOutcome::Dropped)
                }
            }
            Err(TrySendError::Disconnected(_)) => Err(ComputeError::PipelineClosed),
        }
    }

    /// Hand a landmark set to the worker, waiting until it takes it
    pub fn submit_blocking(&self, event: LandmarkEvent) -> Result<(), ComputeError> {
        self.frames
            .send(event)
            .map_err(|_| ComputeError::PipelineClosed)
    }

    /// Receiver for worker notifications; stays readable after shutdown
    pub fn events(&self) -> Receiver<PipelineEvent> {
        self.events.clone()
    }

    /// Landmark sets discarded because the worker was busy
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Notifications discarded because nobody read them in time
    pub fn missed_event_count(&self) -> usize {
        self.missed.load(Ordering::Relaxed)
    }

    /// Collection gate of a capture session
    pub fn gate(&self) -> Option<&CollectionGate> {
        self.gate.as_ref()
    }

    /// Whether the current landmark set has been processing longer than the stall timeout
    pub fn is_stalled(&self) -> bool {
        self.busy
            .busy_for()
            .map_or(false, |elapsed| elapsed > self.stall_timeout)
    }

    /// Stop the worker, waiting at most `timeout` for it to exit.
    ///
    /// A worker stuck inside a classifier call is left detached.
    pub fn shutdown(mut self, timeout: Duration) -> Result<(), ComputeError> {
        let _ = self.shutdown.try_send(());

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                log::debug!("pipeline worker stopped");
                Ok(())
            }
            Err(RecvTimeoutError::Timeout) => {
                self.handle.take();
                Err(ComputeError::Timeout(format!(
                    "pipeline worker did not stop within {:?}",
                    timeout
                )))
            }
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        let _ = self.shutdown.try_send(());
    }
}

fn run_worker(
    mut engine: Engine,
    frames: Receiver<LandmarkEvent>,
    shutdown: Receiver<()>,
    events: EventSink,
    busy: BusyClock,
) {
    loop {
        select! {
            recv(shutdown) -> _ => break,
            recv(frames) -> msg => {
                match msg {
                    Ok(event) => {
                        busy.begin();
                        engine.handle(&event, &events);
                        busy.end();
                    }
                    Err(_) => break,
                }
            }
        }
    }

    engine.stop();
}
