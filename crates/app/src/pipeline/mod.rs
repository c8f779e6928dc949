//! One translation pipeline per (listener, speaker) language pair.
//!
//! Three cooperative tasks joined by two bounded hand-offs:
//!
//! ```text
//! stt reader --(events, mpsc 16)--> buffer worker --(speak queue, 8)--> tts writer
//! ```
//!
//! The buffer worker is the only writer of the segment map; the speak queue
//! preserves segment order into synthesis. Nothing here shares mutable
//! state across pipelines.

pub mod buffer;

use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crosstalk_foundation::{Language, PipelineError, ProviderError};
use crosstalk_profile::ProfileSnapshot;
use crosstalk_stt::{SttPlugin, SttStreamConfig};
use crosstalk_telemetry::PipelineMetrics;
use crosstalk_translate::{TranslationPreferences, TranslationRequest, Translator};
use crosstalk_transport::{RoomTransport, TrackId, TrackInfo, TrackKind};
use crosstalk_tts::{SynthesisEvent, TtsEngine};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use buffer::{BufferAction, BufferConfig, TranslationBuffer};

const STT_EVENT_QUEUE: usize = 16;
const TICK_INTERVAL: Duration = Duration::from_millis(50);
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Ordered pair identifying a pipeline: who hears, who spoke.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub listener: String,
    pub speaker: String,
}

impl fmt::Display for PipelineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<-{}", self.listener, self.speaker)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Initializing,
    Running,
    Draining,
    Failed,
    Terminated,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Initializing => "initializing",
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Failed => "failed",
            PipelineState::Terminated => "terminated",
        }
    }
}

/// Failure report sent to the coordinator.
#[derive(Debug, Clone)]
pub struct PipelineFailure {
    pub key: PipelineKey,
    pub error: PipelineError,
}

/// What a pipeline is built for.
#[derive(Clone)]
pub struct PipelineSpec {
    pub listener: ProfileSnapshot,
    pub speaker_identity: String,
    pub source_language: Language,
    pub speaker_track: TrackId,
}

/// Shared services a pipeline borrows from the room.
#[derive(Clone)]
pub struct PipelineDeps {
    pub stt: Arc<dyn SttPlugin>,
    pub translator: Arc<dyn Translator>,
    pub tts: Arc<dyn TtsEngine>,
    pub transport: Arc<dyn RoomTransport>,
    pub buffer_config: BufferConfig,
}

struct SpeakJob {
    segment_id: u64,
    text: String,
    first_seen: Instant,
}

/// Order-preserving bounded queue into the TTS writer. Overflow evicts the
/// oldest unspoken job so STT-side progress never blocks on synthesis.
struct SpeakQueue {
    jobs: Mutex<VecDeque<SpeakJob>>,
    notify: Notify,
    closed: AtomicBool,
    capacity: usize,
}

impl SpeakQueue {
    fn new(capacity: usize) -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            capacity,
        }
    }

    /// Push a job, returning the evicted oldest job when full.
    fn push(&self, job: SpeakJob) -> Option<SpeakJob> {
        let mut jobs = self.jobs.lock();
        let evicted = if jobs.len() >= self.capacity {
            jobs.pop_front()
        } else {
            None
        };
        jobs.push_back(job);
        drop(jobs);
        self.notify.notify_one();
        evicted
    }

    async fn pop(&self) -> Option<SpeakJob> {
        loop {
            if let Some(job) = self.jobs.lock().pop_front() {
                return Some(job);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        // Store a permit for a popper that has checked `closed` but not yet
        // parked, so close can never strand it.
        self.notify.notify_one();
    }

    fn is_drained(&self) -> bool {
        self.jobs.lock().is_empty()
    }
}

/// Handle to a running pipeline, owned by the coordinator.
pub struct Pipeline {
    pub key: PipelineKey,
    pub source_language: Language,
    pub target_language: Language,
    pub metrics: PipelineMetrics,
    pub out_track: TrackInfo,
    state: Arc<RwLock<PipelineState>>,
    shutdown_tx: watch::Sender<bool>,
    speak_queue: Arc<SpeakQueue>,
    tasks: Vec<JoinHandle<()>>,
    transport: Arc<dyn RoomTransport>,
}

impl Pipeline {
    pub fn state(&self) -> PipelineState {
        *self.state.read()
    }

    /// Build and start a pipeline. Fails fast on permanent provider errors
    /// so the coordinator can quarantine the parameters.
    pub async fn spawn(
        spec: PipelineSpec,
        deps: PipelineDeps,
        failure_tx: mpsc::Sender<PipelineFailure>,
    ) -> Result<Pipeline, PipelineError> {
        let key = PipelineKey {
            listener: spec.listener.identity.clone(),
            speaker: spec.speaker_identity.clone(),
        };
        let target_language = spec.listener.native_language;
        let state = Arc::new(RwLock::new(PipelineState::Initializing));
        info!(target: "pipeline", %key, source = %spec.source_language, target = %target_language, "pipeline initializing");

        // TTS availability is checked up front so a bad avatar fails the
        // pipeline before any track is published.
        if !deps.tts.is_available().await {
            return Err(ProviderError::Unavailable("tts engine unavailable".into()).into());
        }

        let stt_config = SttStreamConfig::low_latency(spec.source_language);
        let mut stt_stream = deps.stt.open_stream(stt_config).await?;

        let mut audio_tap = deps.transport.open_audio_tap(&spec.speaker_track).await?;

        let out_track = deps
            .transport
            .publish_track(
                TrackKind::Translated,
                Some(&key.listener),
                Some(&key.speaker),
            )
            .await?;

        let metrics = PipelineMetrics::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let speak_queue = Arc::new(SpeakQueue::new(deps.buffer_config.speak_queue_capacity));

        let (stt_events_tx, stt_events_rx) = mpsc::channel(STT_EVENT_QUEUE);
        let (speech_done_tx, speech_done_rx) = mpsc::channel::<u64>(16);

        // ── STT reader ─────────────────────────────────────────────
        // Two halves: a frame pusher feeding speaker audio into the stream
        // and an event forwarder draining transcripts toward the buffer.
        let frame_sink = stt_stream
            .frame_sink()
            .ok_or(ProviderError::Closed)?;
        let pusher_metrics = metrics.clone();
        let mut pusher_shutdown = shutdown_rx.clone();
        let frame_pusher = tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_frame = audio_tap.recv() => {
                        match maybe_frame {
                            Some(frame) => {
                                pusher_metrics.stt_frames_in.fetch_add(1, Ordering::Relaxed);
                                if frame_sink.push_frame(frame).is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    _ = pusher_shutdown.changed() => break,
                }
            }
            debug!(target: "pipeline", "stt frame pusher stopped");
        });

        let reader_metrics = metrics.clone();
        let mut reader_shutdown = shutdown_rx.clone();
        let stt_reader = tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_event = stt_stream.next_event() => {
                        match maybe_event {
                            Some(event) => {
                                reader_metrics.stt_events_in.fetch_add(1, Ordering::Relaxed);
                                if stt_events_tx.try_send(event).is_err() {
                                    // Bounded hand-off: never stall STT intake.
                                    warn!(target: "pipeline", "stt event queue full, event dropped");
                                }
                            }
                            None => break,
                        }
                    }
                    _ = reader_shutdown.changed() => break,
                }
            }
            stt_stream.close().await;
            debug!(target: "pipeline", "stt reader stopped");
        });

        // ── Buffer worker ──────────────────────────────────────────
        let worker = BufferWorker {
            key: key.clone(),
            buffer: TranslationBuffer::new(deps.buffer_config.clone()),
            translator: Arc::clone(&deps.translator),
            preferences: TranslationPreferences {
                formal_tone: spec.listener.formal_tone,
                preserve_emotion: spec.listener.preserve_emotion,
            },
            source_language: spec.source_language,
            target_language,
            max_delay: Duration::from_millis(deps.buffer_config.max_delay_ms),
            metrics: metrics.clone(),
            speak_queue: Arc::clone(&speak_queue),
            failure_tx: failure_tx.clone(),
        };
        let buffer_worker = tokio::spawn(worker.run(stt_events_rx, speech_done_rx, shutdown_rx.clone()));

        // ── TTS writer ─────────────────────────────────────────────
        let writer = TtsWriter {
            key: key.clone(),
            tts: Arc::clone(&deps.tts),
            avatar: spec.listener.voice_avatar.clone(),
            transport: Arc::clone(&deps.transport),
            out_track: out_track.id.clone(),
            metrics: metrics.clone(),
            speak_queue: Arc::clone(&speak_queue),
            speech_done_tx,
            failure_tx,
        };
        let tts_writer = tokio::spawn(writer.run());

        *state.write() = PipelineState::Running;
        info!(target: "pipeline", %key, track = %out_track.id, "pipeline running");

        Ok(Pipeline {
            key,
            source_language: spec.source_language,
            target_language,
            metrics,
            out_track,
            state,
            shutdown_tx,
            speak_queue,
            tasks: vec![frame_pusher, stt_reader, buffer_worker, tts_writer],
            transport: deps.transport,
        })
    }

    /// Mark the pipeline failed; resources are still released via
    /// `shutdown`.
    pub fn mark_failed(&self) {
        let mut state = self.state.write();
        if !matches!(*state, PipelineState::Terminated) {
            *state = PipelineState::Failed;
        }
    }

    /// Drain and release. Idempotent: repeated calls after termination are
    /// no-ops.
    pub async fn shutdown(mut self) {
        {
            let mut state = self.state.write();
            match *state {
                PipelineState::Terminated => return,
                PipelineState::Failed => {}
                _ => *state = PipelineState::Draining,
            }
        }
        debug!(target: "pipeline", key = %self.key, "pipeline draining");

        let _ = self.shutdown_tx.send(true);
        self.speak_queue.close();

        // Give in-flight work a bounded window to finish cleanly.
        let grace = tokio::time::timeout(DRAIN_GRACE, async {
            for task in &mut self.tasks {
                let _ = task.await;
            }
        })
        .await;
        if grace.is_err() {
            warn!(target: "pipeline", key = %self.key, "drain grace expired, aborting tasks");
            for task in &self.tasks {
                task.abort();
            }
        }

        if let Err(e) = self.transport.unpublish_track(&self.out_track.id).await {
            debug!(target: "pipeline", key = %self.key, "unpublish after teardown: {e}");
        }
        *self.state.write() = PipelineState::Terminated;
        info!(target: "pipeline", key = %self.key, "pipeline terminated");
    }
}

// ───────────────────────────────────────────────────────────────────
// Buffer worker
// ───────────────────────────────────────────────────────────────────

type TranslationResult = (u64, bool, Result<String, ProviderError>);

struct BufferWorker {
    key: PipelineKey,
    buffer: TranslationBuffer,
    translator: Arc<dyn Translator>,
    preferences: TranslationPreferences,
    source_language: Language,
    target_language: Language,
    max_delay: Duration,
    metrics: PipelineMetrics,
    speak_queue: Arc<SpeakQueue>,
    failure_tx: mpsc::Sender<PipelineFailure>,
}

impl BufferWorker {
    async fn run(
        mut self,
        mut stt_events: mpsc::Receiver<crosstalk_stt::TranscriptEvent>,
        mut speech_done: mpsc::Receiver<u64>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let (results_tx, mut results_rx) = mpsc::channel::<TranslationResult>(16);
        let mut inflight: HashMap<u64, JoinHandle<()>> = HashMap::new();
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut input_done = false;
        let mut drain_started: Option<Instant> = None;

        loop {
            let actions = tokio::select! {
                maybe_event = stt_events.recv(), if !input_done => {
                    match maybe_event {
                        Some(event) => self.buffer.on_transcript(event, Instant::now()),
                        None => {
                            input_done = true;
                            drain_started = Some(Instant::now());
                            Vec::new()
                        }
                    }
                }
                Some((segment_id, provisional, result)) = results_rx.recv() => {
                    inflight.remove(&segment_id);
                    match result {
                        Ok(text) => self.buffer.on_translated(segment_id, provisional, text, Instant::now()),
                        Err(err) if err.is_transient() => {
                            self.metrics.transient_retries.fetch_add(1, Ordering::Relaxed);
                            self.buffer.on_translation_failed(segment_id, Instant::now())
                        }
                        Err(err) => {
                            // Permanent: fail the pipeline, coordinator takes over.
                            warn!(target: "pipeline", key = %self.key, "translator permanent failure: {err}");
                            let _ = self.failure_tx
                                .send(PipelineFailure {
                                    key: self.key.clone(),
                                    error: err.into(),
                                })
                                .await;
                            break;
                        }
                    }
                }
                Some(segment_id) = speech_done.recv() => {
                    self.buffer.on_speech_finished(segment_id, Instant::now())
                }
                _ = ticker.tick() => self.buffer.on_tick(Instant::now()),
                _ = shutdown.changed() => {
                    input_done = true;
                    drain_started = Some(Instant::now());
                    Vec::new()
                }
            };

            self.execute(actions, &results_tx, &mut inflight);
            self.metrics.set_pending(self.buffer.pending_count());

            if input_done {
                let drained = self.buffer.pending_count() == 0
                    && inflight.is_empty()
                    && self.speak_queue.is_drained();
                let expired = drain_started
                    .map(|t| t.elapsed() > DRAIN_GRACE)
                    .unwrap_or(false);
                if drained || expired {
                    break;
                }
            }
        }

        for (_, handle) in inflight {
            handle.abort();
        }
        self.speak_queue.close();
        debug!(target: "pipeline", key = %self.key, "buffer worker stopped");
    }

    fn execute(
        &mut self,
        actions: Vec<BufferAction>,
        results_tx: &mpsc::Sender<TranslationResult>,
        inflight: &mut HashMap<u64, JoinHandle<()>>,
    ) {
        for action in actions {
            match action {
                BufferAction::Translate {
                    segment_id,
                    text,
                    provisional,
                } => {
                    if provisional {
                        self.metrics
                            .interim_translations_issued
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    let request = TranslationRequest {
                        text,
                        source: self.source_language,
                        target: self.target_language,
                        preferences: self.preferences,
                    };
                    let translator = Arc::clone(&self.translator);
                    let results_tx = results_tx.clone();
                    let deadline = self.max_delay;
                    let handle = tokio::spawn(async move {
                        let result = translator.translate(&request, deadline).await;
                        let _ = results_tx.send((segment_id, provisional, result)).await;
                    });
                    if let Some(previous) = inflight.insert(segment_id, handle) {
                        previous.abort();
                    }
                }
                BufferAction::CancelTranslation { segment_id } => {
                    if let Some(handle) = inflight.remove(&segment_id) {
                        handle.abort();
                        self.metrics
                            .interim_translations_cancelled
                            .fetch_add(1, Ordering::Relaxed);
                    }
                }
                BufferAction::Speak {
                    segment_id,
                    text,
                    first_seen,
                } => {
                    if let Some(evicted) = self.speak_queue.push(SpeakJob {
                        segment_id,
                        text,
                        first_seen,
                    }) {
                        // Synthesis backpressure: oldest unspoken loses.
                        warn!(
                            target: "pipeline",
                            key = %self.key,
                            evicted = evicted.segment_id,
                            "speak queue overflow, oldest segment dropped"
                        );
                        self.buffer.on_speak_evicted(evicted.segment_id);
                        self.metrics.record_dropped();
                    }
                }
                BufferAction::Drop { segment_id, missed } => {
                    if missed {
                        self.metrics.record_missed();
                    } else {
                        self.metrics.record_dropped();
                    }
                    debug!(target: "pipeline", key = %self.key, segment_id, missed, "segment dropped");
                }
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// TTS writer
// ───────────────────────────────────────────────────────────────────

struct TtsWriter {
    key: PipelineKey,
    tts: Arc<dyn TtsEngine>,
    avatar: crosstalk_tts::VoiceAvatar,
    transport: Arc<dyn RoomTransport>,
    out_track: TrackId,
    metrics: PipelineMetrics,
    speak_queue: Arc<SpeakQueue>,
    speech_done_tx: mpsc::Sender<u64>,
    failure_tx: mpsc::Sender<PipelineFailure>,
}

impl TtsWriter {
    async fn run(self) {
        // Jobs must arrive in segment order; anything else means the buffer
        // invariant broke, and the pipeline dies rather than speak out of
        // order.
        let mut last_segment: Option<u64> = None;
        while let Some(job) = self.speak_queue.pop().await {
            if let Some(last) = last_segment {
                if job.segment_id <= last {
                    let _ = self
                        .failure_tx
                        .send(PipelineFailure {
                            key: self.key.clone(),
                            error: PipelineError::OrderingViolation {
                                expected: last + 1,
                                emitted: job.segment_id,
                            },
                        })
                        .await;
                    break;
                }
            }
            last_segment = Some(job.segment_id);

            let (sink_tx, mut sink_rx) = mpsc::channel(16);
            let handle = match self.tts.synthesize(&job.text, &self.avatar, sink_tx).await {
                Ok(handle) => handle,
                Err(err) if err.is_transient() => {
                    warn!(target: "pipeline", key = %self.key, "tts transient failure, segment dropped: {err}");
                    self.metrics.record_dropped();
                    let _ = self.speech_done_tx.send(job.segment_id).await;
                    continue;
                }
                Err(err) => {
                    warn!(target: "pipeline", key = %self.key, "tts permanent failure: {err}");
                    let _ = self
                        .failure_tx
                        .send(PipelineFailure {
                            key: self.key.clone(),
                            error: err.into(),
                        })
                        .await;
                    break;
                }
            };

            let mut first_frame = true;
            while let Some(frame) = sink_rx.recv().await {
                if first_frame {
                    first_frame = false;
                    let latency_ms = job.first_seen.elapsed().as_millis() as u64;
                    self.metrics.record_completed(latency_ms);
                    debug!(
                        target: "pipeline",
                        key = %self.key,
                        segment_id = job.segment_id,
                        latency_ms,
                        "tts first audio"
                    );
                }
                self.metrics.tts_frames_out.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.transport.send_audio(&self.out_track, frame).await {
                    warn!(target: "pipeline", key = %self.key, "audio publish failed: {e}");
                    break;
                }
            }

            match handle.finished().await {
                SynthesisEvent::Completed { .. } => {}
                SynthesisEvent::Cancelled { .. } => {
                    self.metrics
                        .tts_syntheses_cancelled
                        .fetch_add(1, Ordering::Relaxed);
                }
                SynthesisEvent::Failed { error, .. } => {
                    if first_frame {
                        // Nothing was spoken; account the segment as failed.
                        self.metrics.record_failed();
                    }
                    warn!(target: "pipeline", key = %self.key, "synthesis failed: {error}");
                }
                SynthesisEvent::Started { .. } => {}
            }
            let _ = self.speech_done_tx.send(job.segment_id).await;
        }
        debug!(target: "pipeline", key = %self.key, "tts writer stopped");
    }
}
