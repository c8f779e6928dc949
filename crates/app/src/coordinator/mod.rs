//! Per-room coordinator.
//!
//! Single-owner event loop: every mutation of the registry and the pipeline
//! set happens here, driven by a typed event stream. Pipelines hold no
//! reference back; they report failures over a channel keyed by their
//! (listener, speaker) pair. A periodic reconciliation sweep derives the
//! expected pipeline set from the registry and repairs any drift, which is
//! also the recovery path for missed transport events.

pub mod registry;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::pipeline::{
    BufferConfig, Pipeline, PipelineDeps, PipelineFailure, PipelineKey, PipelineSpec,
};
use crate::router::AudioRouter;
use crosstalk_foundation::Language;
use crosstalk_profile::{ProfileCache, ProfileSnapshot};
use crosstalk_stt::SttPlugin;
use crosstalk_telemetry::{PipelineStatsSnapshot, RoomStatsSnapshot};
use crosstalk_translate::Translator;
use crosstalk_transport::{
    ControlMessage, ParticipantMetadata, RoomEvent, RoomTransport, RoomType, TrackKind,
};
use crosstalk_tts::{TtsEngine, VoiceCatalog};
use registry::{Participant, Registry};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_EMPTY_ROOM_TIMEOUT: Duration = Duration::from_secs(300);
const FAILURE_QUEUE: usize = 32;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub room_id: String,
    pub room_type: RoomType,
    pub reconcile_interval: Duration,
    pub empty_room_timeout: Duration,
    pub buffer: BufferConfig,
}

impl CoordinatorConfig {
    pub fn new(room_id: impl Into<String>, room_type: RoomType) -> Self {
        Self {
            room_id: room_id.into(),
            room_type,
            reconcile_interval: RECONCILE_INTERVAL,
            empty_room_timeout: DEFAULT_EMPTY_ROOM_TIMEOUT,
            buffer: BufferConfig::default(),
        }
    }
}

/// Shared services a room borrows from the worker host.
#[derive(Clone)]
pub struct RoomServices {
    pub stt: Arc<dyn SttPlugin>,
    pub translator: Arc<dyn Translator>,
    pub tts: Arc<dyn TtsEngine>,
    pub transport: Arc<dyn RoomTransport>,
    pub profiles: Arc<ProfileCache>,
    pub catalog: Arc<VoiceCatalog>,
}

/// A pair barred from recreation with identical parameters. A metadata
/// change for either participant clears its entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QuarantineEntry {
    listener: String,
    speaker: String,
    source_language: Language,
    target_language: Language,
}

/// Handle for the surrounding host: stats snapshots and shutdown.
#[derive(Clone)]
pub struct CoordinatorHandle {
    stats_tx: mpsc::Sender<oneshot::Sender<RoomStatsSnapshot>>,
    shutdown_tx: watch::Sender<bool>,
}

impl CoordinatorHandle {
    pub async fn stats_snapshot(&self) -> Option<RoomStatsSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.stats_tx.send(reply_tx).await.ok()?;
        reply_rx.await.ok()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

pub struct Coordinator {
    config: CoordinatorConfig,
    services: RoomServices,
    router: AudioRouter,
    registry: Registry,
    pipelines: HashMap<PipelineKey, Pipeline>,
    quarantine: HashSet<QuarantineEntry>,
    started_at: Instant,
    last_nonempty: Instant,
    failure_tx: mpsc::Sender<PipelineFailure>,
    failure_rx: mpsc::Receiver<PipelineFailure>,
    stats_rx: mpsc::Receiver<oneshot::Sender<RoomStatsSnapshot>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig, services: RoomServices) -> (Self, CoordinatorHandle) {
        let (failure_tx, failure_rx) = mpsc::channel(FAILURE_QUEUE);
        let (stats_tx, stats_rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let router = AudioRouter::new(Arc::clone(&services.transport));
        let now = Instant::now();
        (
            Self {
                config,
                services,
                router,
                registry: Registry::new(),
                pipelines: HashMap::new(),
                quarantine: HashSet::new(),
                started_at: now,
                last_nonempty: now,
                failure_tx,
                failure_rx,
                stats_rx,
                shutdown_rx,
            },
            CoordinatorHandle {
                stats_tx,
                shutdown_tx,
            },
        )
    }

    /// Run until shutdown or empty-room timeout. Consumes the coordinator;
    /// all pipelines are torn down before returning.
    pub async fn run(mut self) {
        let mut events = self.services.transport.events();
        let mut reconcile = tokio::time::interval(self.config.reconcile_interval);
        reconcile.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(target: "coordinator", room = %self.config.room_id, "coordinator running");

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => self.handle_event(event).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            // Reconciliation repairs whatever we missed.
                            warn!(target: "coordinator", missed, "event stream lagged");
                            self.reconcile().await;
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                Some(failure) = self.failure_rx.recv() => {
                    self.handle_pipeline_failure(failure).await;
                }
                Some(reply) = self.stats_rx.recv() => {
                    let _ = reply.send(self.stats_snapshot());
                }
                _ = reconcile.tick() => {
                    self.reconcile().await;
                    if self.registry.is_empty()
                        && self.last_nonempty.elapsed() > self.config.empty_room_timeout
                    {
                        info!(target: "coordinator", room = %self.config.room_id, "empty-room timeout");
                        break;
                    }
                }
                _ = self.shutdown_rx.changed() => break,
            }
        }

        self.teardown_all().await;
        info!(target: "coordinator", room = %self.config.room_id, "coordinator stopped");
    }

    async fn handle_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::ParticipantConnected { identity, metadata } => {
                self.on_participant_joined(identity, metadata).await;
            }
            RoomEvent::ParticipantDisconnected { identity } => {
                self.on_participant_left(&identity).await;
            }
            RoomEvent::MetadataChanged { identity, metadata } => {
                self.on_metadata_changed(identity, metadata).await;
            }
            RoomEvent::TrackPublished { info } => {
                if info.kind == TrackKind::Raw {
                    if let Some(participant) = self.registry.get_mut(&info.publisher) {
                        participant.raw_track = Some(info.id.clone());
                        self.reconcile().await;
                    }
                }
            }
            RoomEvent::TrackUnpublished { track_id } => {
                let mut touched = false;
                for identity in self
                    .registry
                    .iter()
                    .filter(|p| p.raw_track.as_ref() == Some(&track_id))
                    .map(|p| p.identity().to_string())
                    .collect::<Vec<_>>()
                {
                    if let Some(participant) = self.registry.get_mut(&identity) {
                        participant.raw_track = None;
                        touched = true;
                    }
                }
                if touched {
                    self.reconcile().await;
                }
            }
        }
    }

    /// Effective profile: language and voice from metadata (authoritative),
    /// preferences from the cached profile.
    async fn effective_profile(
        &self,
        identity: &str,
        metadata: &ParticipantMetadata,
    ) -> ProfileSnapshot {
        let cached = self.services.profiles.get(identity).await.ok();
        let voice_avatar = self
            .services
            .catalog
            .by_id(&metadata.avatar)
            .or_else(|| {
                cached
                    .as_ref()
                    .map(|profile| profile.voice_avatar.clone())
            })
            .or_else(|| self.services.catalog.default_for(metadata.language))
            .unwrap_or_else(|| {
                // Last resort: a synthetic avatar pointing at the raw id;
                // the TTS adapter decides whether it exists.
                crosstalk_tts::VoiceAvatar {
                    voice_id: metadata.avatar.clone(),
                    provider: "deepgram".into(),
                    language: metadata.language,
                    display_name: metadata.avatar.clone(),
                    gender: crosstalk_tts::VoiceGender::Neutral,
                    accent: String::new(),
                    description: String::new(),
                }
            });

        let (formal_tone, preserve_emotion) = cached
            .map(|profile| (profile.formal_tone, profile.preserve_emotion))
            .unwrap_or((false, true));

        ProfileSnapshot {
            identity: identity.to_string(),
            native_language: metadata.language,
            voice_avatar,
            formal_tone,
            preserve_emotion,
            updated_at: 0,
        }
    }

    async fn on_participant_joined(&mut self, identity: String, metadata: ParticipantMetadata) {
        if self.config.room_type == RoomType::Translation && self.registry.len() >= 2 {
            warn!(
                target: "coordinator",
                room = %self.config.room_id,
                identity,
                "translation room already has two participants; ignoring join"
            );
            return;
        }

        let profile = self.effective_profile(&identity, &metadata).await;
        let raw_track = self
            .services
            .transport
            .tracks()
            .into_iter()
            .find(|t| t.kind == TrackKind::Raw && t.publisher == identity)
            .map(|t| t.id);

        info!(
            target: "coordinator",
            room = %self.config.room_id,
            identity,
            language = %profile.native_language,
            "participant joined"
        );
        self.registry.upsert(Participant {
            profile,
            joined_at: Instant::now(),
            raw_track,
        });
        self.last_nonempty = Instant::now();
        self.reconcile().await;
    }

    async fn on_participant_left(&mut self, identity: &str) {
        if self.registry.remove(identity).is_none() {
            return;
        }
        info!(target: "coordinator", room = %self.config.room_id, identity, "participant left");
        if !self.registry.is_empty() {
            self.last_nonempty = Instant::now();
        }
        self.reconcile().await;
    }

    async fn on_metadata_changed(&mut self, identity: String, metadata: ParticipantMetadata) {
        if !self.registry.contains(&identity) {
            return;
        }
        info!(
            target: "coordinator",
            room = %self.config.room_id,
            identity,
            language = %metadata.language,
            "participant metadata changed"
        );

        // A metadata change lifts quarantine for every pair involving the
        // participant: the parameters are no longer identical.
        self.quarantine
            .retain(|entry| entry.listener != identity && entry.speaker != identity);

        // Snapshots inside pipelines are immutable, so every pipeline the
        // participant touches is torn down and rebuilt from the new record.
        let stale: Vec<PipelineKey> = self
            .pipelines
            .keys()
            .filter(|key| key.listener == identity || key.speaker == identity)
            .cloned()
            .collect();
        for key in stale {
            if let Some(pipeline) = self.pipelines.remove(&key) {
                pipeline.shutdown().await;
            }
        }

        let raw_track = self
            .registry
            .get(&identity)
            .and_then(|p| p.raw_track.clone());
        let profile = self.effective_profile(&identity, &metadata).await;
        self.registry.upsert(Participant {
            profile,
            joined_at: self
                .registry
                .get(&identity)
                .map(|p| p.joined_at)
                .unwrap_or_else(Instant::now),
            raw_track,
        });
        self.reconcile().await;
    }

    async fn handle_pipeline_failure(&mut self, failure: PipelineFailure) {
        let PipelineFailure { key, error } = failure;
        warn!(target: "coordinator", room = %self.config.room_id, %key, "pipeline failed: {error}");

        if let Some(pipeline) = self.pipelines.remove(&key) {
            if !error.is_recreatable() {
                self.quarantine.insert(QuarantineEntry {
                    listener: key.listener.clone(),
                    speaker: key.speaker.clone(),
                    source_language: pipeline.source_language,
                    target_language: pipeline.target_language,
                });
            }
            pipeline.mark_failed();
            pipeline.shutdown().await;
        }

        // Diagnostics only; routing correctness never depends on this.
        let _ = self
            .services
            .transport
            .send_control(
                &key.listener,
                ControlMessage::PipelineDiagnostic {
                    speaker: key.speaker.clone(),
                    reason: error.to_string(),
                },
            )
            .await;

        self.reconcile().await;
    }

    fn is_quarantined(&self, key: &PipelineKey) -> bool {
        let Some(listener) = self.registry.get(&key.listener) else {
            return false;
        };
        let Some(speaker) = self.registry.get(&key.speaker) else {
            return false;
        };
        self.quarantine.iter().any(|entry| {
            entry.listener == key.listener
                && entry.speaker == key.speaker
                && entry.source_language == speaker.profile.native_language
                && entry.target_language == listener.profile.native_language
        })
    }

    /// Resync the registry against transport ground truth. Events are the
    /// low-latency path; this sweep is what makes missed or lagged events
    /// harmless.
    async fn sync_registry(&mut self) {
        let present: HashMap<String, ParticipantMetadata> =
            self.services.transport.participants().into_iter().collect();

        // Participants we think are here but are not.
        let gone: Vec<String> = self
            .registry
            .iter()
            .map(|p| p.identity().to_string())
            .filter(|identity| !present.contains_key(identity))
            .collect();
        for identity in gone {
            debug!(target: "coordinator", identity, "reconcile: participant gone");
            self.registry.remove(&identity);
        }

        for (identity, metadata) in present {
            let raw_track = self
                .services
                .transport
                .tracks()
                .into_iter()
                .find(|t| t.kind == TrackKind::Raw && t.publisher == identity)
                .map(|t| t.id);

            let known = self.registry.get(&identity).map(|existing| {
                (
                    existing.profile.native_language,
                    existing.profile.voice_avatar.voice_id.clone(),
                    existing.joined_at,
                    existing.raw_track.clone(),
                )
            });

            match known {
                None => {
                    if self.config.room_type == RoomType::Translation
                        && self.registry.len() >= 2
                    {
                        continue;
                    }
                    debug!(target: "coordinator", identity, "reconcile: participant discovered");
                    let profile = self.effective_profile(&identity, &metadata).await;
                    self.registry.upsert(Participant {
                        profile,
                        joined_at: Instant::now(),
                        raw_track,
                    });
                    self.last_nonempty = Instant::now();
                }
                Some((language, voice_id, joined_at, current_raw)) => {
                    let changed = language != metadata.language
                        || (self.services.catalog.by_id(&metadata.avatar).is_some()
                            && voice_id != metadata.avatar);
                    if changed {
                        // Missed metadata event: same treatment as the
                        // event path, including tearing down pipelines
                        // built from the stale snapshot.
                        self.quarantine.retain(|entry| {
                            entry.listener != identity && entry.speaker != identity
                        });
                        let stale: Vec<PipelineKey> = self
                            .pipelines
                            .keys()
                            .filter(|key| key.listener == identity || key.speaker == identity)
                            .cloned()
                            .collect();
                        for key in stale {
                            if let Some(pipeline) = self.pipelines.remove(&key) {
                                pipeline.shutdown().await;
                            }
                        }
                        let profile = self.effective_profile(&identity, &metadata).await;
                        self.registry.upsert(Participant {
                            profile,
                            joined_at,
                            raw_track,
                        });
                    } else if current_raw != raw_track {
                        if let Some(participant) = self.registry.get_mut(&identity) {
                            participant.raw_track = raw_track;
                        }
                    }
                }
            }
        }
    }

    /// Diff the expected pipeline set against the actual one, correct the
    /// drift, and re-derive the audio topology.
    async fn reconcile(&mut self) {
        self.sync_registry().await;
        let expected = self.registry.expected_pipelines();

        // Tear down pipelines whose predicate no longer holds or that have
        // left the running state on their own.
        let stale: Vec<PipelineKey> = self
            .pipelines
            .iter()
            .filter(|(key, pipeline)| {
                !expected.contains(key)
                    || !matches!(
                        pipeline.state(),
                        crate::pipeline::PipelineState::Initializing
                            | crate::pipeline::PipelineState::Running
                    )
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            if let Some(pipeline) = self.pipelines.remove(&key) {
                debug!(target: "coordinator", %key, "tearing down stale pipeline");
                pipeline.shutdown().await;
            }
        }

        // Spawn what is missing.
        for key in expected {
            if self.pipelines.contains_key(&key) || self.is_quarantined(&key) {
                continue;
            }
            let (Some(listener), Some(speaker)) = (
                self.registry.get(&key.listener),
                self.registry.get(&key.speaker),
            ) else {
                continue;
            };
            let Some(speaker_track) = speaker.raw_track.clone() else {
                continue;
            };

            let spec = PipelineSpec {
                listener: listener.profile.clone(),
                speaker_identity: key.speaker.clone(),
                source_language: speaker.profile.native_language,
                speaker_track,
            };
            let deps = PipelineDeps {
                stt: Arc::clone(&self.services.stt),
                translator: Arc::clone(&self.services.translator),
                tts: Arc::clone(&self.services.tts),
                transport: Arc::clone(&self.services.transport),
                buffer_config: self.config.buffer.clone(),
            };

            match Pipeline::spawn(spec, deps, self.failure_tx.clone()).await {
                Ok(pipeline) => {
                    self.pipelines.insert(key, pipeline);
                }
                Err(error) => {
                    warn!(target: "coordinator", %key, "pipeline spawn failed: {error}");
                    if !error.is_recreatable() {
                        if let (Some(listener), Some(speaker)) = (
                            self.registry.get(&key.listener),
                            self.registry.get(&key.speaker),
                        ) {
                            self.quarantine.insert(QuarantineEntry {
                                listener: key.listener.clone(),
                                speaker: key.speaker.clone(),
                                source_language: speaker.profile.native_language,
                                target_language: listener.profile.native_language,
                            });
                        }
                        let _ = self
                            .services
                            .transport
                            .send_control(
                                &key.listener,
                                ControlMessage::PipelineDiagnostic {
                                    speaker: key.speaker.clone(),
                                    reason: error.to_string(),
                                },
                            )
                            .await;
                    }
                }
            }
        }

        // Topology follows the pipeline set.
        let view = self.registry.room_view();
        let (_plan, failures) = self.router.set_topology(&view).await;
        for failure in failures {
            // A listener whose topology cannot be installed gets the
            // affected pipeline failed; the next sweep rebuilds it.
            let affected: Vec<PipelineKey> = self
                .pipelines
                .iter()
                .filter(|(key, pipeline)| {
                    key.listener == failure.listener && pipeline.out_track.id == failure.track
                })
                .map(|(key, _)| key.clone())
                .collect();
            for key in affected {
                if let Some(pipeline) = self.pipelines.remove(&key) {
                    warn!(target: "coordinator", %key, "failing pipeline after topology failure");
                    pipeline.mark_failed();
                    pipeline.shutdown().await;
                }
            }
        }
    }

    fn stats_snapshot(&self) -> RoomStatsSnapshot {
        let pipelines = self
            .pipelines
            .values()
            .map(|pipeline| {
                PipelineStatsSnapshot::capture(
                    &pipeline.key.listener,
                    &pipeline.key.speaker,
                    pipeline.source_language.as_str(),
                    pipeline.target_language.as_str(),
                    pipeline.state().as_str(),
                    &pipeline.metrics,
                )
            })
            .collect();
        RoomStatsSnapshot {
            room_id: self.config.room_id.clone(),
            room_type: match self.config.room_type {
                RoomType::General => "general",
                RoomType::Translation => "translation",
                RoomType::Conference => "conference",
            }
            .to_string(),
            participant_count: self.registry.len(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            pipelines,
        }
    }

    async fn teardown_all(&mut self) {
        for (_, pipeline) in self.pipelines.drain() {
            pipeline.shutdown().await;
        }
    }
}
