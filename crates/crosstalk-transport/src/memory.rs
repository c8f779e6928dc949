//! In-memory transport used by the test suite.
//!
//! Implements the full [`RoomTransport`] contract in-process and exposes
//! inspection helpers so tests can assert on subscription sets, delivered
//! audio and control traffic. Audio "delivery" records frames per track;
//! there is no actual playout.

use crate::metadata::ParticipantMetadata;
use crate::room::{RoomTransport, AUDIO_TAP_CAPACITY};
use crate::types::{ControlMessage, RoomEvent, TrackId, TrackInfo, TrackKind};
use async_trait::async_trait;
use crosstalk_foundation::{AudioFrame, TransportError};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

const EVENT_CAPACITY: usize = 256;

/// Identity the worker publishes under.
pub const AGENT_IDENTITY: &str = "crosstalk-agent";

struct TrackRecord {
    info: TrackInfo,
    frames: Vec<AudioFrame>,
    taps: Vec<mpsc::Sender<AudioFrame>>,
}

#[derive(Default)]
struct State {
    participants: HashMap<String, ParticipantMetadata>,
    tracks: HashMap<TrackId, TrackRecord>,
    subscriptions: HashMap<String, HashSet<TrackId>>,
    control_log: Vec<(String, ControlMessage)>,
    /// Subscribe/unsubscribe failures to inject, keyed by track id.
    failing_tracks: HashSet<TrackId>,
}

pub struct MemoryTransport {
    state: RwLock<State>,
    events_tx: broadcast::Sender<RoomEvent>,
    next_track: AtomicU64,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(State::default()),
            events_tx,
            next_track: AtomicU64::new(1),
        }
    }

    fn allocate_track_id(&self) -> TrackId {
        TrackId(format!("trk-{}", self.next_track.fetch_add(1, Ordering::Relaxed)))
    }

    fn emit(&self, event: RoomEvent) {
        let _ = self.events_tx.send(event);
    }

    // ── Test choreography ──────────────────────────────────────────

    /// Join a participant: records metadata, publishes their raw track and
    /// emits the connected event. Returns the raw track id.
    pub fn join_participant(&self, identity: &str, metadata: ParticipantMetadata) -> TrackId {
        let track_id = self.allocate_track_id();
        let info = TrackInfo::raw(track_id.clone(), identity);
        {
            let mut state = self.state.write();
            state.participants.insert(identity.to_string(), metadata.clone());
            state.tracks.insert(
                track_id.clone(),
                TrackRecord {
                    info: info.clone(),
                    frames: Vec::new(),
                    taps: Vec::new(),
                },
            );
            state.subscriptions.entry(identity.to_string()).or_default();
        }
        self.emit(RoomEvent::ParticipantConnected {
            identity: identity.to_string(),
            metadata,
        });
        self.emit(RoomEvent::TrackPublished { info });
        track_id
    }

    /// Disconnect a participant: unpublishes their tracks, clears their
    /// subscriptions and emits the disconnected event.
    pub fn leave_participant(&self, identity: &str) {
        let removed_tracks: Vec<TrackId> = {
            let mut state = self.state.write();
            state.participants.remove(identity);
            state.subscriptions.remove(identity);
            let removed: Vec<TrackId> = state
                .tracks
                .iter()
                .filter(|(_, rec)| rec.info.publisher == identity)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &removed {
                state.tracks.remove(id);
            }
            for subs in state.subscriptions.values_mut() {
                for id in &removed {
                    subs.remove(id);
                }
            }
            removed
        };
        for track_id in removed_tracks {
            self.emit(RoomEvent::TrackUnpublished { track_id });
        }
        self.emit(RoomEvent::ParticipantDisconnected {
            identity: identity.to_string(),
        });
    }

    /// Update a participant's metadata and emit the change event.
    pub fn change_metadata(&self, identity: &str, metadata: ParticipantMetadata) {
        self.state
            .write()
            .participants
            .insert(identity.to_string(), metadata.clone());
        self.emit(RoomEvent::MetadataChanged {
            identity: identity.to_string(),
            metadata,
        });
    }

    /// Push speaker audio into their raw track, fanning out to open taps.
    pub async fn push_audio(&self, track_id: &TrackId, frame: AudioFrame) {
        let taps: Vec<mpsc::Sender<AudioFrame>> = {
            let mut state = self.state.write();
            let Some(record) = state.tracks.get_mut(track_id) else {
                return;
            };
            record.frames.push(frame.clone());
            record.taps.retain(|tap| !tap.is_closed());
            record.taps.clone()
        };
        for tap in taps {
            // Lossy on overflow, like the real transport.
            let _ = tap.try_send(frame.clone());
        }
    }

    pub fn raw_track_of(&self, identity: &str) -> Option<TrackId> {
        self.state
            .read()
            .tracks
            .values()
            .find(|rec| rec.info.publisher == identity && rec.info.kind == TrackKind::Raw)
            .map(|rec| rec.info.id.clone())
    }

    pub fn delivered_frames(&self, track_id: &TrackId) -> Vec<AudioFrame> {
        self.state
            .read()
            .tracks
            .get(track_id)
            .map(|rec| rec.frames.clone())
            .unwrap_or_default()
    }

    pub fn control_messages_for(&self, identity: &str) -> Vec<ControlMessage> {
        self.state
            .read()
            .control_log
            .iter()
            .filter(|(to, _)| to == identity)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    pub fn participant_count(&self) -> usize {
        self.state.read().participants.len()
    }

    /// Make subscribe/unsubscribe on this track fail until cleared.
    pub fn inject_subscription_failure(&self, track_id: &TrackId) {
        self.state.write().failing_tracks.insert(track_id.clone());
    }

    pub fn clear_subscription_failure(&self, track_id: &TrackId) {
        self.state.write().failing_tracks.remove(track_id);
    }
}

#[async_trait]
impl RoomTransport for MemoryTransport {
    fn events(&self) -> broadcast::Receiver<RoomEvent> {
        self.events_tx.subscribe()
    }

    fn participants(&self) -> Vec<(String, ParticipantMetadata)> {
        self.state
            .read()
            .participants
            .iter()
            .map(|(identity, metadata)| (identity.clone(), metadata.clone()))
            .collect()
    }

    fn tracks(&self) -> Vec<TrackInfo> {
        self.state
            .read()
            .tracks
            .values()
            .map(|rec| rec.info.clone())
            .collect()
    }

    async fn publish_track(
        &self,
        kind: TrackKind,
        intended_listener: Option<&str>,
        translated_speaker: Option<&str>,
    ) -> Result<TrackInfo, TransportError> {
        let track_id = self.allocate_track_id();
        let info = match kind {
            TrackKind::Raw => TrackInfo::raw(track_id, AGENT_IDENTITY),
            TrackKind::Translated => {
                let listener = intended_listener.ok_or_else(|| {
                    TransportError::PublishFailed("translated track needs a listener".into())
                })?;
                let speaker = translated_speaker.ok_or_else(|| {
                    TransportError::PublishFailed("translated track needs a speaker".into())
                })?;
                TrackInfo::translated(track_id, AGENT_IDENTITY, listener, speaker)
            }
        };
        self.state.write().tracks.insert(
            info.id.clone(),
            TrackRecord {
                info: info.clone(),
                frames: Vec::new(),
                taps: Vec::new(),
            },
        );
        debug!(target: "transport", track = %info.id, "track published");
        self.emit(RoomEvent::TrackPublished { info: info.clone() });
        Ok(info)
    }

    async fn unpublish_track(&self, track_id: &TrackId) -> Result<(), TransportError> {
        let existed = {
            let mut state = self.state.write();
            let existed = state.tracks.remove(track_id).is_some();
            for subs in state.subscriptions.values_mut() {
                subs.remove(track_id);
            }
            existed
        };
        if !existed {
            return Err(TransportError::UnknownTrack {
                track_id: track_id.to_string(),
            });
        }
        self.emit(RoomEvent::TrackUnpublished {
            track_id: track_id.clone(),
        });
        Ok(())
    }

    async fn send_audio(
        &self,
        track_id: &TrackId,
        frame: AudioFrame,
    ) -> Result<(), TransportError> {
        {
            let state = self.state.read();
            if !state.tracks.contains_key(track_id) {
                return Err(TransportError::UnknownTrack {
                    track_id: track_id.to_string(),
                });
            }
        }
        self.push_audio(track_id, frame).await;
        Ok(())
    }

    async fn open_audio_tap(
        &self,
        track_id: &TrackId,
    ) -> Result<mpsc::Receiver<AudioFrame>, TransportError> {
        let (tx, rx) = mpsc::channel(AUDIO_TAP_CAPACITY);
        let mut state = self.state.write();
        let record = state
            .tracks
            .get_mut(track_id)
            .ok_or_else(|| TransportError::UnknownTrack {
                track_id: track_id.to_string(),
            })?;
        record.taps.push(tx);
        Ok(rx)
    }

    async fn subscribe(&self, listener: &str, track_id: &TrackId) -> Result<(), TransportError> {
        let mut state = self.state.write();
        if state.failing_tracks.contains(track_id) {
            return Err(TransportError::SubscriptionFailed(format!(
                "injected failure on {track_id}"
            )));
        }
        if !state.tracks.contains_key(track_id) {
            return Err(TransportError::UnknownTrack {
                track_id: track_id.to_string(),
            });
        }
        if !state.participants.contains_key(listener) {
            return Err(TransportError::UnknownParticipant {
                identity: listener.to_string(),
            });
        }
        state
            .subscriptions
            .entry(listener.to_string())
            .or_default()
            .insert(track_id.clone());
        Ok(())
    }

    async fn unsubscribe(
        &self,
        listener: &str,
        track_id: &TrackId,
    ) -> Result<(), TransportError> {
        let mut state = self.state.write();
        if state.failing_tracks.contains(track_id) {
            return Err(TransportError::SubscriptionFailed(format!(
                "injected failure on {track_id}"
            )));
        }
        if let Some(subs) = state.subscriptions.get_mut(listener) {
            subs.remove(track_id);
        }
        Ok(())
    }

    fn subscriptions(&self, listener: &str) -> Vec<TrackId> {
        self.state
            .read()
            .subscriptions
            .get(listener)
            .map(|subs| subs.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn send_control(
        &self,
        to: &str,
        message: ControlMessage,
    ) -> Result<(), TransportError> {
        let mut state = self.state.write();
        if !state.participants.contains_key(to) {
            return Err(TransportError::UnknownParticipant {
                identity: to.to_string(),
            });
        }
        state.control_log.push((to.to_string(), message));
        Ok(())
    }
}
