use crate::metadata::ParticipantMetadata;
use crate::types::{ControlMessage, RoomEvent, TrackId, TrackInfo, TrackKind};
use async_trait::async_trait;
use crosstalk_foundation::{AudioFrame, TransportError};
use tokio::sync::{broadcast, mpsc};

/// Capacity of per-tap audio queues. Taps that fall behind lose frames
/// rather than stalling the transport.
pub const AUDIO_TAP_CAPACITY: usize = 64;

/// The operations the room logic needs from the media transport.
///
/// Implementations must be cheap to clone behind an `Arc` and safe to call
/// from many pipelines concurrently.
#[async_trait]
pub trait RoomTransport: Send + Sync {
    /// Subscribe to room lifecycle events. Every receiver sees every event
    /// from the moment it subscribes.
    fn events(&self) -> broadcast::Receiver<RoomEvent>;

    /// Currently connected participants with their session metadata. This
    /// is the ground truth reconciliation resyncs against; events are only
    /// the low-latency path.
    fn participants(&self) -> Vec<(String, ParticipantMetadata)>;

    /// Current published tracks.
    fn tracks(&self) -> Vec<TrackInfo>;

    /// Publish a new track owned by this worker. Returns the descriptor the
    /// transport assigned.
    async fn publish_track(
        &self,
        kind: TrackKind,
        intended_listener: Option<&str>,
        translated_speaker: Option<&str>,
    ) -> Result<TrackInfo, TransportError>;

    async fn unpublish_track(&self, track_id: &TrackId) -> Result<(), TransportError>;

    /// Write one audio frame to a track this worker published.
    async fn send_audio(
        &self,
        track_id: &TrackId,
        frame: AudioFrame,
    ) -> Result<(), TransportError>;

    /// Server-side tap of a track's audio, independent of any listener's
    /// subscription set. This is how pipelines read speaker audio.
    async fn open_audio_tap(
        &self,
        track_id: &TrackId,
    ) -> Result<mpsc::Receiver<AudioFrame>, TransportError>;

    async fn subscribe(&self, listener: &str, track_id: &TrackId) -> Result<(), TransportError>;

    async fn unsubscribe(&self, listener: &str, track_id: &TrackId)
        -> Result<(), TransportError>;

    /// The listener's current subscription set.
    fn subscriptions(&self, listener: &str) -> Vec<TrackId>;

    /// Deliver a control-channel message to one participant.
    async fn send_control(
        &self,
        to: &str,
        message: ControlMessage,
    ) -> Result<(), TransportError>;
}
