use crate::language::Language;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by external STT, translation and TTS providers.
///
/// The set is closed on purpose: adapters map whatever their wire layer
/// produces into one of these kinds, and everything downstream branches on
/// `is_transient()` rather than on provider-specific detail.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("provider authentication failed: {0}")]
    AuthFailure(String),

    #[error("language not supported by provider: {0}")]
    LanguageUnsupported(Language),

    #[error("voice not available: {voice_id}")]
    VoiceUnavailable { voice_id: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("stream closed")]
    Closed,

    #[error("provider call exceeded deadline after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    /// Transient errors are retried inside the adapter up to the retry
    /// budget; permanent ones fail the pipeline immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Unavailable(_)
                | ProviderError::RateLimited(_)
                | ProviderError::Timeout(_)
        )
    }
}

/// Errors from the media-transport seam.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("transport authentication failed: {0}")]
    AuthFailure(String),

    #[error("unknown participant: {identity}")]
    UnknownParticipant { identity: String },

    #[error("unknown track: {track_id}")]
    UnknownTrack { track_id: String },

    #[error("track publish failed: {0}")]
    PublishFailed(String),

    #[error("subscription update failed: {0}")]
    SubscriptionFailed(String),

    #[error("participant metadata invalid: {0}")]
    InvalidMetadata(String),

    #[error("transport connection lost: {0}")]
    ConnectionLost(String),
}

/// Pipeline-level failures reported to the coordinator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("segment ordering violated: segment {emitted} emitted after {expected}")]
    OrderingViolation { expected: u64, emitted: u64 },

    #[error("pipeline task stalled: {0}")]
    Stalled(String),
}

impl PipelineError {
    /// Whether the coordinator may recreate the pipeline with the same
    /// parameters. Permanent provider errors are quarantined until the
    /// participant's metadata changes.
    pub fn is_recreatable(&self) -> bool {
        match self {
            PipelineError::Provider(p) => p.is_transient(),
            PipelineError::Transport(_) => true,
            PipelineError::OrderingViolation { .. } => true,
            PipelineError::Stalled(_) => true,
        }
    }
}

/// Fatal worker-process errors, mapped onto exit codes.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport authentication failed: {0}")]
    TransportAuth(String),

    #[error("provider outage exceeded grace window of {grace:?}: {detail}")]
    ProviderOutage { grace: Duration, detail: String },

    #[error("shutdown requested")]
    ShutdownRequested,
}

impl WorkerError {
    /// Process exit code contract: 0 clean, 1 config, 2 transport auth,
    /// 3 unrecoverable provider outage.
    pub fn exit_code(&self) -> i32 {
        match self {
            WorkerError::ShutdownRequested => 0,
            WorkerError::Config(_) => 1,
            WorkerError::TransportAuth(_) => 2,
            WorkerError::ProviderOutage { .. } => 3,
        }
    }
}
