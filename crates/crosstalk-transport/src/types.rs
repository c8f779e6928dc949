use crate::metadata::ParticipantMetadata;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque track identifier assigned by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackId(pub String);

impl TrackId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    /// A participant's own microphone audio.
    Raw,
    /// Synthesized translation, private to one listener.
    Translated,
}

/// Published-track descriptor.
///
/// For translated tracks `intended_listener`/`translated_speaker` identify
/// the (listener, speaker) pair the pipeline serves; raw tracks carry only
/// their publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: TrackId,
    pub publisher: String,
    pub kind: TrackKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intended_listener: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translated_speaker: Option<String>,
}

impl TrackInfo {
    pub fn raw(id: TrackId, publisher: impl Into<String>) -> Self {
        Self {
            id,
            publisher: publisher.into(),
            kind: TrackKind::Raw,
            intended_listener: None,
            translated_speaker: None,
        }
    }

    pub fn translated(
        id: TrackId,
        publisher: impl Into<String>,
        listener: impl Into<String>,
        speaker: impl Into<String>,
    ) -> Self {
        Self {
            id,
            publisher: publisher.into(),
            kind: TrackKind::Translated,
            intended_listener: Some(listener.into()),
            translated_speaker: Some(speaker.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    #[default]
    General,
    /// Two-user room with eagerly provisioned pipelines.
    Translation,
    Conference,
}

/// Room lifecycle events the coordinator consumes.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    ParticipantConnected {
        identity: String,
        metadata: ParticipantMetadata,
    },
    ParticipantDisconnected {
        identity: String,
    },
    MetadataChanged {
        identity: String,
        metadata: ParticipantMetadata,
    },
    TrackPublished {
        info: TrackInfo,
    },
    TrackUnpublished {
        track_id: TrackId,
    },
}

/// Low-rate text channel payloads. Diagnostics only; correct audio routing
/// never depends on a control message arriving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    PipelineDiagnostic {
        speaker: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translated_track_carries_pair() {
        let info = TrackInfo::translated(TrackId("t1".into()), "agent", "maria", "john");
        assert_eq!(info.kind, TrackKind::Translated);
        assert_eq!(info.intended_listener.as_deref(), Some("maria"));
        assert_eq!(info.translated_speaker.as_deref(), Some("john"));
    }

    #[test]
    fn control_message_wire_format() {
        let msg = ControlMessage::PipelineDiagnostic {
            speaker: "john".into(),
            reason: "VoiceUnavailable".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"pipeline_diagnostic\""));
        let back: ControlMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
