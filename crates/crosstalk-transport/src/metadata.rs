//! Participant metadata attached to the transport session.

use crate::types::RoomType;
use crosstalk_foundation::{Language, TransportError};
use serde::{Deserialize, Serialize};

/// The key/value record carried with each participant: language, chosen
/// voice, and optionally the room type the token was minted for.
///
/// Parsed once on join or update and stored in the registry; never re-parsed
/// per frame. Unknown fields are ignored so older clients keep working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantMetadata {
    pub language: Language,
    pub avatar: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_type: Option<RoomType>,
}

impl ParticipantMetadata {
    pub fn new(language: Language, avatar: impl Into<String>) -> Self {
        Self {
            language,
            avatar: avatar.into(),
            room_type: None,
        }
    }

    /// Parse the wire JSON. A missing or unknown language is an error the
    /// coordinator surfaces at join time; defaulting a language would route
    /// audio wrongly and silently.
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        if raw.trim().is_empty() {
            return Err(TransportError::InvalidMetadata(
                "empty participant metadata".into(),
            ));
        }
        serde_json::from_str(raw).map_err(|e| TransportError::InvalidMetadata(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
