use crosstalk_foundation::Language;
use serde::{Deserialize, Serialize};

/// A synthesis voice as selected by a listener.
///
/// Immutable after creation: a pipeline holds the avatar it was built with
/// and an avatar change recreates the pipeline. `voice_id` is opaque here
/// and interpreted by the provider adapter the `provider` field selects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceAvatar {
    pub voice_id: String,
    pub provider: String,
    pub language: Language,
    pub display_name: String,
    pub gender: VoiceGender,
    pub accent: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceGender {
    Male,
    Female,
    Neutral,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avatar_serializes_with_bare_language_tag() {
        let avatar = VoiceAvatar {
            voice_id: "aura-2-celeste-es".into(),
            provider: "deepgram".into(),
            language: Language::Spanish,
            display_name: "Celeste".into(),
            gender: VoiceGender::Female,
            accent: "colombian".into(),
            description: "Clear and warm female voice".into(),
        };
        let json = serde_json::to_string(&avatar).unwrap();
        assert!(json.contains("\"language\":\"es\""));
        assert!(json.contains("\"gender\":\"female\""));
    }
}
