use crosstalk_foundation::Language;
use crosstalk_tts::{VoiceAvatar, VoiceCatalog};
use serde::{Deserialize, Serialize};

/// Immutable view of one user's translation profile.
///
/// `updated_at` is the store's modification time in unix seconds and only
/// used for diagnostics; freshness is governed by the cache TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub identity: String,
    pub native_language: Language,
    pub voice_avatar: VoiceAvatar,
    pub formal_tone: bool,
    pub preserve_emotion: bool,
    #[serde(default)]
    pub updated_at: u64,
}

impl ProfileSnapshot {
    /// Fallback profile when the store has no record for an identity:
    /// English, the catalog's default English voice, informal tone,
    /// emotion preserved.
    pub fn default_for(identity: &str, catalog: &VoiceCatalog) -> Option<Self> {
        let voice_avatar = catalog.default_for(Language::English)?;
        Some(Self {
            identity: identity.to_string(),
            native_language: Language::English,
            voice_avatar,
            formal_tone: false,
            preserve_emotion: true,
            updated_at: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_uses_catalog_default_voice() {
        let catalog = VoiceCatalog::seeded();
        let profile = ProfileSnapshot::default_for("john", &catalog).unwrap();
        assert_eq!(profile.native_language, Language::English);
        assert_eq!(profile.voice_avatar.language, Language::English);
        assert!(!profile.formal_tone);
        assert!(profile.preserve_emotion);
    }

    #[test]
    fn empty_catalog_yields_no_default() {
        let catalog = VoiceCatalog::empty();
        assert!(ProfileSnapshot::default_for("john", &catalog).is_none());
    }
}
