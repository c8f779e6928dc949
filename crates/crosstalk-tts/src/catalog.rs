//! Seed voice catalog.
//!
//! Read-mostly: the surrounding service may add voices at runtime without a
//! coordinator restart, so lookups copy out of a snapshot rather than
//! handing out references.

use crate::types::{VoiceAvatar, VoiceGender};
use crosstalk_foundation::Language;
use parking_lot::RwLock;

pub struct VoiceCatalog {
    voices: RwLock<Vec<VoiceAvatar>>,
}

impl Default for VoiceCatalog {
    fn default() -> Self {
        Self::seeded()
    }
}

impl VoiceCatalog {
    pub fn empty() -> Self {
        Self {
            voices: RwLock::new(Vec::new()),
        }
    }

    /// Catalog with the built-in voices: per language at least one female
    /// and one male voice where the provider offers them.
    pub fn seeded() -> Self {
        let seed = |voice_id: &str,
                    language: Language,
                    display_name: &str,
                    gender: VoiceGender,
                    accent: &str,
                    description: &str| VoiceAvatar {
            voice_id: voice_id.into(),
            provider: "deepgram".into(),
            language,
            display_name: display_name.into(),
            gender,
            accent: accent.into(),
            description: description.into(),
        };

        let voices = vec![
            seed(
                "aura-2-luna-en",
                Language::English,
                "Luna",
                VoiceGender::Female,
                "american",
                "Warm and professional female voice",
            ),
            seed(
                "aura-2-orion-en",
                Language::English,
                "Orion",
                VoiceGender::Male,
                "american",
                "Confident and clear male voice",
            ),
            seed(
                "aura-2-celeste-es",
                Language::Spanish,
                "Celeste",
                VoiceGender::Female,
                "colombian",
                "Clear and warm female voice",
            ),
            seed(
                "aura-2-nestor-es",
                Language::Spanish,
                "Nestor",
                VoiceGender::Male,
                "peninsular",
                "Calm and steady male voice",
            ),
            seed(
                "aura-2-pandora-fr",
                Language::French,
                "Pandora",
                VoiceGender::Female,
                "parisian",
                "Bright and articulate female voice",
            ),
            seed(
                "aura-2-atlas-fr",
                Language::French,
                "Atlas",
                VoiceGender::Male,
                "parisian",
                "Grounded male voice",
            ),
            seed(
                "aura-2-funmi-yo",
                Language::Yoruba,
                "Funmi",
                VoiceGender::Female,
                "nigerian",
                "Native Yoruba female voice",
            ),
            seed(
                "aura-2-amina-ha",
                Language::Hausa,
                "Amina",
                VoiceGender::Female,
                "nigerian",
                "Native Hausa female voice",
            ),
            seed(
                "aura-2-ada-ig",
                Language::Igbo,
                "Ada",
                VoiceGender::Female,
                "nigerian",
                "Native Igbo female voice",
            ),
        ];

        Self {
            voices: RwLock::new(voices),
        }
    }

    pub fn add(&self, avatar: VoiceAvatar) {
        self.voices.write().push(avatar);
    }

    pub fn by_id(&self, voice_id: &str) -> Option<VoiceAvatar> {
        self.voices
            .read()
            .iter()
            .find(|v| v.voice_id == voice_id)
            .cloned()
    }

    pub fn for_language(&self, language: Language) -> Vec<VoiceAvatar> {
        self.voices
            .read()
            .iter()
            .filter(|v| v.language == language)
            .cloned()
            .collect()
    }

    pub fn find(&self, language: Language, gender: VoiceGender) -> Option<VoiceAvatar> {
        self.voices
            .read()
            .iter()
            .find(|v| v.language == language && v.gender == gender)
            .cloned()
    }

    /// First catalog voice for the language; used when a profile has no
    /// avatar on record.
    pub fn default_for(&self, language: Language) -> Option<VoiceAvatar> {
        self.voices
            .read()
            .iter()
            .find(|v| v.language == language)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.voices.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_catalog_covers_every_language() {
        let catalog = VoiceCatalog::seeded();
        for language in Language::ALL {
            assert!(
                catalog.default_for(language).is_some(),
                "no voice for {language}"
            );
        }
    }

    #[test]
    fn lookup_by_id_and_gender() {
        let catalog = VoiceCatalog::seeded();
        let celeste = catalog.by_id("aura-2-celeste-es").unwrap();
        assert_eq!(celeste.language, Language::Spanish);

        let male_en = catalog.find(Language::English, VoiceGender::Male).unwrap();
        assert_eq!(male_en.display_name, "Orion");
    }

    #[test]
    fn runtime_additions_are_visible() {
        let catalog = VoiceCatalog::empty();
        assert!(catalog.is_empty());
        catalog.add(VoiceAvatar {
            voice_id: "custom-1".into(),
            provider: "deepgram".into(),
            language: Language::English,
            display_name: "Custom".into(),
            gender: VoiceGender::Neutral,
            accent: "none".into(),
            description: "test voice".into(),
        });
        assert_eq!(catalog.len(), 1);
        assert!(catalog.by_id("custom-1").is_some());
    }
}
