//! Language tags for the closed set of supported languages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A supported language, identified by its short tag.
///
/// The set is closed: pipelines are only ever created between languages the
/// provider catalog actually covers. Equality is the only operation the room
/// logic needs; locale mapping exists for provider configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "en")]
    English,
    #[serde(rename = "es")]
    Spanish,
    #[serde(rename = "fr")]
    French,
    #[serde(rename = "yo")]
    Yoruba,
    #[serde(rename = "ha")]
    Hausa,
    #[serde(rename = "ig")]
    Igbo,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::English,
        Language::Spanish,
        Language::French,
        Language::Yoruba,
        Language::Hausa,
        Language::Igbo,
    ];

    /// Short tag as carried in participant metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Spanish => "es",
            Language::French => "fr",
            Language::Yoruba => "yo",
            Language::Hausa => "ha",
            Language::Igbo => "ig",
        }
    }

    /// Parse a short tag. Unknown tags are rejected rather than defaulted;
    /// the caller decides what a missing language means.
    pub fn parse(tag: &str) -> Option<Language> {
        match tag {
            "en" => Some(Language::English),
            "es" => Some(Language::Spanish),
            "fr" => Some(Language::French),
            "yo" => Some(Language::Yoruba),
            "ha" => Some(Language::Hausa),
            "ig" => Some(Language::Igbo),
            _ => None,
        }
    }

    /// Locale string expected by streaming providers.
    pub fn locale(&self) -> &'static str {
        match self {
            Language::English => "en-US",
            Language::Spanish => "es-US",
            Language::French => "fr-FR",
            Language::Yoruba => "yo-NG",
            Language::Hausa => "ha-NG",
            Language::Igbo => "ig-NG",
        }
    }

    /// Human-readable name, used in translation prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Spanish => "Spanish",
            Language::French => "French",
            Language::Yoruba => "Yoruba",
            Language::Hausa => "Hausa",
            Language::Igbo => "Igbo",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
