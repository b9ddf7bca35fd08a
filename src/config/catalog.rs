//! Language and voice catalogs.
//!
//! The language *name* is what goes into the session instructions, so codes
//! are resolved here before connecting.

/// Target languages offered by the relay: (code, display name)
pub const LANGUAGES: &[(&str, &str)] = &[
    // ========================================================================
    // GLOBAL MAJOR LANGUAGES
    // ========================================================================
    ("en", "English"),
    ("es", "Spanish"),
    ("fr", "French"),
    ("de", "German"),
    ("it", "Italian"),
    ("pt", "Portuguese"),
    ("ru", "Russian"),
    ("zh", "Chinese (Mandarin)"),
    ("ja", "Japanese"),
    ("ko", "Korean"),
    ("hi", "Hindi"),
    ("ar", "Arabic"),
    ("tr", "Turkish"),
    ("vi", "Vietnamese"),
    ("th", "Thai"),
    ("pl", "Polish"),
    ("nl", "Dutch"),
    ("sv", "Swedish"),
    ("id", "Indonesian"),
    ("ms", "Malay"),
    ("fa", "Persian"),
    ("he", "Hebrew"),
    ("el", "Greek"),
    ("bn", "Bengali"),
    ("pa", "Punjabi"),
    ("ur", "Urdu"),
    ("ta", "Tamil"),
    ("te", "Telugu"),
    // ========================================================================
    // DIALECTS & REGIONAL VARIANTS
    // ========================================================================
    ("zh-yue", "Cantonese (Yue)"),
    ("fr-be", "French (Belgian)"),
    ("fr-qc", "French (Canadian)"),
    ("nl-be", "Flemish (Belgian Dutch)"),
    ("af", "Afrikaans"),
    ("tl", "Tagalog (Filipino)"),
    ("en-tl", "Taglish (Mix)"),
    ("ceb", "Cebuano (Bisaya)"),
    ("sw", "Swahili"),
    ("yo", "Yoruba"),
    ("ig", "Igbo"),
    ("zu", "Zulu"),
    ("byv", "Medumba"),
    ("nci", "Nouchi (Ivory Coast Mix)"),
    ("bci", "Baoulé"),
    ("dyu", "Dioula"),
];

/// Prebuilt voices: (id, persona)
pub const VOICES: &[(&str, &str)] = &[
    ("Zephyr", "Minos (The Arbiter - Neutral/Calm)"),
    ("Kore", "Olympias (The Queen - Soft/Clear Female)"),
    ("Puck", "Alexander (The Great - Energetic/Bright)"),
    ("Charon", "Leonidas (The Guardian - Deep/Mature)"),
    ("Fenrir", "Agamemnon (The Overlord - Authoritative/Deep)"),
];

const FALLBACK_LANGUAGE: &str = "English";

/// Resolve a language code to the name used in the session instructions.
///
/// Unknown ISO 639-1 codes fall back to their `isolang` name; anything else
/// resolves to English.
pub fn language_name(code: &str) -> String {
    let code = code.trim();
    if let Some((_, name)) = LANGUAGES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
    {
        return name.to_string();
    }
    isolang::Language::from_639_1(&code.to_ascii_lowercase())
        .map(|lang| lang.to_name().to_string())
        .unwrap_or_else(|| FALLBACK_LANGUAGE.to_string())
}

pub fn is_known_voice(id: &str) -> bool {
    VOICES.iter().any(|(v, _)| *v == id)
}
