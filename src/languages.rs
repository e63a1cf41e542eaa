//! Target language resolution.
//!
//! Operators configure the languages to translate into as a comma separated
//! string. [`LanguageList::resolve`] turns that string into an ordered,
//! de-duplicated list that stays fixed for the duration of a run.

use regex::Regex;
use std::sync::OnceLock;

/// Language used when the configured list is empty or unusable.
pub const DEFAULT_LANGUAGE: &str = "english";

const DELIMITER: char = ',';

/// Ordered set of target language codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageList {
    codes: Vec<String>,
}

impl LanguageList {
    /// Parse a delimited language string.
    ///
    /// Entries are trimmed, empty entries dropped, and exact duplicates removed
    /// keeping first-seen order. Never fails: an empty result falls back to
    /// [`DEFAULT_LANGUAGE`].
    pub fn resolve(configured: &str) -> Self {
        let mut codes: Vec<String> = Vec::new();
        for entry in configured.split(DELIMITER) {
            let entry = entry.trim();
            if entry.is_empty() || codes.iter().any(|c| c == entry) {
                continue;
            }
            codes.push(entry.to_string());
        }

        if codes.is_empty() {
            codes.push(DEFAULT_LANGUAGE.to_string());
        }

        Self { codes }
    }

    /// Build a list from already-clean codes (duplicates are still removed).
    pub fn from_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = codes
            .into_iter()
            .map(|c| c.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        Self::resolve(&joined)
    }

    pub fn codes(&self) -> &[String] {
        &self.codes
    }
}

/// Split the configured languages for display, without the default fallback.
///
/// The languages endpoint reports exactly what the operator configured, so an
/// empty configuration yields an empty list here.
pub fn configured_for_display(configured: &str) -> Vec<String> {
    if configured.trim().is_empty() {
        return Vec::new();
    }
    LanguageList::resolve(configured).codes
}

/// Map a chat-platform language code to a LibreTranslate code.
///
/// Regional variants collapse to their base language. Unmapped codes pass
/// through (trimmed and lower-cased) since they may already be valid.
pub fn to_libretranslate_code(code: &str) -> String {
    let normalized = code.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "en-au" | "en-us" | "en-gb" => "en".to_string(),
        "pt-br" | "pt-pt" => "pt".to_string(),
        "zh-cn" | "zh-tw" => "zh".to_string(),
        _ => normalized,
    }
}

fn preference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\p{L}[\p{L}0-9 _()-]{0,63}$").expect("language preference pattern is valid")
    })
}

/// Whether a user-supplied language preference is acceptable.
///
/// An empty preference clears the setting. Otherwise accepts codes such as
/// `pt-BR` as well as names such as `english`.
pub fn is_valid_preference(language: &str) -> bool {
    language.is_empty() || preference_pattern().is_match(language)
}
