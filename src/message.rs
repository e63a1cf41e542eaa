//! Chat message model as seen by the translation pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Reserved props key holding the language -> translated text map.
pub const TRANSLATIONS_PROP: &str = "translations";

/// Post type that tells clients to render the translation UI.
pub const TRANSLATION_POST_TYPE: &str = "custom_translation";

/// Prefix shared by all system-generated post types.
pub const SYSTEM_POST_TYPE_PREFIX: &str = "system_";

/// Language code -> translated text.
pub type TranslationMap = BTreeMap<String, String>;

/// A single chat post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub user_id: String,
    /// Body text
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub post_type: String,
    /// Extensible properties bag
    #[serde(default)]
    pub props: Map<String, Value>,
    /// Last update time, milliseconds since the epoch
    #[serde(default)]
    pub update_at: i64,
}

/// Where a message is in its translation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationState {
    Untranslated,
    InProgress,
    Translated,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            message: text.into(),
            post_type: String::new(),
            props: Map::new(),
            update_at: 0,
        }
    }

    /// Whether the post was generated by the platform rather than a user.
    pub fn is_system_message(&self) -> bool {
        self.post_type.starts_with(SYSTEM_POST_TYPE_PREFIX)
    }

    /// Current translations.
    ///
    /// Values are opaque display text; non-string values written by other
    /// producers are kept in their JSON form.
    pub fn translations(&self) -> TranslationMap {
        match self.props.get(TRANSLATIONS_PROP) {
            Some(Value::Object(entries)) => entries
                .iter()
                .map(|(lang, value)| {
                    let text = match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (lang.clone(), text)
                })
                .collect(),
            _ => TranslationMap::new(),
        }
    }

    pub fn has_translations(&self) -> bool {
        matches!(
            self.props.get(TRANSLATIONS_PROP),
            Some(Value::Object(entries)) if !entries.is_empty()
        )
    }

    /// Merge `translations` into the stored map.
    ///
    /// Languages not present in `translations` keep their existing entry.
    pub fn merge_translations(&mut self, translations: &TranslationMap) {
        let entry = self
            .props
            .entry(TRANSLATIONS_PROP.to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }

        if let Value::Object(existing) = entry {
            for (lang, text) in translations {
                existing.insert(lang.clone(), Value::String(text.clone()));
            }
        }
    }

    pub fn translation_state(&self, in_flight: bool) -> TranslationState {
        if in_flight {
            TranslationState::InProgress
        } else if self.has_translations() {
            TranslationState::Translated
        } else {
            TranslationState::Untranslated
        }
    }
}
