//! Persistence collaborators: the message store and the key-value store used
//! for channel enablement flags and user language preferences.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::message::{Message, TranslationMap};

const TRANSLATION_ENABLED_KEY: &str = "translation_enabled";
const USER_PREFERENCE_KEY: &str = "user_translation_preference";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn get_message(&self, id: &str) -> Result<Message, StoreError>;

    /// Insert or replace a message as delivered by the chat platform.
    async fn save_message(&self, message: &Message) -> Result<(), StoreError>;

    /// Write back an existing message and return the stored version.
    async fn update_message(&self, message: &Message) -> Result<Message, StoreError>;

    /// Atomically merge `translations` into the stored translations map.
    ///
    /// Only the translations entry and the post type are written; the post
    /// type is set to `post_type` when the stored one is empty. Concurrent
    /// merges and edits of other fields are never lost.
    async fn merge_translations(
        &self,
        id: &str,
        translations: &TranslationMap,
        post_type: &str,
    ) -> Result<Message, StoreError>;
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// `Ok(None)` when the key has never been set.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
}

/// Per-channel translation enablement.
#[derive(Clone)]
pub struct ChannelSettings {
    kv: Arc<dyn KvStore>,
}

impl ChannelSettings {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn key(channel_id: &str) -> String {
        format!("{}_{}", TRANSLATION_ENABLED_KEY, channel_id)
    }

    /// Absence of a stored flag means disabled.
    pub async fn is_enabled(&self, channel_id: &str) -> Result<bool, StoreError> {
        let enabled = match self.kv.get(&Self::key(channel_id)).await? {
            None => false,
            Some(Value::Bool(enabled)) => enabled,
            Some(other) => {
                warn!(
                    channel_id,
                    "Unexpected translation flag value {}, treating as disabled", other
                );
                false
            }
        };
        debug!(channel_id, enabled, "channel translation status");
        Ok(enabled)
    }

    pub async fn set_enabled(&self, channel_id: &str, enabled: bool) -> Result<(), StoreError> {
        self.kv
            .set(&Self::key(channel_id), Value::Bool(enabled))
            .await?;
        debug!(channel_id, enabled, "channel translation status set");
        Ok(())
    }
}

/// Per-user preferred display language.
#[derive(Clone)]
pub struct UserPreferences {
    kv: Arc<dyn KvStore>,
}

impl UserPreferences {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn key(user_id: &str) -> String {
        format!("{}_{}", USER_PREFERENCE_KEY, user_id)
    }

    /// Empty string when no preference is stored.
    pub async fn get(&self, user_id: &str) -> Result<String, StoreError> {
        Ok(match self.kv.get(&Self::key(user_id)).await? {
            Some(Value::String(language)) => language,
            _ => String::new(),
        })
    }

    pub async fn set(&self, user_id: &str, language: &str) -> Result<(), StoreError> {
        self.kv
            .set(&Self::key(user_id), Value::String(language.to_string()))
            .await
    }
}
