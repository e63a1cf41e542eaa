use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{KvStore, MessageStore, StoreError};
use crate::message::{Message, TranslationMap};

/// In-process store used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryStore {
    messages: RwLock<HashMap<String, Message>>,
    kv: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn get_message(&self, id: &str) -> Result<Message, StoreError> {
        self.messages
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("message {}", id)))
    }

    async fn save_message(&self, message: &Message) -> Result<(), StoreError> {
        self.messages
            .write()
            .await
            .insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn update_message(&self, message: &Message) -> Result<Message, StoreError> {
        let mut messages = self.messages.write().await;
        let stored = messages
            .get_mut(&message.id)
            .ok_or_else(|| StoreError::NotFound(format!("message {}", message.id)))?;

        *stored = message.clone();
        stored.update_at = Utc::now().timestamp_millis();
        Ok(stored.clone())
    }

    async fn merge_translations(
        &self,
        id: &str,
        translations: &TranslationMap,
        post_type: &str,
    ) -> Result<Message, StoreError> {
        // Read, merge and write under one lock
        let mut messages = self.messages.write().await;
        let stored = messages
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("message {}", id)))?;

        stored.merge_translations(translations);
        if stored.post_type.is_empty() {
            stored.post_type = post_type.to_string();
        }
        stored.update_at = Utc::now().timestamp_millis();
        Ok(stored.clone())
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.kv.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.kv.write().await.insert(key.to_string(), value);
        Ok(())
    }
}
