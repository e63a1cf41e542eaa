use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::info;

use super::{KvStore, MessageStore, StoreError};
use crate::message::{Message, TranslationMap};

/// PostgreSQL-backed message and key-value store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and create tables if they do not exist yet
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let store = Self { pool };
        store.create_tables().await?;
        info!("✓ Database ready");
        Ok(store)
    }

    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                channel_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                message TEXT NOT NULL,
                post_type TEXT NOT NULL DEFAULT '',
                props JSONB NOT NULL DEFAULT '{}'::jsonb,
                update_at BIGINT NOT NULL DEFAULT 0
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create messages table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value JSONB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create kv_store table")?;

        Ok(())
    }
}

fn message_from_row(row: &PgRow) -> Result<Message, StoreError> {
    let props: Json<Map<String, Value>> = row.try_get("props")?;
    Ok(Message {
        id: row.try_get("id")?,
        channel_id: row.try_get("channel_id")?,
        user_id: row.try_get("user_id")?,
        message: row.try_get("message")?,
        post_type: row.try_get("post_type")?,
        props: props.0,
        update_at: row.try_get("update_at")?,
    })
}

#[async_trait]
impl MessageStore for PgStore {
    async fn get_message(&self, id: &str) -> Result<Message, StoreError> {
        let row = sqlx::query(
            "SELECT id, channel_id, user_id, message, post_type, props, update_at
             FROM messages WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("message {}", id)))?;

        message_from_row(&row)
    }

    async fn save_message(&self, message: &Message) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO messages (id, channel_id, user_id, message, post_type, props, update_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE SET
                channel_id = EXCLUDED.channel_id,
                user_id = EXCLUDED.user_id,
                message = EXCLUDED.message,
                post_type = EXCLUDED.post_type,
                props = EXCLUDED.props,
                update_at = EXCLUDED.update_at",
        )
        .bind(&message.id)
        .bind(&message.channel_id)
        .bind(&message.user_id)
        .bind(&message.message)
        .bind(&message.post_type)
        .bind(Json(message.props.clone()))
        .bind(message.update_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_message(&self, message: &Message) -> Result<Message, StoreError> {
        let row = sqlx::query(
            "UPDATE messages
             SET message = $2, post_type = $3, props = $4, update_at = $5
             WHERE id = $1
             RETURNING id, channel_id, user_id, message, post_type, props, update_at",
        )
        .bind(&message.id)
        .bind(&message.message)
        .bind(&message.post_type)
        .bind(Json(message.props.clone()))
        .bind(Utc::now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("message {}", message.id)))?;

        message_from_row(&row)
    }

    async fn merge_translations(
        &self,
        id: &str,
        translations: &TranslationMap,
        post_type: &str,
    ) -> Result<Message, StoreError> {
        let row = sqlx::query(
            "UPDATE messages
             SET props = jsonb_set(
                    props,
                    '{translations}',
                    CASE WHEN jsonb_typeof(props->'translations') = 'object'
                         THEN props->'translations'
                         ELSE '{}'::jsonb
                    END || $2,
                    true
                 ),
                 post_type = CASE WHEN post_type = '' THEN $3 ELSE post_type END,
                 update_at = $4
             WHERE id = $1
             RETURNING id, channel_id, user_id, message, post_type, props, update_at",
        )
        .bind(id)
        .bind(Json(translations.clone()))
        .bind(post_type)
        .bind(Utc::now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("message {}", id)))?;

        message_from_row(&row)
    }
}

#[async_trait]
impl KvStore for PgStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let value: Option<Json<Value>> =
            sqlx::query_scalar("SELECT value FROM kv_store WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value.map(|v| v.0))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO kv_store (key, value) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(key)
        .bind(Json(value))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
