//! Translation backends.
//!
//! A backend translates one text into one target language. Two services are
//! supported, a prompt-driven chat completion API and LibreTranslate. Both
//! sit behind the [`TranslationBackend`] trait and the variant is picked
//! once, when the configuration is loaded.

mod libretranslate;
mod llm;

pub use libretranslate::LibreTranslateBackend;
pub use llm::LlmBackend;

use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{BackendKind, Config};

/// Who asked for the translation, passed through to the backend.
#[derive(Debug, Clone, Default)]
pub struct TranslationContext {
    /// Author of the message (automatic runs) or requesting user (on demand)
    pub requester_user_id: String,
    /// Locale of the requester, used as a hint for ambiguous words
    pub requester_locale: Option<String>,
}

impl TranslationContext {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            requester_user_id: user_id.into(),
            requester_locale: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("access forbidden: {0}")]
    Forbidden(String),

    #[error("rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("translation service error: {0}")]
    Server(String),

    #[error("API error ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("translation timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("empty translation received")]
    EmptyTranslation,

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("translation backend not configured: {0}")]
    NotConfigured(String),
}

impl BackendError {
    /// Map a non-success HTTP status to a typed failure.
    pub fn from_status(status: StatusCode, message: String) -> Self {
        let message = if message.trim().is_empty() {
            format!("HTTP {}", status.as_u16())
        } else {
            message
        };

        match status {
            StatusCode::BAD_REQUEST => BackendError::BadRequest(message),
            StatusCode::FORBIDDEN => BackendError::Forbidden(message),
            StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimited(message),
            StatusCode::INTERNAL_SERVER_ERROR => BackendError::Server(message),
            other => BackendError::Status {
                status: other.as_u16(),
                message,
            },
        }
    }

    /// Whether another attempt has a chance of succeeding.
    ///
    /// Rate limits, 5xx, timeouts and transport problems are transient. Other
    /// client errors and configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::BadRequest(_)
            | BackendError::Forbidden(_)
            | BackendError::NotConfigured(_) => false,
            BackendError::Status { status, .. } => *status >= 500,
            BackendError::RateLimited(_)
            | BackendError::Server(_)
            | BackendError::Timeout(_)
            | BackendError::Malformed(_)
            | BackendError::EmptyTranslation
            | BackendError::Transport(_) => true,
        }
    }
}

/// External translation capability.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Translate `text` into `target_language`.
    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        context: &TranslationContext,
    ) -> Result<String, BackendError>;
}

/// Build the configured backend.
///
/// Fails when the selected backend is unknown or missing its endpoint or
/// credentials.
pub fn build_backend(config: &Config) -> Result<Arc<dyn TranslationBackend>, BackendError> {
    let client = reqwest::Client::builder()
        .timeout(config.call_timeout)
        .build()?;

    match &config.backend {
        BackendKind::Llm => {
            let api_key = config
                .llm_api_key
                .clone()
                .ok_or_else(|| BackendError::NotConfigured("LLM_API_KEY not set".to_string()))?;
            Ok(Arc::new(LlmBackend::new(
                client,
                config.llm_api_url.clone(),
                api_key,
                config.llm_model.clone(),
                config.translation_bot_name.clone(),
            )))
        }
        BackendKind::LibreTranslate => {
            let base_url = config.libretranslate_url.clone().ok_or_else(|| {
                BackendError::NotConfigured("LibreTranslate URL not configured".to_string())
            })?;
            Ok(Arc::new(LibreTranslateBackend::new(
                client,
                &base_url,
                config.libretranslate_api_key.clone(),
                config.libretranslate_format.clone(),
            )))
        }
        BackendKind::Unknown(name) => Err(BackendError::NotConfigured(format!(
            "unknown translation backend '{}'",
            name
        ))),
    }
}
