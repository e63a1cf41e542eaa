use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BackendError, TranslationBackend, TranslationContext};
use crate::languages::to_libretranslate_code;

#[derive(Debug, Serialize)]
struct LibreTranslateRequest<'a> {
    q: &'a str,
    source: &'a str,
    target: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_key: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct LibreTranslateResponse {
    #[serde(rename = "translatedText", default)]
    translated_text: String,
    #[serde(rename = "detectedLanguage", default)]
    detected_language: Option<DetectedLanguage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetectedLanguage {
    language: String,
    confidence: f64,
}

/// REST backend for a LibreTranslate server.
pub struct LibreTranslateBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    format: String,
}

impl LibreTranslateBackend {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: Option<String>,
        format: String,
    ) -> Self {
        let format = if format.is_empty() {
            "text".to_string()
        } else {
            format
        };

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
            format,
        }
    }

    fn translate_url(&self) -> String {
        format!("{}/translate", self.base_url)
    }
}

#[async_trait]
impl TranslationBackend for LibreTranslateBackend {
    fn name(&self) -> &'static str {
        "libretranslate"
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        _context: &TranslationContext,
    ) -> Result<String, BackendError> {
        if text.is_empty() {
            return Err(BackendError::BadRequest("text cannot be empty".to_string()));
        }

        let target = to_libretranslate_code(target_language);
        let request = LibreTranslateRequest {
            q: text,
            source: "auto",
            target: &target,
            format: &self.format,
            api_key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(self.translate_url())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // Error bodies are JSON when the server produced them, plain text otherwise
            let message = serde_json::from_str::<LibreTranslateResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or_default();
            return Err(BackendError::from_status(status, message));
        }

        let parsed: LibreTranslateResponse = serde_json::from_str(&body).map_err(|e| {
            BackendError::Malformed(format!("failed to decode response: {} - body: {}", e, body))
        })?;

        if let Some(detected) = &parsed.detected_language {
            debug!(
                target_language = %target,
                detected = %detected.language,
                confidence = detected.confidence,
                "LibreTranslate detected source language"
            );
        }

        if parsed.translated_text.is_empty() {
            return Err(BackendError::EmptyTranslation);
        }

        Ok(parsed.translated_text)
    }
}
