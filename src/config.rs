use anyhow::{Context, Result};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::languages::{LanguageList, DEFAULT_LANGUAGE};

/// Which translation service the backend talks to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendKind {
    /// Prompt-driven chat completion (OpenAI-compatible API)
    Llm,
    /// LibreTranslate REST API
    LibreTranslate,
    /// Unrecognised name; rejected when the backend is built
    Unknown(String),
}

impl BackendKind {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "llm" | "ai" | "openai" => BackendKind::Llm,
            "libretranslate" | "libre" => BackendKind::LibreTranslate,
            _ => BackendKind::Unknown(name.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    // Feature flags
    pub enable_translations: bool,
    pub translation_languages: String,
    pub translate_system_messages: bool,

    // Backend selection
    pub backend: BackendKind,
    pub translation_bot_name: String,

    // Generative backend
    pub llm_api_url: String,
    pub llm_api_key: Option<String>,
    pub llm_model: String,

    // LibreTranslate backend
    pub libretranslate_url: Option<String>,
    pub libretranslate_api_key: Option<String>,
    pub libretranslate_format: String,

    // Fan-out policy
    pub max_concurrency: usize,
    pub max_attempts: u32,
    pub call_timeout: Duration,
    pub retry_delay: Duration,
    pub run_deadline: Option<Duration>,

    // Service
    pub database_url: Option<String>,
    pub api_key: Option<String>,
    pub channel_admin_user_ids: Vec<String>,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let backend = env_optional("TRANSLATION_BACKEND")
            .map(|name| BackendKind::from_name(&name))
            .unwrap_or(BackendKind::Llm);

        Ok(Self {
            enable_translations: env_flag("ENABLE_TRANSLATIONS"),
            translation_languages: std::env::var("TRANSLATION_LANGUAGES").unwrap_or_default(),
            translate_system_messages: env_flag("TRANSLATE_SYSTEM_MESSAGES"),

            backend,
            translation_bot_name: std::env::var("TRANSLATION_BOT_NAME")
                .unwrap_or_else(|_| "translator".to_string()),

            llm_api_url: std::env::var("LLM_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string()),
            llm_api_key: env_optional("LLM_API_KEY"),
            llm_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),

            libretranslate_url: env_optional("LIBRETRANSLATE_URL"),
            libretranslate_api_key: env_optional("LIBRETRANSLATE_API_KEY"),
            libretranslate_format: std::env::var("LIBRETRANSLATE_FORMAT")
                .unwrap_or_else(|_| "text".to_string()),

            max_concurrency: env_parsed("TRANSLATION_MAX_CONCURRENCY")
                .filter(|v: &usize| *v > 0)
                .unwrap_or(3),
            max_attempts: env_parsed("TRANSLATION_MAX_ATTEMPTS")
                .filter(|v: &u32| *v > 0)
                .unwrap_or(10),
            call_timeout: Duration::from_secs(
                env_parsed("TRANSLATION_CALL_TIMEOUT_SECS").unwrap_or(60),
            ),
            retry_delay: Duration::from_millis(
                env_parsed("TRANSLATION_RETRY_DELAY_MS").unwrap_or(0),
            ),
            run_deadline: env_parsed("TRANSLATION_RUN_DEADLINE_SECS").map(Duration::from_secs),

            database_url: env_optional("DATABASE_URL"),
            api_key: env_optional("API_KEY"),
            channel_admin_user_ids: std::env::var("CHANNEL_ADMIN_USER_IDS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            port: match env_optional("PORT") {
                Some(port) => port
                    .trim()
                    .parse()
                    .with_context(|| format!("PORT must be a port number, got '{}'", port))?,
                None => 8080,
            },
        })
    }

    /// Freeze the translation-relevant part of the configuration.
    ///
    /// Each run receives its own snapshot, so later configuration changes never
    /// leak into a run that has already started.
    pub fn translation_settings(&self) -> Arc<TranslationSettings> {
        Arc::new(TranslationSettings {
            enabled: self.enable_translations,
            languages: LanguageList::resolve(&self.translation_languages),
            configured_languages: self.translation_languages.clone(),
            translate_system_messages: self.translate_system_messages,
            max_concurrency: self.max_concurrency,
            max_attempts: self.max_attempts,
            call_timeout: self.call_timeout,
            retry_delay: self.retry_delay,
            run_deadline: self.run_deadline,
        })
    }
}

/// Immutable translation policy handed to a single run.
#[derive(Debug, Clone)]
pub struct TranslationSettings {
    pub enabled: bool,
    pub languages: LanguageList,
    /// Raw configured list, as the operator typed it
    pub configured_languages: String,
    pub translate_system_messages: bool,
    pub max_concurrency: usize,
    pub max_attempts: u32,
    pub call_timeout: Duration,
    pub retry_delay: Duration,
    pub run_deadline: Option<Duration>,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            languages: LanguageList::from_codes([DEFAULT_LANGUAGE]),
            configured_languages: String::new(),
            translate_system_messages: false,
            max_concurrency: 3,
            max_attempts: 10,
            call_timeout: Duration::from_secs(60),
            retry_delay: Duration::ZERO,
            run_deadline: None,
        }
    }
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parsed<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}
