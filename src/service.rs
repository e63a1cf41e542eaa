//! Message hooks and user-facing operations on top of the fan-out core.

use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backend::{BackendError, TranslationBackend, TranslationContext};
use crate::committer::{CommitError, TranslationCommitter};
use crate::config::TranslationSettings;
use crate::eligibility::{EligibilityGate, Ineligibility};
use crate::languages::{configured_for_display, is_valid_preference};
use crate::message::{Message, TranslationMap, TranslationState, TRANSLATION_POST_TYPE};
use crate::metrics::TranslationMetrics;
use crate::orchestrator::{FanOutOrchestrator, RunError, RunReport};
use crate::permissions::PermissionChecker;
use crate::store::{ChannelSettings, KvStore, MessageStore, StoreError, UserPreferences};
use crate::translator::TranslationJob;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("permission denied")]
    PermissionDenied,

    #[error("cannot translate an empty message")]
    EmptyMessage,

    #[error("translation feature is disabled")]
    FeatureDisabled,

    #[error("invalid language: {0}")]
    InvalidLanguage(String),

    #[error("translation failed: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            other => ServiceError::Store(other),
        }
    }
}

/// Result of a single on-demand translation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnDemandTranslation {
    pub translated_text: String,
    pub original_text: String,
    pub target_language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguagesView {
    pub languages: Vec<String>,
    pub user_preference: String,
}

pub struct TranslationService {
    /// `None` when no usable backend is configured; translation then fails
    /// closed.
    orchestrator: Option<Arc<FanOutOrchestrator>>,
    messages: Arc<dyn MessageStore>,
    channels: ChannelSettings,
    preferences: UserPreferences,
    permissions: Arc<dyn PermissionChecker>,
    settings: RwLock<Arc<TranslationSettings>>,
}

impl TranslationService {
    pub fn new(
        backend: Option<Arc<dyn TranslationBackend>>,
        messages: Arc<dyn MessageStore>,
        kv: Arc<dyn KvStore>,
        permissions: Arc<dyn PermissionChecker>,
        settings: Arc<TranslationSettings>,
    ) -> Self {
        let orchestrator = backend.map(|backend| {
            let committer = TranslationCommitter::new(Arc::clone(&messages));
            Arc::new(FanOutOrchestrator::new(backend, committer))
        });

        Self {
            orchestrator,
            messages,
            channels: ChannelSettings::new(Arc::clone(&kv)),
            preferences: UserPreferences::new(kv),
            permissions,
            settings: RwLock::new(settings),
        }
    }

    /// Snapshot of the current settings.
    pub async fn settings(&self) -> Arc<TranslationSettings> {
        Arc::clone(&*self.settings.read().await)
    }

    /// Swap in new settings. Runs already started keep their snapshot.
    pub async fn update_settings(&self, settings: Arc<TranslationSettings>) {
        *self.settings.write().await = settings;
        info!("Translation settings updated");
    }

    /// Channel flag, failing closed when the store cannot be read.
    async fn channel_enabled(&self, channel_id: &str) -> bool {
        match self.channels.is_enabled(channel_id).await {
            Ok(enabled) => enabled,
            Err(e) => {
                warn!(channel_id, "Failed to read channel translation flag: {}", e);
                false
            }
        }
    }

    /// Full eligibility check. The channel flag is only read once the
    /// message-level rules pass.
    async fn eligibility(
        &self,
        message: &Message,
        settings: &TranslationSettings,
    ) -> Result<(), Ineligibility> {
        EligibilityGate::check_message(message, settings)?;
        let channel_enabled = self.channel_enabled(&message.channel_id).await;
        EligibilityGate::check(message, channel_enabled, settings)
    }

    /// Hook run before a message is stored: marks eligible messages with the
    /// translation post type so clients render the translation UI right away.
    pub async fn message_will_be_posted(&self, mut message: Message) -> Message {
        if self.orchestrator.is_none() {
            return message;
        }
        let settings = self.settings().await;
        if self.eligibility(&message, &settings).await.is_ok() && message.post_type.is_empty() {
            message.post_type = TRANSLATION_POST_TYPE.to_string();
        }
        message
    }

    /// Gate and translate one message, waiting for the run to finish.
    ///
    /// `Ok(None)` means the message was not eligible.
    pub async fn process_message(&self, message: &Message) -> Result<Option<RunReport>, RunError> {
        let metrics = TranslationMetrics::global();
        let Some(orchestrator) = &self.orchestrator else {
            warn!(message_id = %message.id, "No translation backend configured, skipping");
            metrics.record_run_skipped();
            return Ok(None);
        };

        let settings = self.settings().await;
        if let Err(reason) = self.eligibility(message, &settings).await {
            debug!(message_id = %message.id, %reason, "Message not eligible for translation");
            metrics.record_run_skipped();
            return Ok(None);
        }

        orchestrator.run(message, &settings).await.map(Some)
    }

    /// Hook run after a message is stored. Translation happens in the
    /// background; failures are logged only.
    pub fn message_has_been_posted(self: &Arc<Self>, message: Message) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            match service.process_message(&message).await {
                Ok(Some(report)) if !report.failed.is_empty() => {
                    let failed: Vec<&String> = report.failed.keys().collect();
                    warn!(
                        message_id = %report.message_id,
                        ?failed,
                        "Some languages could not be translated"
                    );
                }
                Ok(_) => {}
                Err(RunError::AlreadyInFlight(id)) => {
                    debug!(message_id = %id, "Translation already running");
                }
                Err(e) => error!(message_id = %message.id, "Translation run failed: {}", e),
            }
        })
    }

    /// Edits go through the same gate, so already-translated messages are
    /// left alone.
    pub fn message_has_been_updated(self: &Arc<Self>, message: Message) -> JoinHandle<()> {
        self.message_has_been_posted(message)
    }

    /// Store a message delivered by the platform and trigger the pipeline.
    pub async fn receive_message(self: &Arc<Self>, message: Message) -> Result<JoinHandle<()>, ServiceError> {
        let message = self.message_will_be_posted(message).await;
        self.messages.save_message(&message).await?;
        Ok(self.message_has_been_posted(message))
    }

    /// Store an edited message and run it through the pipeline again.
    pub async fn receive_update(self: &Arc<Self>, message: Message) -> Result<JoinHandle<()>, ServiceError> {
        self.messages.save_message(&message).await?;
        Ok(self.message_has_been_updated(message))
    }

    /// Translate one message into one language for a user, synchronously.
    ///
    /// Checks run in order: permission, empty message, feature flag. A post
    /// that does not exist is reported as a permission failure, so callers
    /// cannot tell it apart from one they may not read. Client errors from
    /// the backend are not retried.
    pub async fn translate_on_demand(
        &self,
        user_id: &str,
        message_id: &str,
        language: &str,
    ) -> Result<OnDemandTranslation, ServiceError> {
        let message = match self.messages.get_message(message_id).await {
            Ok(message) => message,
            Err(StoreError::NotFound(_)) => return Err(ServiceError::PermissionDenied),
            Err(e) => return Err(e.into()),
        };

        if !self
            .permissions
            .can_read_channel(user_id, &message.channel_id)
            .await
        {
            return Err(ServiceError::PermissionDenied);
        }
        if message.message.is_empty() {
            return Err(ServiceError::EmptyMessage);
        }

        let settings = self.settings().await;
        if !settings.enabled {
            return Err(ServiceError::FeatureDisabled);
        }

        let language = language.trim();
        if language.is_empty() || !is_valid_preference(language) {
            return Err(ServiceError::InvalidLanguage(language.to_string()));
        }

        let orchestrator = self.orchestrator.as_ref().ok_or_else(|| {
            BackendError::NotConfigured("no translation backend available".to_string())
        })?;

        let context = TranslationContext {
            requester_user_id: user_id.to_string(),
            requester_locale: self
                .preferences
                .get(user_id)
                .await
                .ok()
                .filter(|l| !l.is_empty()),
        };

        let mut job = TranslationJob::new(message_id, Arc::from(message.message.as_str()), language);
        let translated = orchestrator
            .translator(&settings)
            .translate_fail_fast(&mut job, &context)
            .await?;

        let mut result = TranslationMap::new();
        result.insert(language.to_string(), translated.clone());
        orchestrator.committer().commit(message_id, &result).await?;

        info!(message_id, language, user_id, "On-demand translation stored");
        Ok(OnDemandTranslation {
            translated_text: translated,
            original_text: message.message,
            target_language: language.to_string(),
        })
    }

    pub async fn languages_for_user(&self, user_id: &str) -> Result<LanguagesView, ServiceError> {
        let settings = self.settings().await;
        Ok(LanguagesView {
            languages: configured_for_display(&settings.configured_languages),
            user_preference: self.preferences.get(user_id).await?,
        })
    }

    pub async fn set_user_preference(&self, user_id: &str, language: &str) -> Result<(), ServiceError> {
        let language = language.trim();
        if !is_valid_preference(language) {
            return Err(ServiceError::InvalidLanguage(language.to_string()));
        }
        self.preferences.set(user_id, language).await?;
        Ok(())
    }

    pub async fn set_channel_enabled(
        &self,
        user_id: &str,
        channel_id: &str,
        enabled: bool,
    ) -> Result<bool, ServiceError> {
        if !self.permissions.can_manage_channel(user_id, channel_id).await {
            return Err(ServiceError::PermissionDenied);
        }
        self.channels.set_enabled(channel_id, enabled).await?;
        info!(channel_id, enabled, user_id, "Channel translation setting changed");
        Ok(enabled)
    }

    pub async fn channel_enabled_for(&self, user_id: &str, channel_id: &str) -> Result<bool, ServiceError> {
        if !self.permissions.can_read_channel(user_id, channel_id).await {
            return Err(ServiceError::PermissionDenied);
        }
        Ok(self.channels.is_enabled(channel_id).await?)
    }

    pub async fn translation_state(&self, message_id: &str) -> Result<TranslationState, ServiceError> {
        let message = self.messages.get_message(message_id).await?;
        let in_flight = self
            .orchestrator
            .as_ref()
            .is_some_and(|o| o.is_in_flight(message_id));
        Ok(message.translation_state(in_flight))
    }
}
