//! Decides whether a message should be translated at all.
//!
//! The gate is pure: callers read the channel flag from the store and pass it
//! in. Rules run in a fixed order and the first failing rule is reported.

use std::fmt;

use crate::config::TranslationSettings;
use crate::message::Message;

/// Why a message was not translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    FeatureDisabled,
    EmptyMessage,
    AlreadyTranslated,
    SystemMessage,
    ChannelDisabled,
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Ineligibility::FeatureDisabled => "translation feature disabled",
            Ineligibility::EmptyMessage => "empty message",
            Ineligibility::AlreadyTranslated => "message already translated",
            Ineligibility::SystemMessage => "system message",
            Ineligibility::ChannelDisabled => "channel translation disabled",
        };
        f.write_str(reason)
    }
}

pub struct EligibilityGate;

impl EligibilityGate {
    /// Message-level rules only; needs no store access.
    pub fn check_message(
        message: &Message,
        settings: &TranslationSettings,
    ) -> Result<(), Ineligibility> {
        if !settings.enabled {
            return Err(Ineligibility::FeatureDisabled);
        }
        if message.message.is_empty() {
            return Err(Ineligibility::EmptyMessage);
        }
        if message.has_translations() {
            return Err(Ineligibility::AlreadyTranslated);
        }
        if message.is_system_message() && !settings.translate_system_messages {
            return Err(Ineligibility::SystemMessage);
        }
        Ok(())
    }

    /// All rules, including the channel flag.
    pub fn check(
        message: &Message,
        channel_enabled: bool,
        settings: &TranslationSettings,
    ) -> Result<(), Ineligibility> {
        Self::check_message(message, settings)?;
        if !channel_enabled {
            return Err(Ineligibility::ChannelDisabled);
        }
        Ok(())
    }

    pub fn should_translate(
        message: &Message,
        channel_enabled: bool,
        settings: &TranslationSettings,
    ) -> bool {
        Self::check(message, channel_enabled, settings).is_ok()
    }
}
