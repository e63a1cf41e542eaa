use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BackendError, TranslationBackend, TranslationContext};

/// Chat Completion request for translation
#[derive(Debug, Serialize)]
struct TranslationRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<String>,
    /// Bot identity the request is made on behalf of
    user: String,
}

/// Check if a model is a reasoning model that doesn't support temperature
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("gpt-5")
        || model.starts_with("o1")
        || model.starts_with("o3")
        || model.starts_with("o4")
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Build the system prompt for translation
fn build_translation_system_prompt(target_language: &str, locale: Option<&str>) -> String {
    let mut prompt = format!(
        r#"Translate the given text to the requested language.

The text to translate is the one contained between the <text-to-translate></text-to-translate> tags.
Always provide the most accurate translation possible, covering every line of the text.

## Keep intact
- Emoji short codes, for example :heart_eyes: stays :heart_eyes:
- User mentions (@user), channel mentions (~channel-name) and hashtags (#hashtag)
- Code blocks and inline code
- Markdown formatting
Put spaces between hashtags and the surrounding text.

## Output
- Only the translated text, never the original text
- No notes, explanations or comments of any kind
- If the text is already in {language}, return it unchanged

You are translating into {language}."#,
        language = target_language
    );

    if let Some(locale) = locale.filter(|l| !l.is_empty()) {
        prompt.push_str(&format!(
            "\n\nThe message author's locale is '{}'. Use it to resolve ambiguous words.",
            locale
        ));
    }

    prompt
}

/// Build the user prompt for translation
fn build_translation_user_prompt(text: &str) -> String {
    format!("<text-to-translate>\n{}\n</text-to-translate>", text)
}

/// Generative backend talking to an OpenAI-compatible chat completion API.
pub struct LlmBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    bot_name: String,
}

impl LlmBackend {
    pub fn new(
        client: reqwest::Client,
        api_url: String,
        api_key: String,
        model: String,
        bot_name: String,
    ) -> Self {
        Self {
            client,
            api_url,
            api_key,
            model,
            bot_name,
        }
    }

    fn build_request(&self, text: &str, target_language: &str, context: &TranslationContext) -> TranslationRequest {
        // Reasoning models don't support temperature - use reasoning_effort instead
        let is_reasoning = is_reasoning_model(&self.model);

        TranslationRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: build_translation_system_prompt(
                        target_language,
                        context.requester_locale.as_deref(),
                    ),
                },
                Message {
                    role: "user".to_string(),
                    content: build_translation_user_prompt(text),
                },
            ],
            temperature: if is_reasoning { None } else { Some(0.2) },
            reasoning_effort: if is_reasoning {
                Some("low".to_string())
            } else {
                None
            },
            user: self.bot_name.clone(),
        }
    }
}

#[async_trait]
impl TranslationBackend for LlmBackend {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
        context: &TranslationContext,
    ) -> Result<String, BackendError> {
        let request = self.build_request(text, target_language, context);

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("<failed to read body: {}>", e));
            return Err(BackendError::from_status(status, body));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;

        let translated = chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BackendError::Malformed("response contained no choices".to_string()))?;

        debug!(
            language = target_language,
            requester = %context.requester_user_id,
            "Extracted translation raw: {}",
            translated
        );

        Ok(translated)
    }
}
