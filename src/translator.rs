//! One language, one message: a backend call wrapped in the retry policy.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::backend::{BackendError, TranslationBackend, TranslationContext};
use crate::config::TranslationSettings;
use crate::metrics::TranslationMetrics;
use crate::retry::{with_retry, with_retry_if, RetryConfig};

/// Stored in place of an empty translation, so that "translated to nothing"
/// stays distinguishable from "never attempted".
pub const EMPTY_TRANSLATION_PLACEHOLDER: &str = " ";

/// Ephemeral unit of work for one target language.
#[derive(Debug, Clone)]
pub struct TranslationJob {
    pub message_id: String,
    pub text: Arc<str>,
    pub language: String,
    /// Attempts made so far
    pub attempts: u32,
}

impl TranslationJob {
    pub fn new(message_id: impl Into<String>, text: Arc<str>, language: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            text,
            language: language.into(),
            attempts: 0,
        }
    }
}

pub struct RetryingTranslator {
    backend: Arc<dyn TranslationBackend>,
    retry: RetryConfig,
    call_timeout: Duration,
}

impl RetryingTranslator {
    pub fn new(backend: Arc<dyn TranslationBackend>, settings: &TranslationSettings) -> Self {
        Self {
            backend,
            retry: RetryConfig::from_settings(settings),
            call_timeout: settings.call_timeout,
        }
    }

    /// Translate a job, retrying every failure up to the attempt budget.
    ///
    /// Exhausting the budget only fails this job; callers decide what that
    /// means for sibling languages.
    pub async fn translate(
        &self,
        job: &mut TranslationJob,
        context: &TranslationContext,
    ) -> Result<String, BackendError> {
        let attempts = AtomicU32::new(0);
        let text = Arc::clone(&job.text);
        let language = job.language.clone();
        let (text, language): (&str, &str) = (&text, &language);
        let operation_name = format!("Translation of {} to {}", job.message_id, language);

        let result = with_retry(&self.retry, &operation_name, |attempt| {
            attempts.store(attempt, Ordering::Relaxed);
            self.call_backend(text, language, context)
        })
        .await;

        job.attempts = attempts.load(Ordering::Relaxed);
        result.map(normalize_translation)
    }

    /// Like [`translate`](Self::translate), but stops at the first error that
    /// another attempt cannot fix (bad request, forbidden, ...).
    pub async fn translate_fail_fast(
        &self,
        job: &mut TranslationJob,
        context: &TranslationContext,
    ) -> Result<String, BackendError> {
        let attempts = AtomicU32::new(0);
        let text = Arc::clone(&job.text);
        let language = job.language.clone();
        let (text, language): (&str, &str) = (&text, &language);
        let operation_name = format!("On-demand translation of {} to {}", job.message_id, language);

        let result = with_retry_if(
            &self.retry,
            &operation_name,
            |attempt| {
                attempts.store(attempt, Ordering::Relaxed);
                self.call_backend(text, language, context)
            },
            BackendError::is_retryable,
        )
        .await;

        job.attempts = attempts.load(Ordering::Relaxed);
        result.map(normalize_translation)
    }

    /// One bounded backend call; a timeout counts as a failed attempt.
    async fn call_backend(
        &self,
        text: &str,
        language: &str,
        context: &TranslationContext,
    ) -> Result<String, BackendError> {
        let metrics = TranslationMetrics::global();
        metrics.record_backend_call();

        let result = match timeout(
            self.call_timeout,
            self.backend.translate(text, language, context),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout(self.call_timeout)),
        };

        if result.is_err() {
            metrics.record_backend_failure();
        }
        result
    }
}

fn normalize_translation(text: String) -> String {
    if text.is_empty() {
        EMPTY_TRANSLATION_PLACEHOLDER.to_string()
    } else {
        text
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Scriptable in-process backend.
    #[derive(Default)]
    pub struct FakeBackend {
        /// language -> translation; languages missing here echo "<lang>:<text>"
        pub responses: HashMap<String, String>,
        /// languages that always fail
        pub failing: HashSet<String>,
        /// every language fails this many times before succeeding
        pub fail_first: usize,
        pub delay: Option<Duration>,
        pub calls: AtomicUsize,
        pub in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub attempts_by_language: Mutex<HashMap<String, usize>>,
    }

    impl FakeBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_response(mut self, language: &str, text: &str) -> Self {
            self.responses.insert(language.to_string(), text.to_string());
            self
        }

        pub fn failing_for(mut self, language: &str) -> Self {
            self.failing.insert(language.to_string());
            self
        }

        pub fn failing_first(mut self, times: usize) -> Self {
            self.fail_first = times;
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TranslationBackend for FakeBackend {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn translate(
            &self,
            text: &str,
            target_language: &str,
            _context: &TranslationContext,
        ) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            let attempt = {
                let mut attempts = self.attempts_by_language.lock().unwrap();
                let entry = attempts.entry(target_language.to_string()).or_insert(0);
                *entry += 1;
                *entry
            };

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(target_language) || attempt <= self.fail_first {
                return Err(BackendError::Server(format!("{} unavailable", target_language)));
            }

            Ok(self
                .responses
                .get(target_language)
                .cloned()
                .unwrap_or_else(|| format!("{}:{}", target_language, text)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeBackend;
    use super::*;

    fn settings(max_attempts: u32) -> TranslationSettings {
        TranslationSettings {
            max_attempts,
            ..TranslationSettings::default()
        }
    }

    fn job(language: &str) -> TranslationJob {
        TranslationJob::new("p1", Arc::from("Hello"), language)
    }

    #[tokio::test]
    async fn test_translate_success_first_attempt() {
        let backend = Arc::new(FakeBackend::new().with_response("es", "Hola"));
        let translator = RetryingTranslator::new(backend.clone(), &settings(10));

        let mut job = job("es");
        let result = translator
            .translate(&mut job, &TranslationContext::default())
            .await;

        assert_eq!(result.unwrap(), "Hola");
        assert_eq!(job.attempts, 1);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_succeeds_when_failures_below_budget() {
        // k = max_attempts - 1 failures, then success
        let backend = Arc::new(FakeBackend::new().failing_first(9));
        let translator = RetryingTranslator::new(backend.clone(), &settings(10));

        let mut job = job("es");
        let result = translator
            .translate(&mut job, &TranslationContext::default())
            .await;

        assert_eq!(result.unwrap(), "es:Hello");
        assert_eq!(job.attempts, 10);
    }

    #[tokio::test]
    async fn test_fails_when_failures_reach_budget() {
        let backend = Arc::new(FakeBackend::new().failing_first(10));
        let translator = RetryingTranslator::new(backend.clone(), &settings(10));

        let mut job = job("es");
        let result = translator
            .translate(&mut job, &TranslationContext::default())
            .await;

        assert!(result.is_err());
        assert_eq!(job.attempts, 10);
        assert_eq!(backend.calls(), 10);
    }

    #[tokio::test]
    async fn test_empty_translation_is_normalized() {
        let backend = Arc::new(FakeBackend::new().with_response("es", ""));
        let translator = RetryingTranslator::new(backend, &settings(3));

        let result = translator
            .translate(&mut job("es"), &TranslationContext::default())
            .await;

        assert_eq!(result.unwrap(), EMPTY_TRANSLATION_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_failed_attempt() {
        let backend = Arc::new(FakeBackend::new().with_delay(Duration::from_millis(200)));
        let settings = TranslationSettings {
            max_attempts: 2,
            call_timeout: Duration::from_millis(20),
            ..TranslationSettings::default()
        };
        let translator = RetryingTranslator::new(backend.clone(), &settings);

        let mut job = job("es");
        let err = translator
            .translate(&mut job, &TranslationContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::Timeout(_)));
        assert_eq!(job.attempts, 2);
        assert_eq!(backend.calls(), 2);
    }

    struct RejectingBackend;

    #[async_trait::async_trait]
    impl TranslationBackend for RejectingBackend {
        fn name(&self) -> &'static str {
            "rejecting"
        }

        async fn translate(
            &self,
            _text: &str,
            _target_language: &str,
            _context: &TranslationContext,
        ) -> Result<String, BackendError> {
            Err(BackendError::BadRequest("unsupported language".to_string()))
        }
    }

    #[tokio::test]
    async fn test_fail_fast_stops_on_client_error() {
        let translator = RetryingTranslator::new(Arc::new(RejectingBackend), &settings(10));

        let mut job = job("xx");
        let err = translator
            .translate_fail_fast(&mut job, &TranslationContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BackendError::BadRequest(_)));
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn test_automatic_path_retries_client_errors() {
        let translator = RetryingTranslator::new(Arc::new(RejectingBackend), &settings(4));

        let mut job = job("xx");
        assert!(translator
            .translate(&mut job, &TranslationContext::default())
            .await
            .is_err());
        assert_eq!(job.attempts, 4);
    }
}
