//! Fan-out of one message to every configured language.
//!
//! Each language gets its own task. A semaphore caps the number of backend
//! calls in flight, results land in one mutex-guarded map, and the map is
//! committed only after every task has finished (or the optional run
//! deadline has passed).

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::backend::{TranslationBackend, TranslationContext};
use crate::committer::{CommitError, CommitOutcome, TranslationCommitter};
use crate::config::TranslationSettings;
use crate::message::{Message, TranslationMap};
use crate::metrics::TranslationMetrics;
use crate::translator::{RetryingTranslator, TranslationJob};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("a translation run is already in progress for message {0}")]
    AlreadyInFlight(String),

    #[error(transparent)]
    Commit(#[from] CommitError),
}

/// Outcome of one run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub message_id: String,
    /// Translations stored on the message after the commit
    pub translations: TranslationMap,
    /// Languages translated by this run
    pub succeeded: Vec<String>,
    /// Languages that exhausted their attempts, with the last error
    pub failed: BTreeMap<String, String>,
    /// Languages still running when the run deadline passed
    pub unfinished: Vec<String>,
}

type InFlight = Arc<StdMutex<HashSet<String>>>;

/// Removes the message from the in-flight registry when the run ends,
/// however it ends.
struct InFlightGuard {
    registry: InFlight,
    message_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.message_id);
    }
}

pub struct FanOutOrchestrator {
    backend: Arc<dyn TranslationBackend>,
    committer: TranslationCommitter,
    in_flight: InFlight,
}

impl FanOutOrchestrator {
    pub fn new(backend: Arc<dyn TranslationBackend>, committer: TranslationCommitter) -> Self {
        Self {
            backend,
            committer,
            in_flight: Arc::new(StdMutex::new(HashSet::new())),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn committer(&self) -> &TranslationCommitter {
        &self.committer
    }

    /// A translator using this orchestrator's backend and the given policy.
    pub fn translator(&self, settings: &TranslationSettings) -> RetryingTranslator {
        RetryingTranslator::new(Arc::clone(&self.backend), settings)
    }

    pub fn is_in_flight(&self, message_id: &str) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(message_id)
    }

    fn claim(&self, message_id: &str) -> Result<InFlightGuard, RunError> {
        let mut registry = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !registry.insert(message_id.to_string()) {
            return Err(RunError::AlreadyInFlight(message_id.to_string()));
        }
        Ok(InFlightGuard {
            registry: Arc::clone(&self.in_flight),
            message_id: message_id.to_string(),
        })
    }

    /// Translate `message` into every language of `settings` and commit the
    /// results.
    ///
    /// Eligibility is the caller's concern. A language that fails is left out
    /// of the map; only a failed commit fails the run.
    pub async fn run(
        &self,
        message: &Message,
        settings: &TranslationSettings,
    ) -> Result<RunReport, RunError> {
        let _guard = self.claim(&message.id)?;
        let metrics = TranslationMetrics::global();
        metrics.record_run_started();

        // Fixed for the whole run
        let languages: Vec<String> = settings.languages.codes().to_vec();
        info!(
            message_id = %message.id,
            languages = languages.len(),
            backend = self.backend.name(),
            "Starting translation run"
        );

        let translator = Arc::new(self.translator(settings));
        let limiter = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));
        let results = Arc::new(Mutex::new(TranslationMap::new()));
        let failures = Arc::new(Mutex::new(BTreeMap::new()));
        let text: Arc<str> = Arc::from(message.message.as_str());
        let context = Arc::new(TranslationContext::for_user(&message.user_id));

        let mut workers = JoinSet::new();
        for language in &languages {
            let translator = Arc::clone(&translator);
            let limiter = Arc::clone(&limiter);
            let results = Arc::clone(&results);
            let failures = Arc::clone(&failures);
            let context = Arc::clone(&context);
            let mut job = TranslationJob::new(&message.id, Arc::clone(&text), language.as_str());

            workers.spawn(async move {
                let _permit = match limiter.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };

                match translator.translate(&mut job, &context).await {
                    Ok(translated) => {
                        debug!(
                            message_id = %job.message_id,
                            language = %job.language,
                            attempts = job.attempts,
                            "Language translated"
                        );
                        results.lock().await.insert(job.language, translated);
                    }
                    Err(e) => {
                        warn!(
                            message_id = %job.message_id,
                            language = %job.language,
                            attempts = job.attempts,
                            "Giving up on language: {}",
                            e
                        );
                        TranslationMetrics::global().record_language_omitted();
                        failures.lock().await.insert(job.language, e.to_string());
                    }
                }
            });
        }

        match settings.run_deadline {
            Some(deadline) => {
                if timeout(deadline, drain(&mut workers)).await.is_err() {
                    warn!(
                        message_id = %message.id,
                        "Run deadline of {:?} reached, committing partial results",
                        deadline
                    );
                    workers.abort_all();
                    drain(&mut workers).await;
                }
            }
            None => drain(&mut workers).await,
        }

        let produced = results.lock().await.clone();
        let failed = failures.lock().await.clone();
        let unfinished: Vec<String> = languages
            .iter()
            .filter(|lang| !produced.contains_key(*lang) && !failed.contains_key(*lang))
            .cloned()
            .collect();

        let translations = match self.committer.commit(&message.id, &produced).await? {
            CommitOutcome::Committed(stored) => stored,
            CommitOutcome::NothingToCommit => TranslationMap::new(),
        };

        info!(
            message_id = %message.id,
            succeeded = produced.len(),
            failed = failed.len(),
            unfinished = unfinished.len(),
            "Translation run finished"
        );

        Ok(RunReport {
            message_id: message.id.clone(),
            translations,
            succeeded: produced.into_keys().collect(),
            failed,
            unfinished,
        })
    }
}

/// Wait for every worker; aborted workers are expected, panics are logged.
async fn drain(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                error!("Translation worker panicked: {}", e);
            }
        }
    }
}
