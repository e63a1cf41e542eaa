//! Translation metrics and observability.
//!
//! Process-wide counters for runs, backend calls and commits.

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

/// Global translation metrics singleton.
pub struct TranslationMetrics {
    /// Fan-out runs started
    runs_started: AtomicUsize,

    /// Messages rejected by the eligibility gate
    runs_skipped: AtomicUsize,

    /// Individual backend calls, including retries
    backend_calls: AtomicUsize,

    /// Backend calls that failed or timed out
    backend_failures: AtomicUsize,

    /// Languages left out of a run after exhausting retries
    languages_omitted: AtomicUsize,

    /// Successful commits onto messages
    commits: AtomicUsize,

    /// Commits the message store rejected
    commit_failures: AtomicUsize,
}

/// Global metrics instance (initialized lazily)
static METRICS: OnceLock<TranslationMetrics> = OnceLock::new();

impl TranslationMetrics {
    /// Get the global translation metrics instance.
    pub fn global() -> &'static TranslationMetrics {
        METRICS.get_or_init(TranslationMetrics::new)
    }

    fn new() -> Self {
        Self {
            runs_started: AtomicUsize::new(0),
            runs_skipped: AtomicUsize::new(0),
            backend_calls: AtomicUsize::new(0),
            backend_failures: AtomicUsize::new(0),
            languages_omitted: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            commit_failures: AtomicUsize::new(0),
        }
    }

    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run_skipped(&self) {
        self.runs_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backend_call(&self) {
        self.backend_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backend_failure(&self) {
        self.backend_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_language_omitted(&self) {
        self.languages_omitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_commit_failure(&self) {
        self.commit_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Generate a metrics report.
    pub fn report(&self) -> MetricsReport {
        let calls = self.backend_calls.load(Ordering::Relaxed);
        let failures = self.backend_failures.load(Ordering::Relaxed);
        let backend_success_rate = if calls > 0 {
            (calls.saturating_sub(failures) as f64 / calls as f64) * 100.0
        } else {
            0.0
        };

        MetricsReport {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_skipped: self.runs_skipped.load(Ordering::Relaxed),
            backend_calls: calls,
            backend_failures: failures,
            backend_success_rate,
            languages_omitted: self.languages_omitted.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            commit_failures: self.commit_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of translation metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub runs_started: usize,
    pub runs_skipped: usize,
    pub backend_calls: usize,
    pub backend_failures: usize,
    /// Percentage of backend calls that succeeded
    pub backend_success_rate: f64,
    pub languages_omitted: usize,
    pub commits: usize,
    pub commit_failures: usize,
}
