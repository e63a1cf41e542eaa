//! Writes a run's results onto the stored message.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::message::{TranslationMap, TRANSLATION_POST_TYPE};
use crate::metrics::TranslationMetrics;
use crate::store::{MessageStore, StoreError};

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("failed to update message {id}: {source}")]
    Update {
        id: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// The full translation map stored on the message after the merge.
    Committed(TranslationMap),
    /// The run produced nothing; the message was left untouched.
    NothingToCommit,
}

pub struct TranslationCommitter {
    store: Arc<dyn MessageStore>,
}

impl TranslationCommitter {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// Merge `results` into the message's translations.
    ///
    /// The store applies the merge atomically and writes nothing but the
    /// translations and the post type, so concurrent commits and edits made
    /// while the run was in flight both survive. Store failures are returned
    /// as-is; nothing here retries them.
    pub async fn commit(
        &self,
        message_id: &str,
        results: &TranslationMap,
    ) -> Result<CommitOutcome, CommitError> {
        if results.is_empty() {
            debug!(message_id, "No translations to commit");
            return Ok(CommitOutcome::NothingToCommit);
        }

        let metrics = TranslationMetrics::global();

        // Other post types (system messages) keep their own rendering
        let stored = self
            .store
            .merge_translations(message_id, results, TRANSLATION_POST_TYPE)
            .await
            .map_err(|source| {
                metrics.record_commit_failure();
                error!(message_id, "Failed to store translations: {}", source);
                CommitError::Update {
                    id: message_id.to_string(),
                    source,
                }
            })?;

        metrics.record_commit();
        info!(
            message_id,
            languages = results.len(),
            "✓ Translations committed"
        );
        Ok(CommitOutcome::Committed(stored.translations()))
    }
}
