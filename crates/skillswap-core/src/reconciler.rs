use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use skillswap_annotations::AnnotationStore;
use skillswap_ledger::{Fingerprint, ParticipantRecord, RecordSource};

use crate::view::{DisplaySource, MergedView};

/// Combines authoritative records with local annotations.
///
/// Trust order per skill field: annotation text, then a decode of the
/// fingerprint, then the fingerprint's hex form. `merge` never fails.
pub struct Reconciler<S> {
    source: Arc<S>,
    annotations: Arc<AnnotationStore>,
}

impl<S> Clone for Reconciler<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            annotations: Arc::clone(&self.annotations),
        }
    }
}

impl<S: RecordSource> Reconciler<S> {
    #[must_use]
    pub fn new(source: Arc<S>, annotations: Arc<AnnotationStore>) -> Self {
        Self {
            source,
            annotations,
        }
    }

    #[must_use]
    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    pub async fn merge(&self, record: &ParticipantRecord) -> MergedView {
        let annotation = self.annotations.get(&record.identity).unwrap_or_default();

        let ((teach_display, teach_source), (learn_display, learn_source)) = futures::join!(
            self.display(annotation.teach_text, &record.teach_fingerprint),
            self.display(annotation.learn_text, &record.learn_fingerprint),
        );

        MergedView {
            id: record.id,
            identity: record.identity.clone(),
            display_name: record.display_name.clone(),
            bio: record.bio.clone(),
            contacts: record.contacts.clone(),
            teach_fingerprint: record.teach_fingerprint,
            learn_fingerprint: record.learn_fingerprint,
            teach_display,
            learn_display,
            teach_source,
            learn_source,
        }
    }

    /// Merge every record, preserving input order.
    pub async fn merge_all(&self, records: &[ParticipantRecord]) -> Vec<MergedView> {
        futures::future::join_all(records.iter().map(|r| self.merge(r))).await
    }

    async fn display(
        &self,
        annotation: Option<String>,
        fingerprint: &Fingerprint,
    ) -> (String, DisplaySource) {
        if let Some(text) = annotation.filter(|t| !t.trim().is_empty()) {
            return (text, DisplaySource::Annotation);
        }

        match AssertUnwindSafe(self.source.decode(fingerprint))
            .catch_unwind()
            .await
        {
            Ok(Ok(text)) if !text.trim().is_empty() => (text, DisplaySource::Decoded),
            Ok(Ok(_)) => {
                tracing::debug!(%fingerprint, "decoded to empty text, showing raw");
                (fingerprint.to_hex(), DisplaySource::Raw)
            }
            Ok(Err(e)) => {
                tracing::debug!(%fingerprint, "undecodable fingerprint: {e}");
                (fingerprint.to_hex(), DisplaySource::Raw)
            }
            Err(_) => {
                tracing::warn!(%fingerprint, "decoder panicked, showing raw fingerprint");
                (fingerprint.to_hex(), DisplaySource::Raw)
            }
        }
    }
}
