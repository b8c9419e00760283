use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use skillswap_annotations::{AnnotationEntry, AnnotationStore};
use skillswap_ledger::{
    Identity, ParticipantId, ProfileUpdate, RecordSource, RecordWriter, Registration, SourceError,
};
use tokio::sync::watch;

use crate::coalescer::PendingWork;
use crate::error::EngineError;
use crate::matcher;
use crate::profile;
use crate::reconciler::Reconciler;
use crate::status::{StatusReporter, SyncStatus};
use crate::view::{MatchResult, MergedView};
use crate::view_cache::{ViewCache, ViewTable};

/// Facade over the reconciliation pipeline.
///
/// Reads are served from the view cache; every write to the cache goes
/// through a sequenced pass so an older pass can never overwrite a newer one.
pub struct Engine<S> {
    source: Arc<S>,
    reconciler: Reconciler<S>,
    cache: ViewCache,
    status: StatusReporter,
    seq: AtomicU64,
    local: Option<Identity>,
    recorded: RwLock<(u64, Vec<MatchResult>)>,
}

impl<S: RecordSource> Engine<S> {
    #[must_use]
    pub fn new(source: Arc<S>, annotations: Arc<AnnotationStore>) -> Self {
        let (status, _) = StatusReporter::new();
        let persistent = annotations.is_persistent();
        status.update(|s| s.annotations_persistent = persistent);
        Self {
            reconciler: Reconciler::new(Arc::clone(&source), annotations),
            source,
            cache: ViewCache::new(),
            status,
            seq: AtomicU64::new(0),
            local: None,
            recorded: RwLock::new((0, Vec::new())),
        }
    }

    /// Set the identity of the participant running this engine.
    #[must_use]
    pub fn with_local_identity(mut self, identity: Identity) -> Self {
        self.local = (!identity.is_empty()).then_some(identity);
        self
    }

    #[must_use]
    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    #[must_use]
    pub fn local_identity(&self) -> Option<&Identity> {
        self.local.as_ref()
    }

    #[must_use]
    pub fn annotations(&self) -> &AnnotationStore {
        self.reconciler.annotations()
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<ViewTable> {
        self.cache.snapshot()
    }

    #[must_use]
    pub fn subscribe_views(&self) -> watch::Receiver<Arc<ViewTable>> {
        self.cache.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Cached view for `id`, reading through to the source on a miss.
    ///
    /// # Errors
    ///
    /// `EngineError::NotFound` if the source has no such participant, or the
    /// source error if it could not be reached.
    pub async fn get_merged_view(&self, id: ParticipantId) -> Result<Arc<MergedView>, EngineError> {
        if let Some(view) = self.cache.snapshot().get(id) {
            return Ok(view);
        }

        let seq = self.next_seq();
        let record = self
            .source
            .read_by_id(id)
            .await?
            .ok_or(EngineError::NotFound(id))?;
        let view = self.reconciler.merge(&record).await;
        self.cache.apply_row(seq, view.clone());
        Ok(Arc::new(view))
    }

    /// Every cached view, in source order.
    #[must_use]
    pub fn list_merged_views(&self) -> Vec<Arc<MergedView>> {
        self.cache.snapshot().to_vec()
    }

    /// Preview complementary matches for `id` over the cached table.
    ///
    /// Before the first full table has been applied the cache only holds rows
    /// read through on demand, so a full pass runs first.
    ///
    /// # Errors
    ///
    /// `EngineError::UnknownParticipant` if `id` has no record, or the source
    /// error if that first pass could not read the ledger.
    pub async fn find_matches_for(&self, id: ParticipantId) -> Result<Vec<MatchResult>, EngineError> {
        if self.cache.snapshot().seq() == 0 {
            tracing::debug!(%id, "no full table yet, refreshing before match preview");
            self.run_pass(PendingWork::full()).await?;
        }
        let me = self.require_known(id).await?;
        let views = self.cache.snapshot().to_vec();
        Ok(matcher::match_views(&me, &views))
    }

    /// Matches the ledger persisted for `id`, in ledger order.
    ///
    /// # Errors
    ///
    /// `EngineError::UnknownParticipant` if `id` has no record, or the source
    /// error if the ledger could not be reached.
    pub async fn recorded_matches_for(
        &self,
        id: ParticipantId,
    ) -> Result<Vec<MatchResult>, EngineError> {
        self.require_known(id).await?;
        let ids = self.source.read_match_ids(id).await?;
        self.resolve_ids(id, &ids).await
    }

    /// Last recorded matches of the local participant seen by a refresh.
    #[must_use]
    pub fn local_recorded_matches(&self) -> Vec<MatchResult> {
        self.recorded
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .1
            .clone()
    }

    /// Store skill text for `identity` and rebuild its row.
    ///
    /// The row is re-read from the source under a fresh sequence, so it never
    /// outranks a pass that saw newer fingerprints. If the source is down the
    /// cached record is re-merged at the row's current sequence instead.
    pub async fn record_own_annotation(&self, identity: &Identity, partial: AnnotationEntry) {
        self.annotations().put(identity, partial).await;

        let seq = self.next_seq();
        if let Err(e) = self.reload_row(seq, identity).await {
            tracing::warn!(
                identity = %identity.short(),
                "failed to re-read annotated participant, re-merging cached row: {e}"
            );
            self.remerge_cached(identity).await;
        }
    }

    /// Run a full pass now, outside the change stream.
    ///
    /// # Errors
    ///
    /// Returns the source error if the ledger could not be read; the cache
    /// keeps its previous contents.
    pub async fn refresh(&self) -> Result<(), EngineError> {
        self.run_pass(PendingWork::full()).await
    }

    /// Execute one sequenced pass and report its outcome on the status channel.
    ///
    /// # Errors
    ///
    /// Returns the first source error; views already in the cache are kept.
    pub async fn run_pass(&self, work: PendingWork) -> Result<(), EngineError> {
        let seq = self.next_seq();
        self.status.update(|s| s.passes_started += 1);

        let result = self.execute(seq, work).await;

        let table = self.cache.snapshot();
        let persistent = self.annotations().is_persistent();
        match &result {
            Ok(()) => {
                tracing::debug!(seq, ?work, rows = table.len(), "refresh pass complete");
                self.status.update(|s| {
                    s.passes_completed += 1;
                    s.last_error = None;
                    s.table_seq = table.seq();
                    s.participants = table.len();
                    s.annotations_persistent = persistent;
                });
            }
            Err(e) => {
                tracing::warn!(seq, "refresh pass failed, previous view retained: {e}");
                self.status.update(|s| {
                    s.passes_failed += 1;
                    s.last_error = Some(e.to_string());
                    s.annotations_persistent = persistent;
                });
            }
        }
        result
    }

    async fn execute(&self, seq: u64, work: PendingWork) -> Result<(), EngineError> {
        if work.full {
            self.full_pass(seq).await?;
        }
        if work.self_record {
            self.self_pass(seq).await?;
        }
        if work.matches {
            self.refresh_recorded(seq).await?;
        }
        Ok(())
    }

    async fn full_pass(&self, seq: u64) -> Result<(), EngineError> {
        let records = self.source.read_all().await?;
        let views = self.reconciler.merge_all(&records).await;
        if !self.cache.apply_full(seq, views) {
            tracing::debug!(seq, "full table superseded by a newer pass");
        }
        Ok(())
    }

    async fn self_pass(&self, seq: u64) -> Result<(), EngineError> {
        let Some(local) = &self.local else {
            return Ok(());
        };
        if !self.reload_row(seq, local).await? {
            tracing::debug!(identity = %local.short(), "local participant not registered");
        }
        Ok(())
    }

    /// Read `identity` from the source and apply its merged row at `seq`.
    /// Returns `false` if the source has no such participant.
    async fn reload_row(&self, seq: u64, identity: &Identity) -> Result<bool, EngineError> {
        let Some(record) = self.source.read_by_identity(identity).await? else {
            return Ok(false);
        };
        let view = self.reconciler.merge(&record).await;
        self.cache.apply_row(seq, view);
        Ok(true)
    }

    async fn remerge_cached(&self, identity: &Identity) {
        let table = self.cache.snapshot();
        let Some(cached) = table.get_by_identity(identity) else {
            return;
        };
        let Some(row_seq) = table.row_seq(cached.id) else {
            return;
        };
        let view = self.reconciler.merge(&cached.to_record()).await;
        self.cache.apply_row(row_seq, view);
    }

    async fn refresh_recorded(&self, seq: u64) -> Result<(), EngineError> {
        let Some(id) = self.local_id().await? else {
            return Ok(());
        };
        let ids = self.source.read_match_ids(id).await?;
        let matches = self.resolve_ids(id, &ids).await?;
        self.store_recorded(seq, matches);
        Ok(())
    }

    fn store_recorded(&self, seq: u64, matches: Vec<MatchResult>) {
        let mut recorded = self
            .recorded
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if seq >= recorded.0 {
            *recorded = (seq, matches);
        }
    }

    async fn local_id(&self) -> Result<Option<ParticipantId>, EngineError> {
        let Some(local) = &self.local else {
            return Ok(None);
        };
        if let Some(view) = self.cache.snapshot().get_by_identity(local) {
            return Ok(Some(view.id));
        }
        Ok(self.source.read_by_identity(local).await?.map(|r| r.id))
    }

    async fn require_known(&self, id: ParticipantId) -> Result<Arc<MergedView>, EngineError> {
        match self.get_merged_view(id).await {
            Err(EngineError::NotFound(_)) => Err(EngineError::UnknownParticipant(id)),
            other => other,
        }
    }

    async fn resolve_ids(
        &self,
        self_id: ParticipantId,
        ids: &[ParticipantId],
    ) -> Result<Vec<MatchResult>, EngineError> {
        let source = &self.source;
        let reconciler = &self.reconciler;
        let matches = matcher::resolve_recorded(self_id, ids, |other| async move {
            let Some(record) = source.read_by_id(other).await? else {
                return Ok(None);
            };
            Ok::<_, SourceError>(Some(reconciler.merge(&record).await))
        })
        .await?;
        Ok(matches)
    }

    fn require_local(&self) -> Result<&Identity, EngineError> {
        self.local.as_ref().ok_or(EngineError::NoLocalIdentity)
    }

    async fn refresh_local_row(&self) {
        let seq = self.next_seq();
        if let Err(e) = self.self_pass(seq).await {
            tracing::warn!("failed to refresh local participant: {e}");
        }
    }
}

impl<S: RecordSource + RecordWriter> Engine<S> {
    /// Register the local participant and remember the skill text it typed.
    ///
    /// # Errors
    ///
    /// `EngineError::Validation` for bad input, or the ledger's error if the
    /// registration was refused. Nothing is recorded locally on failure.
    pub async fn register_self(
        &self,
        registration: Registration,
    ) -> Result<ParticipantId, EngineError> {
        let identity = self.require_local()?.clone();
        let registration = profile::validate_registration(&registration)?;

        let id = self.source.register(&identity, &registration).await?;
        tracing::info!(%id, identity = %identity.short(), "registered local participant");

        self.annotations()
            .put(
                &identity,
                AnnotationEntry::new(Some(&registration.teach), Some(&registration.learn)),
            )
            .await;
        self.refresh_local_row().await;
        Ok(id)
    }

    /// Update the local participant. Empty fields keep their current value.
    ///
    /// # Errors
    ///
    /// `EngineError::NotRegistered` before registration, `Validation` for bad
    /// input, or the ledger's error if the update was refused.
    pub async fn update_self(&self, update: ProfileUpdate) -> Result<(), EngineError> {
        let identity = self.require_local()?.clone();
        let current = self
            .source
            .read_by_identity(&identity)
            .await?
            .ok_or(EngineError::NotRegistered)?;
        let update = profile::validate_update(&update, &current)?;

        self.source.update_profile(current.id, &update).await?;
        tracing::info!(id = %current.id, "updated local participant");

        self.annotations()
            .put(
                &identity,
                AnnotationEntry::new(update.teach.as_deref(), update.learn.as_deref()),
            )
            .await;
        self.refresh_local_row().await;
        Ok(())
    }

    /// Ask the ledger to compute and persist matches for the local participant.
    ///
    /// # Errors
    ///
    /// `EngineError::NotRegistered` before registration, or the ledger's error.
    pub async fn compute_matches_self(&self) -> Result<Vec<MatchResult>, EngineError> {
        let identity = self.require_local()?;
        let me = self
            .source
            .read_by_identity(identity)
            .await?
            .ok_or(EngineError::NotRegistered)?;

        let seq = self.next_seq();
        let ids = self.source.compute_matches(me.id).await?;
        let matches = self.resolve_ids(me.id, &ids).await?;
        tracing::info!(id = %me.id, count = matches.len(), "matches computed");
        self.store_recorded(seq, matches.clone());
        Ok(matches)
    }

    /// Pair the local participant with `other` on the ledger, regardless of
    /// skills, and return the local participant's recorded matches.
    ///
    /// # Errors
    ///
    /// `EngineError::NotRegistered` before registration, `Validation` when
    /// `other` is the local participant, `UnknownParticipant` when `other`
    /// has no record, or the ledger's error.
    pub async fn match_with(&self, other: ParticipantId) -> Result<Vec<MatchResult>, EngineError> {
        let identity = self.require_local()?;
        let me = self
            .source
            .read_by_identity(identity)
            .await?
            .ok_or(EngineError::NotRegistered)?;
        if other == me.id {
            return Err(EngineError::Validation(
                "cannot match a participant with itself".into(),
            ));
        }
        if self.source.read_by_id(other).await?.is_none() {
            return Err(EngineError::UnknownParticipant(other));
        }

        let seq = self.next_seq();
        self.source.match_users(me.id, other).await?;
        let ids = self.source.read_match_ids(me.id).await?;
        let matches = self.resolve_ids(me.id, &ids).await?;
        tracing::info!(id = %me.id, %other, "participants paired");
        self.store_recorded(seq, matches.clone());
        Ok(matches)
    }
}
