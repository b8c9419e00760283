//! Turns the ledger's change stream into a bounded number of refresh passes.
//!
//! At most one pass runs at a time and at most one more waits behind it.
//! Requests that arrive while a pass is running are folded into the waiting
//! pass, so a burst of notifications costs two passes, not one per event.

use std::sync::Arc;

use skillswap_ledger::{
    ChangeKind, ChangeNotification, Identity, RecordSource, Subscription, SubscriptionEvent,
};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::engine::Engine;

/// What a refresh pass has to do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingWork {
    /// Rebuild the whole table from `read_all`.
    pub full: bool,
    /// Re-read and re-merge the local participant's row.
    pub self_record: bool,
    /// Re-resolve the local participant's recorded matches.
    pub matches: bool,
}

impl PendingWork {
    #[must_use]
    pub fn full() -> Self {
        Self {
            full: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !(self.full || self.self_record || self.matches)
    }

    pub fn merge(&mut self, other: Self) {
        self.full |= other.full;
        self.self_record |= other.self_record;
        self.matches |= other.matches;
    }

    #[must_use]
    pub fn for_notification(notification: &ChangeNotification, local: Option<&Identity>) -> Self {
        let is_self = local.is_some_and(|id| *id == notification.identity);
        Self {
            full: true,
            self_record: is_self,
            matches: is_self && notification.kind == ChangeKind::Matched,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Nothing was running; start this work now.
    StartNow(PendingWork),
    /// A pass is running; this work is now the waiting pass.
    Queued,
    /// Folded into the already-waiting pass.
    Coalesced,
}

/// Bookkeeping for the one-running-plus-one-waiting rule.
#[derive(Debug, Default)]
pub struct PassScheduler {
    in_flight: bool,
    queued: Option<PendingWork>,
}

impl PassScheduler {
    pub fn request(&mut self, work: PendingWork) -> Admission {
        if !self.in_flight {
            self.in_flight = true;
            return Admission::StartNow(work);
        }
        match &mut self.queued {
            Some(queued) => {
                queued.merge(work);
                Admission::Coalesced
            }
            None => {
                self.queued = Some(work);
                Admission::Queued
            }
        }
    }

    /// Mark the running pass finished and hand back the next one, if any.
    pub fn complete(&mut self) -> Option<PendingWork> {
        let next = self.queued.take();
        self.in_flight = next.is_some();
        next
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.in_flight
    }

    #[must_use]
    pub fn queued(&self) -> Option<PendingWork> {
        self.queued
    }
}

/// Subscribe to `engine`'s source and keep its view cache in sync until
/// `shutdown` flips to `true` or the source closes the stream.
pub fn spawn<S>(engine: Arc<Engine<S>>, shutdown: watch::Receiver<bool>) -> JoinHandle<()>
where
    S: RecordSource + 'static,
{
    let subscription = engine.source().subscribe();
    tokio::spawn(run(engine, subscription, shutdown))
}

pub async fn run<S>(
    engine: Arc<Engine<S>>,
    mut subscription: Subscription,
    mut shutdown: watch::Receiver<bool>,
) where
    S: RecordSource + 'static,
{
    let mut scheduler = PassScheduler::default();
    let mut passes: JoinSet<()> = JoinSet::new();

    tracing::info!("view sync started");
    if let Admission::StartNow(work) = scheduler.request(PendingWork::full()) {
        start_pass(&mut passes, &engine, work);
    }

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    tracing::info!("view sync shutting down");
                    break;
                }
            }
            Some(joined) = passes.join_next() => {
                if let Err(e) = joined {
                    tracing::warn!("refresh pass aborted: {e}");
                }
                if let Some(next) = scheduler.complete() {
                    tracing::debug!(?next, "starting queued pass");
                    start_pass(&mut passes, &engine, next);
                }
            }
            event = subscription.recv() => {
                let work = match event {
                    Some(SubscriptionEvent::Change(n)) => {
                        tracing::debug!(
                            kind = %n.kind,
                            identity = %n.identity.short(),
                            "change notification"
                        );
                        PendingWork::for_notification(&n, engine.local_identity())
                    }
                    Some(SubscriptionEvent::Missed(count)) => {
                        tracing::warn!(count, "missed change notifications, scheduling full pass");
                        PendingWork::full()
                    }
                    None => {
                        tracing::info!("change stream closed, stopping view sync");
                        break;
                    }
                };
                match scheduler.request(work) {
                    Admission::StartNow(work) => start_pass(&mut passes, &engine, work),
                    Admission::Queued => tracing::debug!("pass queued behind running pass"),
                    Admission::Coalesced => tracing::debug!("request coalesced into queued pass"),
                }
            }
        }
    }

    while let Some(joined) = passes.join_next().await {
        if let Err(e) = joined {
            tracing::warn!("refresh pass aborted: {e}");
        }
    }
    subscription.unsubscribe();
}

fn start_pass<S>(passes: &mut JoinSet<()>, engine: &Arc<Engine<S>>, work: PendingWork)
where
    S: RecordSource + 'static,
{
    let engine = Arc::clone(engine);
    passes.spawn(async move {
        // Failures are already reported through the status channel.
        let _ = engine.run_pass(work).await;
    });
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use skillswap_annotations::AnnotationStore;
    use skillswap_ledger::{ContactChannels, Fingerprint, InMemoryLedger, ParticipantId, ParticipantRecord};

    use super::*;

    fn notification(kind: ChangeKind, identity: &str) -> ChangeNotification {
        ChangeNotification {
            kind,
            identity: Identity::new(identity),
            affected_ids: Vec::new(),
        }
    }

    fn record(id: u64, identity: &str, teach: &str, learn: &str) -> ParticipantRecord {
        ParticipantRecord {
            id: ParticipantId::new(id).unwrap(),
            identity: Identity::new(identity),
            display_name: format!("user{id}"),
            teach_fingerprint: Fingerprint::digest(teach),
            learn_fingerprint: Fingerprint::digest(learn),
            bio: String::new(),
            contacts: ContactChannels::default(),
        }
    }

    #[test]
    fn other_participant_change_requests_full_pass_only() {
        let local = Identity::new("0xme");
        let work = PendingWork::for_notification(
            &notification(ChangeKind::Matched, "0xother"),
            Some(&local),
        );
        assert_eq!(work, PendingWork::full());
    }

    #[test]
    fn self_match_requests_match_refresh() {
        let local = Identity::new("0xme");
        let work =
            PendingWork::for_notification(&notification(ChangeKind::Matched, "0xME"), Some(&local));
        assert!(work.full && work.self_record && work.matches);

        let work =
            PendingWork::for_notification(&notification(ChangeKind::Updated, "0xme"), Some(&local));
        assert!(work.self_record && !work.matches);
    }

    #[test]
    fn no_local_identity_means_full_only() {
        let work = PendingWork::for_notification(&notification(ChangeKind::Matched, "0xme"), None);
        assert_eq!(work, PendingWork::full());
    }

    #[test]
    fn scheduler_keeps_one_running_and_one_waiting() {
        let mut s = PassScheduler::default();
        assert!(s.is_idle());
        assert_eq!(
            s.request(PendingWork::full()),
            Admission::StartNow(PendingWork::full())
        );

        let self_match = PendingWork {
            full: true,
            self_record: true,
            matches: true,
        };
        assert_eq!(s.request(PendingWork::full()), Admission::Queued);
        assert_eq!(s.request(self_match), Admission::Coalesced);
        assert_eq!(s.request(PendingWork::full()), Admission::Coalesced);
        assert_eq!(s.queued(), Some(self_match));

        assert_eq!(s.complete(), Some(self_match));
        assert!(!s.is_idle());
        assert_eq!(s.complete(), None);
        assert!(s.is_idle());
    }

    #[test]
    fn request_after_idle_starts_immediately() {
        let mut s = PassScheduler::default();
        s.request(PendingWork::full());
        assert_eq!(s.complete(), None);
        assert!(matches!(
            s.request(PendingWork::full()),
            Admission::StartNow(_)
        ));
    }

    #[test]
    fn merge_unions_flags() {
        let mut w = PendingWork::default();
        assert!(w.is_empty());
        w.merge(PendingWork {
            self_record: true,
            ..PendingWork::default()
        });
        w.merge(PendingWork::full());
        assert!(w.full && w.self_record && !w.matches);
    }

    #[tokio::test(start_paused = true)]
    async fn matched_during_running_pass_adds_exactly_one_pass() {
        let ledger = Arc::new(InMemoryLedger::default());
        ledger
            .seed(vec![
                record(1, "0xme", "guitar", "painting"),
                record(2, "0xother", "painting", "guitar"),
            ])
            .unwrap();
        ledger.set_latency(Duration::from_millis(100));

        let engine = Arc::new(
            Engine::new(Arc::clone(&ledger), Arc::new(AnnotationStore::memory_only()))
                .with_local_identity(Identity::new("0xme")),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut status = engine.status();
        let worker = spawn(Arc::clone(&engine), shutdown_rx);

        status.wait_for(|s| s.passes_started == 1).await.unwrap();
        ledger.emit(notification(ChangeKind::Matched, "0xme"));
        ledger.emit(notification(ChangeKind::Updated, "0xother"));
        ledger.emit(notification(ChangeKind::Matched, "0xme"));

        status.wait_for(|s| s.passes_completed == 2).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(engine.status().borrow().passes_started, 2);
        assert_eq!(engine.list_merged_views().len(), 2);

        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lagged_subscription_triggers_full_pass() {
        let ledger = Arc::new(InMemoryLedger::new(1));
        ledger.seed(vec![record(1, "0xa", "x", "y")]).unwrap();
        let engine = Arc::new(Engine::new(
            Arc::clone(&ledger),
            Arc::new(AnnotationStore::memory_only()),
        ));
        let subscription = ledger.subscribe();
        ledger.emit(notification(ChangeKind::Updated, "0xa"));
        ledger.emit(notification(ChangeKind::Updated, "0xa"));
        ledger.emit(notification(ChangeKind::Updated, "0xa"));

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut status = engine.status();
        let worker = tokio::spawn(run(Arc::clone(&engine), subscription, shutdown_rx));

        status.wait_for(|s| s.passes_completed >= 2).await.unwrap();
        assert_eq!(engine.list_merged_views().len(), 1);
        drop(ledger);
        drop(engine);
        worker.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_keeps_previous_views() {
        let ledger = Arc::new(InMemoryLedger::default());
        ledger.seed(vec![record(1, "0xa", "x", "y")]).unwrap();
        let engine = Arc::new(Engine::new(
            Arc::clone(&ledger),
            Arc::new(AnnotationStore::memory_only()),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut status = engine.status();
        let worker = spawn(Arc::clone(&engine), shutdown_rx);
        status.wait_for(|s| s.passes_completed == 1).await.unwrap();

        ledger.set_unavailable(true);
        ledger.emit(notification(ChangeKind::Updated, "0xa"));
        let after = status.wait_for(|s| s.passes_failed == 1).await.unwrap().clone();
        assert!(after.is_stale());
        assert_eq!(engine.list_merged_views().len(), 1);

        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn stops_when_stream_closes() {
        let ledger = InMemoryLedger::default();
        let subscription = ledger.subscribe();
        let engine = Arc::new(Engine::new(
            Arc::new(InMemoryLedger::default()),
            Arc::new(AnnotationStore::memory_only()),
        ));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = tokio::spawn(run(engine, subscription, shutdown_rx));
        drop(ledger);
        worker.await.unwrap();
    }
}
