use serde::Serialize;
use tokio::sync::watch;

/// Observable state of view synchronization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub passes_started: u64,
    pub passes_completed: u64,
    pub passes_failed: u64,
    /// Sequence of the last full table applied to the cache.
    pub table_seq: u64,
    pub participants: usize,
    pub last_error: Option<String>,
    pub annotations_persistent: bool,
}

impl SyncStatus {
    /// True when the last pass failed and readers see an older table.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.last_error.is_some()
    }
}

pub struct StatusReporter {
    tx: watch::Sender<SyncStatus>,
}

impl StatusReporter {
    #[must_use]
    pub fn new() -> (Self, watch::Receiver<SyncStatus>) {
        let (tx, rx) = watch::channel(SyncStatus::default());
        (Self { tx }, rx)
    }

    pub fn update(&self, f: impl FnOnce(&mut SyncStatus)) {
        self.tx.send_modify(f);
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_status() {
        let s = SyncStatus::default();
        assert_eq!(s.passes_started, 0);
        assert_eq!(s.table_seq, 0);
        assert!(!s.is_stale());
    }

    #[test]
    fn reporter_update_is_visible() {
        let (reporter, rx) = StatusReporter::new();
        reporter.update(|s| {
            s.passes_started = 2;
            s.last_error = Some("down".into());
        });
        assert_eq!(rx.borrow().passes_started, 2);
        assert!(rx.borrow().is_stale());
        assert!(reporter.subscribe().borrow().is_stale());
    }

    #[test]
    fn multiple_updates_accumulate() {
        let (reporter, _rx) = StatusReporter::new();
        reporter.update(|s| s.passes_completed += 1);
        reporter.update(|s| s.passes_completed += 1);
        assert_eq!(reporter.current().passes_completed, 2);
    }
}
