//! Sequenced, snapshot-published table of merged views.
//!
//! Every reconciliation pass carries a sequence number taken when it started.
//! The cache keeps the sequence of the last applied full table and of each
//! row, so an older pass that finishes late can never overwrite the output of
//! a newer one. Readers get an `Arc<ViewTable>` and always see a complete
//! table.

use std::sync::Arc;

use skillswap_ledger::{Identity, ParticipantId};
use tokio::sync::watch;

use crate::view::MergedView;

#[derive(Debug, Clone)]
struct Row {
    seq: u64,
    view: Arc<MergedView>,
}

/// Immutable snapshot of the cache, in source order.
#[derive(Debug, Clone, Default)]
pub struct ViewTable {
    seq: u64,
    rows: Vec<Row>,
}

impl ViewTable {
    /// Sequence of the full pass this table was built from (0 before the first).
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: ParticipantId) -> Option<Arc<MergedView>> {
        self.rows
            .iter()
            .find(|r| r.view.id == id)
            .map(|r| Arc::clone(&r.view))
    }

    #[must_use]
    pub fn get_by_identity(&self, identity: &Identity) -> Option<Arc<MergedView>> {
        self.rows
            .iter()
            .find(|r| r.view.identity == *identity)
            .map(|r| Arc::clone(&r.view))
    }

    /// Sequence of the pass that produced the row for `id`.
    #[must_use]
    pub fn row_seq(&self, id: ParticipantId) -> Option<u64> {
        self.rows.iter().find(|r| r.view.id == id).map(|r| r.seq)
    }

    pub fn views(&self) -> impl Iterator<Item = &Arc<MergedView>> {
        self.rows.iter().map(|r| &r.view)
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<Arc<MergedView>> {
        self.views().cloned().collect()
    }
}

pub struct ViewCache {
    tx: watch::Sender<Arc<ViewTable>>,
}

impl Default for ViewCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewCache {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(ViewTable::default()));
        Self { tx }
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<ViewTable> {
        Arc::clone(&self.tx.borrow())
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<ViewTable>> {
        self.tx.subscribe()
    }

    /// Replace the table with the output of full pass `seq`.
    ///
    /// Returns `false` if a newer full table is already applied. Rows written
    /// by a single-row pass that started after `seq` survive the replacement.
    pub fn apply_full(&self, seq: u64, views: Vec<MergedView>) -> bool {
        self.tx.send_if_modified(|table| {
            if seq <= table.seq {
                tracing::debug!(seq, current = table.seq, "discarding stale full table");
                return false;
            }

            let mut rows: Vec<Row> = views
                .into_iter()
                .map(|view| match table.rows.iter().find(|r| r.view.id == view.id) {
                    Some(newer) if newer.seq > seq => newer.clone(),
                    _ => Row {
                        seq,
                        view: Arc::new(view),
                    },
                })
                .collect();

            // Rows first seen by a later single-row pass.
            let missing: Vec<Row> = table
                .rows
                .iter()
                .filter(|r| r.seq > seq && !rows.iter().any(|n| n.view.id == r.view.id))
                .cloned()
                .collect();
            rows.extend(missing);

            *table = Arc::new(ViewTable { seq, rows });
            true
        })
    }

    /// Replace (or append) the row for `view.id` with the output of pass `seq`.
    ///
    /// Returns `false` if the row was last written by a newer pass, or if the
    /// row is absent from a full table newer than `seq`.
    pub fn apply_row(&self, seq: u64, view: MergedView) -> bool {
        self.tx.send_if_modified(|table| {
            let position = table.rows.iter().position(|r| r.view.id == view.id);
            match position {
                Some(i) if table.rows[i].seq > seq => {
                    tracing::debug!(seq, id = %view.id, "discarding stale row");
                    false
                }
                None if seq < table.seq => {
                    tracing::debug!(seq, id = %view.id, "discarding row older than table");
                    false
                }
                _ => {
                    let mut next = ViewTable::clone(table);
                    let row = Row {
                        seq,
                        view: Arc::new(view),
                    };
                    match position {
                        Some(i) => next.rows[i] = row,
                        None => next.rows.push(row),
                    }
                    *table = Arc::new(next);
                    true
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use skillswap_ledger::{ContactChannels, Fingerprint};

    use super::*;
    use crate::view::DisplaySource;

    fn view(id: u64, name: &str) -> MergedView {
        MergedView {
            id: ParticipantId::new(id).unwrap(),
            identity: Identity::new(&format!("0x{id:02}")),
            display_name: name.into(),
            bio: String::new(),
            contacts: ContactChannels::default(),
            teach_fingerprint: Fingerprint::digest("a"),
            learn_fingerprint: Fingerprint::digest("b"),
            teach_display: "a".into(),
            learn_display: "b".into(),
            teach_source: DisplaySource::Annotation,
            learn_source: DisplaySource::Annotation,
        }
    }

    fn names(cache: &ViewCache) -> Vec<String> {
        cache
            .snapshot()
            .views()
            .map(|v| v.display_name.clone())
            .collect()
    }

    fn id(raw: u64) -> ParticipantId {
        ParticipantId::new(raw).unwrap()
    }

    #[test]
    fn starts_empty() {
        let cache = ViewCache::new();
        assert!(cache.snapshot().is_empty());
        assert_eq!(cache.snapshot().seq(), 0);
    }

    #[test]
    fn full_table_keeps_source_order() {
        let cache = ViewCache::new();
        assert!(cache.apply_full(1, vec![view(2, "b"), view(1, "a"), view(3, "c")]));
        assert_eq!(names(&cache), ["b", "a", "c"]);
        assert_eq!(cache.snapshot().seq(), 1);
    }

    #[test]
    fn late_earlier_full_pass_is_discarded() {
        let cache = ViewCache::new();
        assert!(cache.apply_full(2, vec![view(1, "p2")]));
        assert!(!cache.apply_full(1, vec![view(1, "p1")]));
        assert_eq!(names(&cache), ["p2"]);
        assert_eq!(cache.snapshot().seq(), 2);
    }

    #[test]
    fn newer_row_survives_older_full_table() {
        let cache = ViewCache::new();
        cache.apply_full(1, vec![view(1, "a1"), view(2, "b1")]);
        assert!(cache.apply_row(3, view(2, "b3")));
        assert!(cache.apply_full(2, vec![view(1, "a2"), view(2, "b2")]));
        assert_eq!(names(&cache), ["a2", "b3"]);
        assert_eq!(cache.snapshot().row_seq(id(2)), Some(3));
        assert_eq!(cache.snapshot().row_seq(id(1)), Some(2));
    }

    #[test]
    fn stale_row_is_discarded() {
        let cache = ViewCache::new();
        cache.apply_row(5, view(1, "new"));
        assert!(!cache.apply_row(4, view(1, "old")));
        assert_eq!(names(&cache), ["new"]);
    }

    #[test]
    fn row_missing_from_newer_table_is_not_resurrected() {
        let cache = ViewCache::new();
        cache.apply_full(3, vec![view(1, "a")]);
        assert!(!cache.apply_row(2, view(9, "ghost")));
        assert!(cache.snapshot().get(id(9)).is_none());
    }

    #[test]
    fn row_from_later_pass_kept_when_absent_from_table() {
        let cache = ViewCache::new();
        cache.apply_row(4, view(7, "registered"));
        cache.apply_full(3, vec![view(1, "a")]);
        assert_eq!(names(&cache), ["a", "registered"]);
    }

    #[test]
    fn vanished_rows_dropped_on_full_table() {
        let cache = ViewCache::new();
        cache.apply_full(1, vec![view(1, "a"), view(2, "b")]);
        cache.apply_full(2, vec![view(2, "b")]);
        assert!(cache.snapshot().get(id(1)).is_none());
    }

    #[test]
    fn old_snapshot_is_unchanged_by_updates() {
        let cache = ViewCache::new();
        cache.apply_full(1, vec![view(1, "a")]);
        let before = cache.snapshot();
        cache.apply_row(2, view(1, "a2"));
        assert_eq!(before.get(id(1)).unwrap().display_name, "a");
        assert_eq!(cache.snapshot().get(id(1)).unwrap().display_name, "a2");
    }

    #[test]
    fn lookup_by_identity() {
        let cache = ViewCache::new();
        cache.apply_full(1, vec![view(1, "a"), view(2, "b")]);
        let found = cache.snapshot().get_by_identity(&Identity::new("0x02"));
        assert_eq!(found.unwrap().display_name, "b");
    }

    #[tokio::test]
    async fn subscribers_see_new_snapshots() {
        let cache = ViewCache::new();
        let mut rx = cache.subscribe();
        cache.apply_full(1, vec![view(1, "a")]);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }
}
