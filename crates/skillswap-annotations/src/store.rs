use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use skillswap_ledger::Identity;
use tokio::sync::Mutex;

use crate::backend::AnnotationBackend;
use crate::entry::AnnotationEntry;

/// In-memory annotation table, optionally mirrored to a durable backend.
///
/// Reads never touch the backend. Writes are total: the first backend failure
/// is logged once and the store continues in memory for the rest of the
/// session.
pub struct AnnotationStore {
    entries: RwLock<HashMap<Identity, AnnotationEntry>>,
    backend: Option<Box<dyn AnnotationBackend>>,
    degraded: AtomicBool,
    write_lock: Mutex<()>,
}

impl std::fmt::Debug for AnnotationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnotationStore")
            .field("backend", &self.backend.as_ref().map(|b| b.name()))
            .field("degraded", &self.degraded.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for AnnotationStore {
    fn default() -> Self {
        Self::memory_only()
    }
}

impl AnnotationStore {
    #[must_use]
    pub fn memory_only() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            backend: None,
            degraded: AtomicBool::new(false),
            write_lock: Mutex::new(()),
        }
    }

    /// Load persisted entries from `backend`.
    ///
    /// A failing load is reported and the store starts empty in memory-only
    /// mode instead of failing the caller.
    pub async fn open(backend: Box<dyn AnnotationBackend>) -> Self {
        let store = Self {
            backend: Some(backend),
            ..Self::memory_only()
        };
        let Some(backend) = store.backend.as_deref() else {
            return store;
        };
        match backend.load_all().await {
            Ok(rows) => {
                tracing::debug!(count = rows.len(), backend = backend.name(), "annotations loaded");
                store.write_entries().extend(rows);
            }
            Err(e) => store.degrade(&format!("failed to load annotations: {e}")),
        }
        store
    }

    #[must_use]
    pub fn get(&self, identity: &Identity) -> Option<AnnotationEntry> {
        self.read_entries().get(identity).cloned()
    }

    /// Merge `partial` into the entry for `identity` and persist the result.
    ///
    /// Blank fields in `partial` are ignored, so updating one skill never
    /// erases the other.
    pub async fn put(&self, identity: &Identity, partial: AnnotationEntry) {
        let partial = partial.normalized();
        if partial.is_empty() {
            return;
        }

        let _guard = self.write_lock.lock().await;
        let merged = {
            let mut entries = self.write_entries();
            let entry = entries.entry(identity.clone()).or_default();
            entry.merge(&partial);
            entry.clone()
        };

        if let Some(backend) = self.live_backend()
            && let Err(e) = backend.upsert(identity.clone(), merged).await
        {
            self.degrade(&format!(
                "failed to persist annotation for {}: {e}",
                identity.short()
            ));
        }
    }

    pub async fn remove(&self, identity: &Identity) {
        let _guard = self.write_lock.lock().await;
        let existed = self.write_entries().remove(identity).is_some();
        if existed
            && let Some(backend) = self.live_backend()
            && let Err(e) = backend.remove(identity.clone()).await
        {
            self.degrade(&format!(
                "failed to delete annotation for {}: {e}",
                identity.short()
            ));
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while writes still reach a durable backend.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.live_backend().is_some()
    }

    fn live_backend(&self) -> Option<&dyn AnnotationBackend> {
        if self.degraded.load(Ordering::Acquire) {
            return None;
        }
        self.backend.as_deref()
    }

    fn degrade(&self, reason: &str) {
        if !self.degraded.swap(true, Ordering::AcqRel) {
            tracing::warn!("{reason}; annotations are kept in memory for this session");
        }
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Identity, AnnotationEntry>> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_entries(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<Identity, AnnotationEntry>> {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::backend::BoxFuture;
    use crate::error::AnnotationError;
    use crate::sqlite::SqliteBackend;

    struct FailingBackend {
        upserts: Arc<AtomicUsize>,
    }

    impl AnnotationBackend for FailingBackend {
        fn load_all(
            &self,
        ) -> BoxFuture<'_, Result<Vec<(Identity, AnnotationEntry)>, AnnotationError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn upsert(
            &self,
            _identity: Identity,
            _entry: AnnotationEntry,
        ) -> BoxFuture<'_, Result<(), AnnotationError>> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(AnnotationError::Other("disk full".into())) })
        }

        fn remove(&self, _identity: Identity) -> BoxFuture<'_, Result<(), AnnotationError>> {
            Box::pin(async { Ok(()) })
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct BrokenLoadBackend;

    impl AnnotationBackend for BrokenLoadBackend {
        fn load_all(
            &self,
        ) -> BoxFuture<'_, Result<Vec<(Identity, AnnotationEntry)>, AnnotationError>> {
            Box::pin(async { Err(AnnotationError::Other("corrupt".into())) })
        }

        fn upsert(
            &self,
            _identity: Identity,
            _entry: AnnotationEntry,
        ) -> BoxFuture<'_, Result<(), AnnotationError>> {
            Box::pin(async { Ok(()) })
        }

        fn remove(&self, _identity: Identity) -> BoxFuture<'_, Result<(), AnnotationError>> {
            Box::pin(async { Ok(()) })
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = AnnotationStore::memory_only();
        assert!(store.get(&Identity::new("0xabc")).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn partial_put_merges() {
        let store = AnnotationStore::memory_only();
        let id = Identity::new("0xABC");
        store.put(&id, AnnotationEntry::teach("Painting")).await;
        store.put(&id, AnnotationEntry::learn("Guitar")).await;

        let entry = store.get(&Identity::new("0xabc")).unwrap();
        assert_eq!(entry.teach_text.as_deref(), Some("Painting"));
        assert_eq!(entry.learn_text.as_deref(), Some("Guitar"));
    }

    #[tokio::test]
    async fn blank_put_is_noop() {
        let store = AnnotationStore::memory_only();
        let id = Identity::new("0xabc");
        store.put(&id, AnnotationEntry::teach("Painting")).await;
        store.put(&id, AnnotationEntry::new(Some("   "), None)).await;
        assert_eq!(
            store.get(&id).unwrap().teach_text.as_deref(),
            Some("Painting")
        );
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let store = AnnotationStore::memory_only();
        let id = Identity::new("0xabc");
        store.put(&id, AnnotationEntry::teach("Painting")).await;
        let first = store.get(&id);
        store.put(&id, AnnotationEntry::teach("Painting")).await;
        assert_eq!(store.get(&id), first);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn persistence_failure_degrades_once() {
        let upserts = Arc::new(AtomicUsize::new(0));
        let store = AnnotationStore::open(Box::new(FailingBackend {
            upserts: upserts.clone(),
        }))
        .await;
        assert!(store.is_persistent());

        let id = Identity::new("0xabc");
        store.put(&id, AnnotationEntry::teach("Painting")).await;
        assert!(!store.is_persistent());
        store.put(&id, AnnotationEntry::learn("Guitar")).await;

        assert_eq!(upserts.load(Ordering::SeqCst), 1);
        let entry = store.get(&id).unwrap();
        assert_eq!(entry.teach_text.as_deref(), Some("Painting"));
        assert_eq!(entry.learn_text.as_deref(), Some("Guitar"));
    }

    #[tokio::test]
    async fn load_failure_starts_memory_only() {
        let store = AnnotationStore::open(Box::new(BrokenLoadBackend)).await;
        assert!(!store.is_persistent());
        let id = Identity::new("0xabc");
        store.put(&id, AnnotationEntry::teach("Painting")).await;
        assert!(store.get(&id).is_some());
    }

    #[tokio::test]
    async fn reopen_restores_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotations.db");
        let path = path.to_str().unwrap();

        let store = AnnotationStore::open(Box::new(SqliteBackend::open(path).await.unwrap())).await;
        let id = Identity::new("0xabc");
        store.put(&id, AnnotationEntry::teach("Painting")).await;
        store.put(&id, AnnotationEntry::learn("Guitar")).await;
        drop(store);

        let reopened =
            AnnotationStore::open(Box::new(SqliteBackend::open(path).await.unwrap())).await;
        let entry = reopened.get(&id).unwrap();
        assert_eq!(entry.teach_text.as_deref(), Some("Painting"));
        assert_eq!(entry.learn_text.as_deref(), Some("Guitar"));
    }

    #[tokio::test]
    async fn remove_clears_entry() {
        let backend = SqliteBackend::open(":memory:").await.unwrap();
        let store = AnnotationStore::open(Box::new(backend.clone())).await;
        let id = Identity::new("0xabc");
        store.put(&id, AnnotationEntry::teach("Painting")).await;
        store.remove(&id).await;
        assert!(store.get(&id).is_none());
        assert!(backend.load_all().await.unwrap().is_empty());
    }
}
