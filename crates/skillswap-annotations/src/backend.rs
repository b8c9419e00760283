use std::future::Future;
use std::pin::Pin;

use skillswap_ledger::Identity;

use crate::entry::AnnotationEntry;
use crate::error::AnnotationError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable storage behind [`crate::AnnotationStore`].
pub trait AnnotationBackend: Send + Sync {
    /// Every entry stored under the current schema tag.
    fn load_all(&self) -> BoxFuture<'_, Result<Vec<(Identity, AnnotationEntry)>, AnnotationError>>;

    /// Replace the stored entry for `identity` with `entry`.
    fn upsert(
        &self,
        identity: Identity,
        entry: AnnotationEntry,
    ) -> BoxFuture<'_, Result<(), AnnotationError>>;

    fn remove(&self, identity: Identity) -> BoxFuture<'_, Result<(), AnnotationError>>;

    fn name(&self) -> &'static str;
}
