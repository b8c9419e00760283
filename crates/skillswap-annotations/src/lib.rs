//! Advisory plaintext for the local participant's own skills.
//!
//! Entries are never authoritative: they only improve what is displayed next
//! to a fingerprint and must not influence matching.

mod backend;
mod entry;
mod error;
mod sqlite;
mod store;

pub use backend::{AnnotationBackend, BoxFuture};
pub use entry::AnnotationEntry;
pub use error::AnnotationError;
pub use sqlite::SqliteBackend;
pub use store::AnnotationStore;

/// Layout tag written with every persisted row. Rows carrying any other tag
/// are treated as absent.
pub const SCHEMA_TAG: &str = "skillswap_profiles_v1";
