use std::str::FromStr;

use skillswap_ledger::Identity;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use crate::SCHEMA_TAG;
use crate::backend::{AnnotationBackend, BoxFuture};
use crate::entry::AnnotationEntry;
use crate::error::AnnotationError;

#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

type EntryTuple = (String, Option<String>, Option<String>);

impl SqliteBackend {
    /// Open (or create) the annotation database and ensure its table exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub async fn open(path: &str) -> Result<Self, AnnotationError> {
        let in_memory = path == ":memory:";
        let url = if in_memory {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let opts = SqliteConnectOptions::from_str(&url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // Each in-memory connection is its own database.
        let max_connections = if in_memory { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let backend = Self { pool };
        backend.init().await?;
        Ok(backend)
    }

    /// Wrap an existing pool. Call [`SqliteBackend::init`] before use.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `annotations` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn init(&self) -> Result<(), AnnotationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS annotations (
                identity TEXT PRIMARY KEY NOT NULL,
                schema_tag TEXT NOT NULL,
                teach_text TEXT,
                learn_text TEXT,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn load_current(&self) -> Result<Vec<(Identity, AnnotationEntry)>, AnnotationError> {
        let rows: Vec<EntryTuple> = sqlx::query_as(
            "SELECT identity, teach_text, learn_text FROM annotations \
             WHERE schema_tag = ? ORDER BY identity",
        )
        .bind(SCHEMA_TAG)
        .fetch_all(&self.pool)
        .await?;

        let (foreign,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM annotations WHERE schema_tag != ?")
                .bind(SCHEMA_TAG)
                .fetch_one(&self.pool)
                .await?;
        if foreign > 0 {
            tracing::warn!(
                rows = foreign,
                "ignoring annotations written under an unknown schema tag"
            );
        }

        Ok(rows
            .into_iter()
            .map(|(identity, teach, learn)| {
                (
                    Identity::new(&identity),
                    AnnotationEntry {
                        teach_text: teach,
                        learn_text: learn,
                    }
                    .normalized(),
                )
            })
            .filter(|(_, entry)| !entry.is_empty())
            .collect())
    }

    async fn upsert_entry(
        &self,
        identity: &Identity,
        entry: &AnnotationEntry,
    ) -> Result<(), AnnotationError> {
        sqlx::query(
            "INSERT INTO annotations (identity, schema_tag, teach_text, learn_text, updated_at) \
             VALUES (?, ?, ?, ?, datetime('now')) \
             ON CONFLICT(identity) DO UPDATE SET \
             schema_tag = excluded.schema_tag, \
             teach_text = excluded.teach_text, \
             learn_text = excluded.learn_text, \
             updated_at = datetime('now')",
        )
        .bind(identity.as_str())
        .bind(SCHEMA_TAG)
        .bind(entry.teach_text.as_deref())
        .bind(entry.learn_text.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_entry(&self, identity: &Identity) -> Result<(), AnnotationError> {
        sqlx::query("DELETE FROM annotations WHERE identity = ?")
            .bind(identity.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl AnnotationBackend for SqliteBackend {
    fn load_all(&self) -> BoxFuture<'_, Result<Vec<(Identity, AnnotationEntry)>, AnnotationError>> {
        Box::pin(self.load_current())
    }

    fn upsert(
        &self,
        identity: Identity,
        entry: AnnotationEntry,
    ) -> BoxFuture<'_, Result<(), AnnotationError>> {
        Box::pin(async move { self.upsert_entry(&identity, &entry).await })
    }

    fn remove(&self, identity: Identity) -> BoxFuture<'_, Result<(), AnnotationError>> {
        Box::pin(async move { self.delete_entry(&identity).await })
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    async fn test_backend() -> SqliteBackend {
        SqliteBackend::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn upsert_and_load() {
        let backend = test_backend().await;
        backend
            .upsert(
                Identity::new("0xabc"),
                AnnotationEntry::new(Some("Painting"), Some("Guitar")),
            )
            .await
            .unwrap();

        let rows = backend.load_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.as_str(), "0xabc");
        assert_eq!(rows[0].1.teach_text.as_deref(), Some("Painting"));
        assert_eq!(rows[0].1.learn_text.as_deref(), Some("Guitar"));
    }

    #[tokio::test]
    async fn upsert_replaces_row() {
        let backend = test_backend().await;
        let id = Identity::new("0xabc");
        backend
            .upsert(id.clone(), AnnotationEntry::teach("Painting"))
            .await
            .unwrap();
        backend
            .upsert(id, AnnotationEntry::learn("Guitar"))
            .await
            .unwrap();

        let rows = backend.load_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].1.teach_text.is_none());
        assert_eq!(rows[0].1.learn_text.as_deref(), Some("Guitar"));
    }

    #[tokio::test]
    async fn foreign_schema_rows_are_ignored() {
        let backend = test_backend().await;
        sqlx::query(
            "INSERT INTO annotations (identity, schema_tag, teach_text, learn_text) \
             VALUES ('0xold', 'skillswap_profiles_v0', 'stale', 'stale')",
        )
        .execute(backend.pool())
        .await
        .unwrap();

        assert!(backend.load_all().await.unwrap().is_empty());

        backend
            .upsert(Identity::new("0xold"), AnnotationEntry::teach("Fresh"))
            .await
            .unwrap();
        let rows = backend.load_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.teach_text.as_deref(), Some("Fresh"));
        assert!(rows[0].1.learn_text.is_none());
    }

    #[tokio::test]
    async fn remove_deletes_row() {
        let backend = test_backend().await;
        let id = Identity::new("0xabc");
        backend
            .upsert(id.clone(), AnnotationEntry::teach("Painting"))
            .await
            .unwrap();
        backend.remove(id).await.unwrap();
        assert!(backend.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let file = NamedTempFile::new().expect("tempfile");
        let path = file.path().to_str().expect("valid path");

        let backend = SqliteBackend::open(path).await.unwrap();
        backend
            .upsert(Identity::new("0xABC"), AnnotationEntry::teach("Painting"))
            .await
            .unwrap();
        drop(backend);

        let reopened = SqliteBackend::open(path).await.unwrap();
        let rows = reopened.load_all().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0.as_str(), "0xabc");
    }
}
