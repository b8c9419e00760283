#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("{0}")]
    Other(String),
}
