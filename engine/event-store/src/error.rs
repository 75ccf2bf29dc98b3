//! Error types for the event store

use thiserror::Error;

/// Errors raised by [`EventStore`](crate::EventStore) implementations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Whether repeating the same call later could succeed
    ///
    /// Data exceptions (SQLSTATE class 22) and integrity violations (class 23)
    /// are tied to the row being written and will fail again.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                let code = db.code();
                let class = code.as_deref().and_then(|c| c.get(..2));
                !matches!(class, Some("22") | Some("23"))
            }
            StoreError::Database(sqlx::Error::Configuration(_)) => false,
            StoreError::Database(_) | StoreError::Unavailable(_) => true,
            StoreError::Migration(_) | StoreError::Config(_) => false,
        }
    }
}
