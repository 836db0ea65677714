use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("failed to load environment variables for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("failed to connect to the database: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("an error occurred during JSON serialization/deserialization: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("no snapshot found for bot '{0}'")]
    SnapshotNotFound(String),

    #[error("no order '{0}' found for bot '{1}'")]
    OrderNotFound(String, String),
}
