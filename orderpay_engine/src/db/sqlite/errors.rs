use thiserror::Error;

use crate::traits::LifecycleError;

#[derive(Debug, Error)]
pub enum SqliteDatabaseError {
    #[error("Database connection error: {0}")]
    DriverError(#[from] sqlx::Error),
    #[error("Database migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
}

impl From<SqliteDatabaseError> for LifecycleError {
    fn from(e: SqliteDatabaseError) -> Self {
        LifecycleError::DatabaseError(e.to_string())
    }
}
