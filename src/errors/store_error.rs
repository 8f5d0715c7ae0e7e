use diesel::r2d2::PoolError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
        #[error("not found: {0}")]
        NotFound(String),

        #[error("conflict: {0}")]
        Conflict(String),

        #[error("bad request: {0}")]
        BadRequest(String),

        #[error("invalid configuration: {0}")]
        Config(String),

        #[error("failed to pool connection: {0}")]
        Pool(#[from] PoolError),

        #[error("failed to query database: {0}")]
        Database(DieselError),

        #[error("failed to run migrations: {0}")]
        Migration(String),

        #[error("internal error: {0}")]
        Internal(String),
}

impl From<DieselError> for StoreError {
        fn from(error: DieselError) -> Self {
                match error {
                        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                                StoreError::Conflict(info.message().to_string())
                        }
                        error => StoreError::Database(error),
                }
        }
}

impl StoreError {
        /// A serializable transaction lost a race and can be retried as is.
        pub fn is_serialization_failure(&self) -> bool {
                matches!(self, StoreError::Database(DieselError::DatabaseError(DatabaseErrorKind::SerializationFailure, _)))
        }
}
