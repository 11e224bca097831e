//! Error types for persistence operations.

use thiserror::Error;

use handarc_models::CandidateError;

/// Result type for persistence operations.
pub type DbResult<T> = Result<T, DbError>;

/// Errors from the hand store and save protocol.
#[derive(Debug, Error)]
pub enum DbError {
    /// Unique constraint violation, surfaced separately from other database
    /// errors so callers can treat it as "row already exists".
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("candidate hand rejected: {0}")]
    InvalidCandidate(#[from] CandidateError),

    #[error("database error: {0}")]
    Sqlx(sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// Save failed and one or more compensating deletes also failed,
    /// leaving partial rows behind. Carries what was left for operators.
    #[error("rollback incomplete for hand {hand_id}: {detail}")]
    RollbackIncomplete { hand_id: String, detail: String },
}

impl DbError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Whether the operation may succeed if retried. Connection-level
    /// failures are transient; constraint violations and validation
    /// failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            DbError::Sqlx(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            DbError::UniqueViolation { .. }
            | DbError::NotFound { .. }
            | DbError::InvalidCandidate(_)
            | DbError::Migrate(_)
            | DbError::RollbackIncomplete { .. } => false,
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(e: sqlx::Error) -> Self {
        // SQLSTATE 23505 = unique_violation
        if let sqlx::Error::Database(db_err) = &e {
            if db_err.code().as_deref() == Some("23505") {
                return DbError::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                };
            }
        }
        DbError::Sqlx(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_not_retryable() {
        let err = DbError::UniqueViolation {
            constraint: "players_normalized_name_key".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_io_errors_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(DbError::Sqlx(sqlx::Error::Io(io)).is_retryable());
        assert!(DbError::Sqlx(sqlx::Error::PoolTimedOut).is_retryable());
    }
}
