//! Store error types and `sqlx` error classification.

use std::fmt::Display;

use storyforge_core::error::DomainError;
use thiserror::Error;

use crate::config::ConfigError;

/// Startup errors: configuration, connection and migration.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Applying embedded migrations failed.
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

// SQLSTATE classes that indicate the server or connection, not the request.
const TRANSIENT_SQLSTATE_CLASSES: [&str; 4] = ["08", "40", "53", "57"];

/// Maps a `sqlx` error raised while addressing `entity` identified by `key`.
///
/// Only connectivity, pool and server-availability failures become
/// `TransientIo`; schema, protocol and encoding faults become `Storage`.
pub(crate) fn map_sqlx_error(err: sqlx::Error, entity: &'static str, key: impl Display) -> DomainError {
    match err {
        sqlx::Error::RowNotFound => DomainError::not_found(entity, key),
        sqlx::Error::Database(db) => {
            if db.is_unique_violation() {
                return DomainError::conflict(entity, key);
            }
            if db.is_check_violation() {
                return DomainError::Validation(format!(
                    "{entity} {key} violates {}",
                    db.constraint().unwrap_or("a check constraint")
                ));
            }
            if db.is_foreign_key_violation() {
                return DomainError::not_found(
                    "referenced record",
                    format!("{entity} {key} ({})", db.constraint().unwrap_or("foreign key")),
                );
            }
            let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
            if code.starts_with("22") {
                return DomainError::Validation(format!("{entity} {key}: {}", db.message()));
            }
            if TRANSIENT_SQLSTATE_CLASSES.iter().any(|class| code.starts_with(class)) {
                return DomainError::TransientIo(format!("{entity} {key}: {}", db.message()));
            }
            DomainError::Storage(format!("{entity} {key}: database error {code}: {}", db.message()))
        }
        sqlx::Error::Decode(e) | sqlx::Error::ColumnDecode { source: e, .. } => {
            DomainError::Validation(format!("{entity} {key}: undecodable row: {e}"))
        }
        err @ (sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed) => DomainError::TransientIo(format!("{entity} {key}: {err}")),
        other => DomainError::Storage(format!("{entity} {key}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = map_sqlx_error(sqlx::Error::RowNotFound, "story", "abc");

        assert!(matches!(err, DomainError::NotFound { entity: "story", .. }));
    }

    #[test]
    fn test_pool_timeout_is_retryable() {
        let err = map_sqlx_error(sqlx::Error::PoolTimedOut, "story", "abc");

        assert!(err.is_retryable());
    }

    #[test]
    fn test_pool_closed_is_retryable() {
        let err = map_sqlx_error(sqlx::Error::PoolClosed, "scene", "abc/h");

        assert!(err.is_retryable());
    }

    #[test]
    fn test_io_failure_is_retryable() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset");

        let err = map_sqlx_error(sqlx::Error::Io(io), "story", "abc");

        assert!(matches!(err, DomainError::TransientIo(_)));
    }

    #[test]
    fn test_missing_column_is_not_retryable() {
        let err = map_sqlx_error(sqlx::Error::ColumnNotFound("missing".into()), "story", "abc");

        assert!(matches!(err, DomainError::Storage(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_protocol_fault_is_not_retryable() {
        let err = map_sqlx_error(
            sqlx::Error::Protocol("unexpected message".into()),
            "scene",
            "abc/h",
        );

        assert!(matches!(err, DomainError::Storage(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_unknown_type_is_not_retryable() {
        let err = map_sqlx_error(
            sqlx::Error::TypeNotFound {
                type_name: "story_status".into(),
            },
            "story",
            "abc",
        );

        assert!(!err.is_retryable());
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn test_undefined_table_is_not_retryable(pool: sqlx::PgPool) {
        let err = sqlx::query("SELECT 1 FROM no_such_table")
            .execute(&pool)
            .await
            .unwrap_err();

        let mapped = map_sqlx_error(err, "story", "abc");

        assert!(matches!(mapped, DomainError::Storage(_)));
        assert!(!mapped.is_retryable());
    }
}
