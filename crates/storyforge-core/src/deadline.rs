//! Caller-supplied deadlines for store operations.
//!
//! Every core operation is a single statement or a single transaction, so
//! abandoning its future when the deadline elapses never leaves partial
//! multi-row effects behind.

use std::future::Future;
use std::time::Duration;

use crate::error::DomainError;

/// Runs `operation`, failing with [`DomainError::TransientIo`] if it does not
/// finish within `limit`.
///
/// # Errors
///
/// Returns the operation's own error, or `TransientIo` when the deadline
/// elapses first.
pub async fn with_deadline<T, F>(limit: Duration, operation: F) -> Result<T, DomainError>
where
    F: Future<Output = Result<T, DomainError>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => Err(DomainError::TransientIo(format!(
            "deadline of {}ms exceeded",
            limit.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_deadline_passes_through_result() {
        let result = with_deadline(Duration::from_secs(1), async { Ok::<_, DomainError>(7) }).await;

        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_with_deadline_maps_elapsed_to_transient_io() {
        let result = with_deadline(Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, DomainError>(())
        })
        .await;

        match result {
            Err(DomainError::TransientIo(message)) => assert!(message.contains("50ms")),
            other => panic!("expected TransientIo, got {other:?}"),
        }
    }
}
