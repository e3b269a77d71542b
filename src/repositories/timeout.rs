use std::future::Future;
use std::time::Duration;

use crate::error::{AuthError, Result};

/// Runs a store call with an upper time bound.
///
/// A call that does not finish in time surfaces as `StoreUnavailable`;
/// retrying is left to the host.
pub async fn bounded<T, F>(limit: Duration, operation: &'static str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("⏱️ Store call timed out after {:?}: {}", limit, operation);
            Err(AuthError::StoreUnavailable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_calls_become_store_unavailable() {
        let result: Result<()> = bounded(Duration::from_millis(50), "sleepy", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(AuthError::StoreUnavailable));
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let result = bounded(Duration::from_secs(1), "quick", async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }
}
