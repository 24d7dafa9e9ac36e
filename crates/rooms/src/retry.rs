//! Bounded retry with exponential backoff for collaborator calls.

use std::future::Future;
use std::time::Duration;

use convoroom_config::PersistenceConfig;
use tracing::warn;

/// Run `op` up to `policy.retry_attempts` times with exponential backoff.
///
/// Returns `None` once attempts are exhausted; the caller proceeds with its
/// in-memory path and the gap is left to later reconciliation.
pub(crate) async fn with_backoff<F, Fut, T>(
    policy: &PersistenceConfig,
    label: &str,
    mut op: F,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let attempts = policy.retry_attempts.max(1);
    let base = Duration::from_millis(policy.retry_base_delay_ms);

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Some(value),
            Err(error) => {
                warn!(label, attempt = attempt + 1, attempts, %error, "collaborator call failed");
                if attempt + 1 < attempts {
                    tokio::time::sleep(base * 2u32.saturating_pow(attempt)).await;
                }
            }
        }
    }

    warn!(label, attempts, "collaborator call exhausted retries, proceeding without it");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(attempts: u32) -> PersistenceConfig {
        PersistenceConfig {
            retry_attempts: attempts,
            retry_base_delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&policy(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>(42) }
        })
        .await;

        assert_eq!(result, Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_then_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Option<()> = with_backoff(&policy(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(anyhow::anyhow!("store down")) }
        })
        .await;

        assert_eq!(result, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn recovers_midway() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&policy(5), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(anyhow::anyhow!("flaky"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
