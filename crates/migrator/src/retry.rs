use {
    crate::error::Result,
    std::{future::Future, time::Duration},
};

/// Fixed-attempt, fixed-delay retry policy for remote submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Runs `op` up to `policy.attempts` times with a fixed delay between
/// attempts. Every error is treated as transient until the final attempt,
/// whose error is returned unchanged.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    debug_assert!(policy.attempts > 0);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.attempts => {
                tracing::warn!(
                    label,
                    attempt,
                    ?err,
                    "transient failure, retrying after fixed delay"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
