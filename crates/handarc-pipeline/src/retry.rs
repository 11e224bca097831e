//! Retry policy with exponential backoff and jitter.
//!
//! Each external dependency gets its own attempt budget: subprocess work
//! is cheap to retry, vision calls are expensive and rate limited.

use std::time::Duration;

use tracing::warn;

use crate::error::{PipelineError, PipelineResult};

/// Retry policy configuration.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    /// Base delay for exponential backoff (in milliseconds).
    pub base_delay_ms: u64,
    /// Maximum delay cap (in milliseconds).
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 100,
            max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// FFmpeg and other subprocess work: quick attempts, short backoff.
    pub fn media() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            max_delay_ms: 4000,
        }
    }

    /// OCR: one retry of the whole pass; tesseract rarely recovers more.
    pub fn ocr() -> Self {
        Self {
            max_retries: 1,
            base_delay_ms: 250,
            max_delay_ms: 1000,
        }
    }

    /// Vision API: more patience, rate limits resolve in seconds.
    pub fn vision() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

/// Execute an async operation with retry.
///
/// Retries only errors classified retryable by [`PipelineError::is_retryable`],
/// honoring server-requested backoff when present. `on_retry` runs before
/// each sleep; returning `false` from it aborts further retries (used to
/// stop retrying once the progress subscriber is gone).
pub async fn with_retry<T, F, Fut, C>(
    config: &RetryConfig,
    operation: &str,
    mut on_retry: C,
    op: F,
) -> PipelineResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = PipelineResult<T>>,
    C: FnMut(u32, &PipelineError) -> bool,
{
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                let delay = calculate_delay(config, attempt, e.retry_after_ms());
                warn!(
                    operation = %operation,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Operation failed, retrying: {}",
                    e
                );
                if !on_retry(attempt + 1, &e) {
                    return Err(e);
                }
                tokio::time::sleep(delay).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error
        .unwrap_or_else(|| PipelineError::invalid_input("retry budget misconfigured to zero")))
}

/// Calculate retry delay with exponential backoff and full jitter.
fn calculate_delay(config: &RetryConfig, attempt: u32, retry_after_ms: Option<u64>) -> Duration {
    // Honor server-requested backoff if present
    if let Some(after) = retry_after_ms {
        return Duration::from_millis(after);
    }

    let exp_delay = config.base_delay_ms.saturating_mul(2u64.pow(attempt));
    let capped_delay = exp_delay.min(config.max_delay_ms);

    // Full jitter without pulling in a rand dependency
    let jittered = if capped_delay > 0 {
        use std::time::SystemTime;
        let nanos = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let random_factor = (nanos % 1000) as f64 / 1000.0;
        ((capped_delay as f64) * random_factor) as u64
    } else {
        0
    };

    Duration::from_millis(jittered.max(config.base_delay_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use handarc_media::MediaError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> PipelineError {
        PipelineError::Media(MediaError::Timeout(1))
    }

    fn permanent() -> PipelineError {
        PipelineError::Media(MediaError::FfmpegNotFound)
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        let attempts = AtomicU32::new(0);

        let result: PipelineResult<u32> = with_retry(&config, "test", |_, _| true, || async {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_fails_immediately() {
        let config = RetryConfig::default();
        let attempts = AtomicU32::new(0);

        let result: PipelineResult<u32> = with_retry(&config, "test", |_, _| true, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(permanent())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_on_retry_can_abort() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        let attempts = AtomicU32::new(0);

        let result: PipelineResult<u32> = with_retry(&config, "test", |_, _| false, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_last_error() {
        let config = RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        let attempts = AtomicU32::new(0);

        let result: PipelineResult<u32> = with_retry(&config, "test", |_, _| true, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .await;

        assert!(matches!(
            result,
            Err(PipelineError::Media(MediaError::Timeout(_)))
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_delay_honors_retry_after() {
        let config = RetryConfig::default();
        assert_eq!(
            calculate_delay(&config, 0, Some(2000)),
            Duration::from_millis(2000)
        );
    }

    #[test]
    fn test_delay_respects_cap_and_floor() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 2000,
        };
        let delay = calculate_delay(&config, 10, None);
        assert!(delay.as_millis() >= 1000 && delay.as_millis() <= 2000);
    }
}
