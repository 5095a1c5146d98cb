use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use xtrasnap_core::{Error, Result};

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// `initial * multiplier^(attempt - 1)`
    Exponential { multiplier: f64 },
    /// `initial * attempt^2`
    Quadratic,
    /// Always `initial`.
    Fixed,
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    pub backoff: Backoff,
    /// Add up to 25% random jitter
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff: Backoff::Exponential { multiplier: 2.0 },
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Five attempts sleeping `500ms * n^2` after the n-th failure.
    pub fn quadratic() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            backoff: Backoff::Quadratic,
            jitter: false,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff: delay,
            max_backoff: delay,
            backoff: Backoff::Fixed,
            jitter: false,
        }
    }

    /// Delay after the given failed attempt (zero-based).
    fn backoff_duration(&self, attempt: u32) -> Duration {
        let initial_ms = self.initial_backoff.as_millis() as f64;
        let base_ms = match self.backoff {
            Backoff::Exponential { multiplier } => initial_ms * multiplier.powi(attempt as i32),
            Backoff::Quadratic => initial_ms * f64::from(attempt + 1).powi(2),
            Backoff::Fixed => initial_ms,
        };

        let duration_ms = base_ms.min(self.max_backoff.as_millis() as f64) as u64;
        let mut duration = Duration::from_millis(duration_ms);

        if self.jitter && duration_ms >= 4 {
            let jitter_ms = rand::thread_rng().gen_range(0..=(duration_ms / 4));
            duration += Duration::from_millis(jitter_ms);
        }

        duration
    }
}

/// Trait to determine if an error is retryable
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// HTTP status reported as `status NNN` in an error message.
fn status_code(msg: &str) -> Option<u16> {
    let (_, rest) = msg.split_once("status ")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() == 3 { digits.parse().ok() } else { None }
}

fn looks_transient(msg: &str) -> bool {
    if let Some(code) = status_code(msg) {
        return code == 429 || (500..600).contains(&code);
    }

    let msg = msg.to_lowercase();
    msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("dispatch failure")
        || msg.contains("connection")
        || msg.contains("rate limit")
        || msg.contains("throttl")
        || msg.contains("slow down")
        || msg.contains("temporarily unavailable")
        || msg.contains("try again")
}

impl Retryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Backend(msg) | Error::Cloud(msg) => looks_transient(msg),
            // Command failures, config problems, bad names and deadlines are final.
            _ => false,
        }
    }
}

/// Retry a future operation, sleeping per `config` between attempts. The
/// last error is returned once attempts run out.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let error = match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => error,
        };

        if !error.is_retryable() {
            debug!(
                operation = operation_name,
                error = %error,
                "Error is not retryable, failing immediately"
            );
            return Err(error);
        }

        if attempt + 1 >= max_attempts {
            warn!(
                operation = operation_name,
                max_attempts = max_attempts,
                error = %error,
                "Operation failed after all retry attempts"
            );
            return Err(error);
        }

        let backoff = config.backoff_duration(attempt);
        warn!(
            operation = operation_name,
            attempt = attempt + 1,
            max_attempts = max_attempts,
            backoff_ms = backoff.as_millis(),
            error = %error,
            "Operation failed, retrying after backoff"
        );
        sleep(backoff).await;
        attempt += 1;
    }
}

/// Polls until `poll` yields a value, sleeping `interval` between polls.
/// Gives up with `Error::Timeout` once `deadline` has passed; errors from
/// `poll` end the wait immediately.
pub async fn wait_until<F, Fut, T>(
    operation_name: &str,
    interval: Duration,
    deadline: Duration,
    mut poll: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let polling = async {
        let mut polls: u32 = 0;
        loop {
            polls += 1;
            if let Some(value) = poll().await? {
                debug!(operation = operation_name, polls, "Wait finished");
                return Ok(value);
            }
            debug!(
                operation = operation_name,
                polls,
                interval_ms = interval.as_millis(),
                "Still waiting"
            );
            sleep(interval).await;
        }
    };

    match timeout(deadline, polling).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation_name.to_string(),
            seconds: deadline.as_secs(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> Error {
        Error::Io(std::io::Error::other("Temporary failure"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_eventually() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = retry_with_backoff(&RetryConfig::quadratic(), "test_operation", || {
            let attempts = attempts_clone.clone();
            async move {
                let count = attempts.fetch_add(1, Ordering::SeqCst);
                if count < 2 { Err(transient()) } else { Ok(42) }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_fails_after_max_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();
        let started = tokio::time::Instant::now();

        let result = retry_with_backoff(&RetryConfig::quadratic(), "test_operation", || {
            let attempts = attempts_clone.clone();
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(Error::Io(std::io::Error::other(format!("failure {}", n))))
            }
        })
        .await;

        assert_eq!(result.unwrap_err().to_string(), "IO error: failure 4");
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
        // 500 * (1 + 4 + 9 + 16) ms
        assert_eq!(started.elapsed(), Duration::from_millis(15_000));
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = attempts.clone();

        let result = retry_with_backoff(&RetryConfig::default(), "test_operation", || {
            let attempts = attempts_clone.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(Error::Config("bad".into()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_duration_calculation() {
        let config = RetryConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            jitter: false,
            ..Default::default()
        };
        assert_eq!(config.backoff_duration(0), Duration::from_millis(100));
        assert_eq!(config.backoff_duration(1), Duration::from_millis(200));
        assert_eq!(config.backoff_duration(2), Duration::from_millis(400));
        assert_eq!(config.backoff_duration(10), Duration::from_secs(10));

        let quadratic = RetryConfig::quadratic();
        assert_eq!(quadratic.backoff_duration(0), Duration::from_millis(500));
        assert_eq!(quadratic.backoff_duration(1), Duration::from_millis(2000));
        assert_eq!(quadratic.backoff_duration(3), Duration::from_millis(8000));

        let fixed = RetryConfig::fixed(5, Duration::from_millis(100));
        assert_eq!(fixed.backoff_duration(4), Duration::from_millis(100));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(transient().is_retryable());
        assert!(Error::Cloud("status 503 Service Unavailable".into()).is_retryable());
        assert!(!Error::Cloud("status 404 Not Found".into()).is_retryable());
        assert!(!Error::Format("Incorrect backup type: x".into()).is_retryable());
    }

    #[test]
    fn test_retryable_classification_uses_status_code() {
        assert!(Error::Cloud("GET /actions/1 returned status 429 Too Many Requests: slow".into()).is_retryable());
        assert!(Error::Cloud("GET /volumes/v returned status 502 Bad Gateway: ".into()).is_retryable());
        assert!(!Error::Cloud("GET /volumes/vol-500 returned status 404 Not Found: volume 500 not found".into()).is_retryable());
        assert!(!Error::Cloud("POST /volumes returned status 422 Unprocessable Entity: connection limit 503".into()).is_retryable());
        assert!(Error::Cloud("POST /volumes failed: connection error: reset".into()).is_retryable());
        assert!(!Error::Backend("Failed to read db1/mysql-backup-201901011000.full.xbstream: 500 bytes missing".into()).is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_returns_value() {
        let polls = Arc::new(AtomicU32::new(0));
        let polls_clone = polls.clone();

        let value = wait_until("attach", Duration::from_secs(15), Duration::from_secs(150), || {
            let polls = polls_clone.clone();
            async move {
                let n = polls.fetch_add(1, Ordering::SeqCst);
                Ok((n == 3).then_some("completed"))
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "completed");
        assert_eq!(polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_times_out() {
        let err = wait_until("detach", Duration::from_secs(15), Duration::from_secs(150), || async {
            Ok::<Option<()>, Error>(None)
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Timeout { ref operation, seconds: 150 } if operation == "detach"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_stops_on_error() {
        let err = wait_until("attach", Duration::from_secs(15), Duration::from_secs(150), || async {
            Err::<Option<()>, _>(Error::Cloud("action errored".into()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Cloud(_)));
    }
}
