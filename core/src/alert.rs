use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{error, info};

/// Operator notification channel.
#[async_trait]
pub trait Alerter: Send + Sync {
    /// Reports a failure. Implementations must not fail; delivery problems are
    /// logged instead.
    async fn alert_error(&self, message: &str, error: &(dyn std::error::Error + Send + Sync));

    /// Reports a noteworthy success such as a completed restore.
    async fn notify(&self, message: &str);
}

pub fn format_alert(
    hostname: &str,
    message: &str,
    error: &dyn std::error::Error,
    time: DateTime<Utc>,
) -> String {
    format!(
        "[*BACKUP FAILURE*] [{}] [host: `{}`] `{}` with error: `{}`",
        time.to_rfc3339_opts(SecondsFormat::Secs, true),
        hostname,
        message,
        error
    )
}

pub fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Writes alerts to the error log only.
#[derive(Debug, Default, Clone)]
pub struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn alert_error(&self, message: &str, err: &(dyn std::error::Error + Send + Sync)) {
        error!("{}", format_alert(&local_hostname(), message, err, Utc::now()));
    }

    async fn notify(&self, message: &str) {
        info!("{}", message);
    }
}
