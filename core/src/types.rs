use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a physical backup artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Full,
    Incremental,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::Incremental => "incremental",
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, BackupType::Full)
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(BackupType::Full),
            "incremental" => Ok(BackupType::Incremental),
            other => Err(Error::Format(format!("Incorrect backup type: {}", other))),
        }
    }
}

/// What the operator asked for; `Decide` defers to the retention engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupRequest {
    Full,
    Incremental,
    Decide,
}

impl From<BackupType> for BackupRequest {
    fn from(backup_type: BackupType) -> Self {
        match backup_type {
            BackupType::Full => BackupRequest::Full,
            BackupType::Incremental => BackupRequest::Incremental,
        }
    }
}

/// One uploaded backup object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub path: String,
    pub size: u64,
    pub backup_type: BackupType,
    pub created_at: DateTime<Utc>,
    /// Positional chain id, see `catalog::assign_lineages`. Zero means the
    /// record precedes every full backup.
    pub lineage_id: u64,
}

impl BackupRecord {
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn size_in_gb(&self) -> f64 {
        self.size as f64 / 1000.0 / 1000.0 / 1000.0
    }
}

/// Scheduling and retention knobs, loaded from the `retention` config block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub automatically_remove_old: bool,
    pub retention_in_days: i64,
    pub retention_in_hours: i64,
    pub hours_between_full_backups: i64,
}

impl RetentionPolicy {
    /// Retention window; `None` when pruning is disabled or the configured
    /// span cannot be represented.
    pub fn window(&self) -> Option<chrono::Duration> {
        if self.retention_in_days > 0 {
            chrono::Duration::try_days(self.retention_in_days)
        } else if self.retention_in_hours > 0 {
            chrono::Duration::try_hours(self.retention_in_hours)
        } else {
            None
        }
    }

    /// Rejects spans too large to turn into a duration.
    pub fn validate(&self) -> Result<()> {
        let spans = [
            ("retention_in_days", chrono::Duration::try_days(self.retention_in_days)),
            ("retention_in_hours", chrono::Duration::try_hours(self.retention_in_hours)),
            (
                "hours_between_full_backups",
                chrono::Duration::try_hours(self.hours_between_full_backups),
            ),
        ];
        for (field, span) in spans {
            if span.is_none() {
                return Err(Error::Config(format!("retention.{} is out of range", field)));
            }
        }
        Ok(())
    }
}
