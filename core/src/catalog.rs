//! Backup object naming and lineage bookkeeping.
//!
//! Backups are stored as `<hostname>/mysql-backup-<YYYYMMDDHHMM>.<type>.xbstream`.
//! Nothing besides the object name is persisted, so the chain structure
//! (which incrementals belong to which full backup) is recomputed from a
//! time-sorted listing on every run.

use crate::{BackupRecord, BackupType, Error, Result};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

pub const BACKUP_NAME_PREFIX: &str = "mysql-backup-";
pub const BACKUP_EXTENSION: &str = "xbstream";
pub const INCOMPLETE_SUFFIX: &str = ".incomplete";

const TIMESTAMP_LEN: usize = 12;

/// Parses the `YYYYMMDDHHMM` timestamp used in object and volume names.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if value.len() != TIMESTAMP_LEN || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let field = |range: std::ops::Range<usize>| value[range].parse::<u32>().ok();
    let year = value[0..4].parse::<i32>().ok()?;

    NaiveDate::from_ymd_opt(year, field(4..6)?, field(6..8)?)?
        .and_hms_opt(field(8..10)?, field(10..12)?, 0)
        .map(|naive| naive.and_utc())
}

pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    format!(
        "{:04}{:02}{:02}{:02}{:02}",
        time.year(),
        time.month(),
        time.day(),
        time.hour(),
        time.minute()
    )
}

/// Splits a backup key into its creation time and type.
pub fn parse_name(path: &str) -> Result<(DateTime<Utc>, BackupType)> {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let pieces: Vec<&str> = file_name.split('.').collect();

    if pieces.len() != 3 {
        return Err(Error::Format(format!("Incorrect format for filename: {}", file_name)));
    }

    let timestamp = pieces[0]
        .strip_prefix(BACKUP_NAME_PREFIX)
        .ok_or_else(|| Error::Format(format!("Incorrect prefix for filename: {}", file_name)))?;

    let created_at = parse_timestamp(timestamp)
        .ok_or_else(|| Error::Format(format!("Incorrect timestamp for filename: {}", file_name)))?;

    let backup_type = pieces[1].parse::<BackupType>()?;

    Ok((created_at, backup_type))
}

/// File name for a new backup taken at `created_at`.
pub fn backup_file_name(created_at: &DateTime<Utc>, backup_type: BackupType) -> String {
    format!(
        "{}{}.{}.{}",
        BACKUP_NAME_PREFIX,
        format_timestamp(created_at),
        backup_type,
        BACKUP_EXTENSION
    )
}

/// Object key a backup file is uploaded under.
pub fn object_key(hostname: &str, file_name: &str) -> String {
    format!("{}/{}", hostname.trim_end_matches('/'), file_name)
}

/// Builds a record from a listed object. `lineage_id` is left at zero until
/// `assign_lineages` runs.
pub fn record_from_object(path: &str, size: u64) -> Result<BackupRecord> {
    let (created_at, backup_type) = parse_name(path)?;
    Ok(BackupRecord {
        path: path.to_string(),
        size,
        backup_type,
        created_at,
        lineage_id: 0,
    })
}

/// Oldest first. Ties keep listing order.
pub fn sort_by_created_at(records: &mut [BackupRecord]) {
    records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

/// Assigns lineage ids in a single scan. Input must already be sorted oldest
/// first.
pub fn assign_lineages(records: &mut [BackupRecord]) {
    let mut lineage = 0;
    for record in records.iter_mut() {
        if record.backup_type.is_full() {
            lineage += 1;
        }
        record.lineage_id = lineage;
    }
}

/// The restore chain for the newest point at or before `cutoff`, newest first
/// and ending with its full backup. Empty when no full backup precedes the
/// cutoff.
pub fn find_relevant_since(cutoff: DateTime<Utc>, all_backups: &[BackupRecord]) -> Vec<BackupRecord> {
    let mut newest_first = all_backups.to_vec();
    newest_first.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut chain = Vec::new();
    for record in newest_first.into_iter().filter(|r| r.created_at <= cutoff) {
        let is_full = record.backup_type.is_full();
        chain.push(record);
        if is_full {
            return chain;
        }
    }

    Vec::new()
}
